//! Branch diff engine
//!
//! Compares the hash recorded for each observed branch with the head the
//! remote currently reports. A branch with no recorded hash always counts as
//! changed; an observed branch the remote no longer lists is skipped.

use repostore::BranchRef;

use crate::remote::RemoteBranch;

/// An observed branch whose remote head moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchUpdate {
    pub branch_name: String,
    pub new_hash: String,
}

/// One change tuple for the apply phase of a watch cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChange {
    pub slug: String,
    pub repository_id: String,
    pub branch_name: String,
    pub new_hash: String,
}

/// Observed branches needing re-materialization, in `observed` order
pub fn diff_branches(observed: &[BranchRef], remote: &[RemoteBranch]) -> Vec<BranchUpdate> {
    observed
        .iter()
        .filter_map(|ob| {
            let found = remote.iter().find(|rb| rb.name == ob.branch_name)?;
            if ob.hash.as_deref() == Some(found.hash.as_str()) {
                return None;
            }
            Some(BranchUpdate {
                branch_name: ob.branch_name.clone(),
                new_hash: found.hash.clone(),
            })
        })
        .collect()
}
