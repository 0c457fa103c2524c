//! Repository record types
//!
//! Field names match the on-disk JSON so records written by earlier versions
//! of the tool load unchanged.

use serde::{Deserialize, Serialize};

/// A branch name plus the last commit hash known for it
///
/// `hash == None` means the branch has never been materialized (or no history
/// is known yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl BranchRef {
    /// A branch with no known hash
    pub fn unhashed(branch_name: impl Into<String>) -> Self {
        Self {
            branch_name: branch_name.into(),
            hash: None,
        }
    }

    /// A branch pinned to a commit hash
    pub fn at(branch_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            branch_name: branch_name.into(),
            hash: Some(hash.into()),
        }
    }
}

/// Coarse reachability flag for a repository's remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Ok,
    Ko,
}

impl ConnectionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Ko => write!(f, "ko"),
        }
    }
}

/// The persisted state of one watched repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Stable identifier assigned at creation, never reused
    pub repository_id: String,
    pub repository_name: String,
    pub repository_access_token: String,
    pub repository_workspace_name: String,
    /// Last remote snapshot of every branch
    pub branches: Vec<BranchRef>,
    /// Subscription list plus the last materialized hash per branch
    pub observed_branches: Vec<BranchRef>,
    pub remote_connection_status: ConnectionStatus,
}

impl RepositoryRecord {
    /// Find an observed branch by name
    pub fn observed(&self, branch_name: &str) -> Option<&BranchRef> {
        self.observed_branches.iter().find(|b| b.branch_name == branch_name)
    }

    /// Whether a branch is in the subscription list
    pub fn is_observed(&self, branch_name: &str) -> bool {
        self.observed(branch_name).is_some()
    }

    /// Observed branches with `branch_name` replaced by the given hash
    ///
    /// The prior entry for that name is dropped and the new one appended.
    pub fn with_observed_hash(&self, branch_name: &str, hash: &str) -> Vec<BranchRef> {
        let mut observed: Vec<BranchRef> = self
            .observed_branches
            .iter()
            .filter(|b| b.branch_name != branch_name)
            .cloned()
            .collect();
        observed.push(BranchRef::at(branch_name, hash));
        observed
    }

    /// Apply a patch, leaving the identifier untouched
    pub fn merge(mut self, patch: RecordPatch) -> Self {
        if let Some(name) = patch.repository_name {
            self.repository_name = name;
        }
        if let Some(token) = patch.repository_access_token {
            self.repository_access_token = token;
        }
        if let Some(workspace) = patch.repository_workspace_name {
            self.repository_workspace_name = workspace;
        }
        if let Some(branches) = patch.branches {
            self.branches = branches;
        }
        if let Some(observed) = patch.observed_branches {
            self.observed_branches = observed;
        }
        if let Some(status) = patch.remote_connection_status {
            self.remote_connection_status = status;
        }
        self
    }
}

/// Partial update of a [`RepositoryRecord`]; the identifier cannot be patched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub repository_name: Option<String>,
    pub repository_access_token: Option<String>,
    pub repository_workspace_name: Option<String>,
    pub branches: Option<Vec<BranchRef>>,
    pub observed_branches: Option<Vec<BranchRef>>,
    pub remote_connection_status: Option<ConnectionStatus>,
}

impl RecordPatch {
    pub fn status(mut self, status: ConnectionStatus) -> Self {
        self.remote_connection_status = Some(status);
        self
    }

    pub fn branches(mut self, branches: Vec<BranchRef>) -> Self {
        self.branches = Some(branches);
        self
    }

    pub fn observed(mut self, observed: Vec<BranchRef>) -> Self {
        self.observed_branches = Some(observed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Remote coordinates for a repository being attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub workspace_name: String,
    pub name: String,
    pub access_token: String,
}

impl NewRepository {
    pub fn new(workspace_name: impl Into<String>, name: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            workspace_name: workspace_name.into(),
            name: name.into(),
            access_token: access_token.into(),
        }
    }

    /// Build the initial record with empty branch lists and an `ok` status
    pub fn into_record(self, repository_id: String) -> RepositoryRecord {
        RepositoryRecord {
            repository_id,
            repository_name: self.name,
            repository_access_token: self.access_token,
            repository_workspace_name: self.workspace_name,
            branches: Vec::new(),
            observed_branches: Vec::new(),
            remote_connection_status: ConnectionStatus::Ok,
        }
    }
}
