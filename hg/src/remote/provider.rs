//! BranchProvider trait definition

use async_trait::async_trait;
use repostore::RepositoryRecord;

use super::RemoteError;

/// Where a repository lives remotely and how to authenticate against it
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCoordinates {
    pub workspace: String,
    pub name: String,
    pub access_token: String,
}

impl RemoteCoordinates {
    pub fn new(workspace: impl Into<String>, name: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            name: name.into(),
            access_token: access_token.into(),
        }
    }
}

impl From<&RepositoryRecord> for RemoteCoordinates {
    fn from(record: &RepositoryRecord) -> Self {
        Self::new(
            &record.repository_workspace_name,
            &record.repository_name,
            &record.repository_access_token,
        )
    }
}

// Keeps the token out of logs
impl std::fmt::Debug for RemoteCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCoordinates")
            .field("workspace", &self.workspace)
            .field("name", &self.name)
            .field("access_token", &"***")
            .finish()
    }
}

impl std::fmt::Display for RemoteCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workspace, self.name)
    }
}

/// A branch as currently reported by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    pub name: String,
    pub hash: String,
}

impl RemoteBranch {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// Source of truth for remote branch heads
#[async_trait]
pub trait BranchProvider: Send + Sync {
    /// Every branch of the repository with its latest commit hash
    ///
    /// Pagination is handled inside the provider.
    async fn fetch_branches(&self, coords: &RemoteCoordinates) -> Result<Vec<RemoteBranch>, RemoteError>;

    /// Succeeds iff the repository is reachable with the given credentials
    async fn fetch_repository(&self, coords: &RemoteCoordinates) -> Result<(), RemoteError>;

    /// Authenticated URL the clone operation should fetch from
    fn clone_url(&self, coords: &RemoteCoordinates) -> String;
}
