//! Remote branch provider
//!
//! Lists a repository's branches with their head commits and checks whether
//! the stored credentials still grant access. [`BitbucketProvider`] talks to
//! the Bitbucket Cloud REST API; tests substitute their own [`BranchProvider`].

mod bitbucket;
mod error;
mod provider;

pub use bitbucket::BitbucketProvider;
pub use error::RemoteError;
pub use provider::{BranchProvider, RemoteBranch, RemoteCoordinates};

#[cfg(test)]
pub use provider::mock;
