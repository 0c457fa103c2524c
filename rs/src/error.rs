//! Store error types

use thiserror::Error;

/// Errors raised by the repository record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Invalid repository record for {slug}: {reason}")]
    Invalid { slug: String, reason: String },

    #[error("Repository {slug} changed identity on disk (expected {expected}, found {found})")]
    IdentityMismatch {
        slug: String,
        expected: String,
        found: String,
    },

    #[error("There is already a repository using the slug {0}")]
    SlugTaken(String),

    #[error("Invalid slug {0:?}")]
    InvalidSlug(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the record on disk no longer matches the caller's view of it
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::IdentityMismatch { .. } | StoreError::Invalid { .. }
        )
    }
}
