//! Cache manager for materializing and evicting branch working trees

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use repostore::{Repository, StoreError};
use tracing::{debug, error, info, warn};

use super::cloner::Cloner;

/// Error types for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to remove cache entry {path}: {source}")]
    RemoveFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the `branches/` folders of every repository
pub struct CacheManager {
    cloner: Arc<dyn Cloner>,
}

impl CacheManager {
    /// Create a new cache manager
    pub fn new(cloner: Arc<dyn Cloner>) -> Self {
        debug!("CacheManager::new: called");
        Self { cloner }
    }

    /// Clone `branch` into its cache directory
    ///
    /// On return the directory exists if and only if the result is `true`,
    /// except when an old tree cannot be removed even on a second attempt: it
    /// is then left as found and nothing is cloned. Clone failures are never
    /// retried here; the caller's stored hash stays behind so the next cycle
    /// flags the branch again.
    pub async fn materialize(&self, repo: &Repository, branch: &str, url: &str) -> bool {
        debug!(slug = %repo.slug(), %branch, "CacheManager::materialize: called");
        let target = repo.branch_path(branch);

        // Stale or half-written directory from an earlier attempt
        if let Err(e) = remove_dir(&target).await {
            debug!(error = %e, "CacheManager::materialize: first removal failed, retrying");
            if let Err(e) = remove_dir(&target).await {
                warn!(slug = %repo.slug(), %branch, error = %e, "Could not clear cache directory before clone");
                return false;
            }
        }

        if let Err(e) = tokio::fs::create_dir_all(repo.branches_dir()).await {
            warn!(slug = %repo.slug(), error = %e, "Could not create branches directory");
            return false;
        }

        let cloned = match self.cloner.clone_branch(branch, url, &target).await {
            Ok(output) if output.success => {
                debug!("CacheManager::materialize: clone succeeded");
                true
            }
            Ok(output) => {
                warn!(
                    slug = %repo.slug(),
                    %branch,
                    exit_code = ?output.exit_code,
                    stderr = %output.stderr.trim(),
                    "Clone failed"
                );
                false
            }
            Err(e) => {
                warn!(slug = %repo.slug(), %branch, error = %e, "Could not start clone");
                false
            }
        };

        let success = cloned && target.is_dir();
        if cloned && !success {
            warn!(slug = %repo.slug(), %branch, "Clone reported success but produced no directory");
        }

        if !success && let Err(e) = remove_dir(&target).await {
            error!(slug = %repo.slug(), %branch, error = %e, "Could not remove failed clone");
        }

        if success {
            info!(slug = %repo.slug(), %branch, "Materialized branch");
        }
        success
    }

    /// Remove a branch's cache directory; returns whether anything was removed
    pub async fn evict(&self, repo: &Repository, branch: &str) -> Result<bool, CacheError> {
        debug!(slug = %repo.slug(), %branch, "CacheManager::evict: called");
        let removed = remove_dir(&repo.branch_path(branch)).await?;
        if removed {
            info!(slug = %repo.slug(), %branch, "Evicted branch");
        }
        Ok(removed)
    }

    /// Evict every cached branch that is no longer observed
    ///
    /// Each repository is swept against its own freshly read record. A
    /// repository that fails is logged and skipped; the sweep goes on.
    pub async fn reconcile(&self, repos: &[Repository]) -> usize {
        debug!(count = repos.len(), "CacheManager::reconcile: called");
        let mut evicted = 0;

        for repo in repos {
            match self.reconcile_repository(repo).await {
                Ok(count) => evicted += count,
                Err(e) => warn!(slug = %repo.slug(), error = %e, "Skipping reconciliation"),
            }
        }

        debug!(evicted, "CacheManager::reconcile: completed");
        evicted
    }

    /// Evict the unobserved cached branches of one repository
    pub async fn reconcile_repository(&self, repo: &Repository) -> Result<usize, CacheError> {
        debug!(slug = %repo.slug(), "CacheManager::reconcile_repository: called");
        let record = repo.record()?;
        let mut evicted = 0;

        for branch in repo.cached_branches()? {
            if record.is_observed(&branch) {
                debug!(slug = %repo.slug(), %branch, "CacheManager::reconcile_repository: branch still observed");
                continue;
            }
            if self.evict(repo, &branch).await? {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Number of materialized branches for a repository
    pub fn cached_count(&self, repo: &Repository) -> Result<usize, CacheError> {
        Ok(repo.cached_branches()?.len())
    }
}

async fn remove_dir(path: &Path) -> Result<bool, CacheError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::RemoveFailed {
            path: path.display().to_string(),
            source: e,
        }),
    }
}
