//! Repository management operations
//!
//! Everything the operator does to a repository outside the watch loop:
//! attaching, probing, syncing the branch list, choosing observed branches
//! and editing scripts.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use repostore::{BranchRef, ConnectionStatus, NewRepository, RecordPatch, RepoStore, Repository, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheManager};
use crate::remote::{BranchProvider, RemoteCoordinates, RemoteError};

/// Error types for management operations
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("Repository {workspace}/{name} is already watched as {slug}")]
    DuplicateRemote {
        workspace: String,
        name: String,
        slug: String,
    },

    #[error("There is already a repository using the slug {0}")]
    SlugTaken(String),

    #[error("Could not establish connection with {coords}: {source}")]
    Unreachable {
        coords: String,
        #[source]
        source: RemoteError,
    },

    #[error("Unknown branches for {slug}: {}", .names.join(", "))]
    UnknownBranches { slug: String, names: Vec<String> },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Which script an edit applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTarget {
    /// The repository-wide fallback, named after the repository
    Default,
    Branch(String),
}

impl ScriptTarget {
    pub fn from_branch(branch: Option<String>) -> Self {
        branch.map(Self::Branch).unwrap_or(Self::Default)
    }
}

/// Result of editing a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChange {
    Written(PathBuf),
    /// Empty body; `true` when a script was actually deleted
    Removed(bool),
}

/// Connection check result for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub slug: String,
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

/// Menu-style overview of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySummary {
    pub slug: String,
    pub workspace_name: String,
    pub name: String,
    pub status: ConnectionStatus,
    pub branch_count: usize,
    pub observed_count: usize,
    pub cached_count: usize,
    pub has_default_script: bool,
    /// Observed branches that have their own script
    pub scripted_observed_count: usize,
}

/// One row of a repository's branch listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchListing {
    pub name: String,
    pub remote_hash: Option<String>,
    pub observed: bool,
    /// Hash of the last materialization
    pub materialized_hash: Option<String>,
    pub cached: bool,
    pub has_script: bool,
}

pub struct RepoManager {
    store: RepoStore,
    provider: Arc<dyn BranchProvider>,
    cache: CacheManager,
    clear_branches_on_sync_failure: bool,
}

impl RepoManager {
    pub fn new(store: RepoStore, provider: Arc<dyn BranchProvider>, cache: CacheManager) -> Self {
        debug!("RepoManager::new: called");
        Self {
            store,
            provider,
            cache,
            clear_branches_on_sync_failure: false,
        }
    }

    /// Also empty `branches` and `observed_branches` when a sync fails
    pub fn with_clear_on_sync_failure(mut self, clear: bool) -> Self {
        self.clear_branches_on_sync_failure = clear;
        self
    }

    pub fn store(&self) -> &RepoStore {
        &self.store
    }

    /// Validate, attach and sync a new repository
    ///
    /// The slug defaults to the repository name. A failing initial sync
    /// leaves the repository attached with a `ko` status.
    pub async fn add_repository(&self, slug: Option<&str>, new_repo: NewRepository) -> Result<Repository, ManagerError> {
        debug!(workspace = %new_repo.workspace_name, name = %new_repo.name, "RepoManager::add_repository: called");
        let new_repo = NewRepository::new(
            new_repo.workspace_name.trim(),
            new_repo.name.trim(),
            new_repo.access_token.trim(),
        );
        if new_repo.workspace_name.is_empty() {
            return Err(ManagerError::EmptyField("workspace name"));
        }
        if new_repo.name.is_empty() {
            return Err(ManagerError::EmptyField("repository name"));
        }
        if new_repo.access_token.is_empty() {
            return Err(ManagerError::EmptyField("access token"));
        }
        let slug = slug.map(str::trim).unwrap_or(&new_repo.name).to_string();
        if slug.is_empty() {
            return Err(ManagerError::EmptyField("slug"));
        }

        for repo in self.store.repositories()? {
            let record = repo.record()?;
            if record.repository_workspace_name == new_repo.workspace_name && record.repository_name == new_repo.name {
                return Err(ManagerError::DuplicateRemote {
                    workspace: new_repo.workspace_name,
                    name: new_repo.name,
                    slug: repo.slug().to_string(),
                });
            }
        }
        if self.store.list_slugs()?.contains(&slug) {
            return Err(ManagerError::SlugTaken(slug));
        }

        let coords = RemoteCoordinates::new(&new_repo.workspace_name, &new_repo.name, &new_repo.access_token);
        if let Err(source) = self.provider.fetch_repository(&coords).await {
            return Err(ManagerError::Unreachable {
                coords: coords.to_string(),
                source,
            });
        }

        self.store.attach(&slug, new_repo)?;
        info!(%slug, %coords, "Added repository");

        if let Err(e) = self.sync_branches(&slug).await {
            warn!(%slug, error = %e, "Initial branch sync failed");
        }
        Ok(self.store.open_repository(&slug)?)
    }

    /// Delete the repository folder with its cache, scripts and logs
    pub fn remove_repository(&self, slug: &str) -> Result<(), ManagerError> {
        debug!(%slug, "RepoManager::remove_repository: called");
        self.store.open_repository(slug)?.detach()?;
        info!(%slug, "Removed repository");
        Ok(())
    }

    pub fn rename_repository(&self, slug: &str, new_slug: &str) -> Result<Repository, ManagerError> {
        debug!(%slug, %new_slug, "RepoManager::rename_repository: called");
        let new_slug = new_slug.trim();
        if new_slug.is_empty() {
            return Err(ManagerError::EmptyField("slug"));
        }
        Ok(self.store.rename(slug, new_slug)?)
    }

    /// Check every repository and persist `ok` / `ko`
    pub async fn check_connections(&self) -> Result<Vec<ConnectionCheck>, ManagerError> {
        debug!("RepoManager::check_connections: called");
        let mut targets = Vec::new();
        for repo in self.store.repositories()? {
            let record = repo.record()?;
            targets.push((repo, record));
        }

        let results = join_all(targets.iter().map(|(_, record)| {
            let coords = RemoteCoordinates::from(record);
            let provider = &self.provider;
            async move { provider.fetch_repository(&coords).await }
        }))
        .await;

        let mut checks = Vec::new();
        for ((repo, record), result) in targets.into_iter().zip(results) {
            let (status, error) = match result {
                Ok(()) => (ConnectionStatus::Ok, None),
                Err(e) => {
                    warn!(slug = %repo.slug(), error = %e, "Connection check failed");
                    (ConnectionStatus::Ko, Some(e.to_string()))
                }
            };
            repo.update(&record.repository_id, RecordPatch::default().status(status))?;
            checks.push(ConnectionCheck {
                slug: repo.slug().to_string(),
                status,
                error,
            });
        }
        Ok(checks)
    }

    /// Replace the stored branch list with the remote one
    ///
    /// Returns the number of remote branches. On failure the status becomes
    /// `ko` and the error is returned.
    pub async fn sync_branches(&self, slug: &str) -> Result<usize, ManagerError> {
        debug!(%slug, "RepoManager::sync_branches: called");
        let repo = self.store.open_repository(slug)?;
        let record = repo.record()?;

        match self.provider.fetch_branches(&RemoteCoordinates::from(&record)).await {
            Ok(remote) => {
                let branches: Vec<BranchRef> = remote.into_iter().map(|b| BranchRef::at(b.name, b.hash)).collect();
                let count = branches.len();
                repo.update(
                    &record.repository_id,
                    RecordPatch::default().branches(branches).status(ConnectionStatus::Ok),
                )?;
                info!(%slug, count, "Synced branches");
                Ok(count)
            }
            Err(e) => {
                warn!(%slug, error = %e, "Branch sync failed");
                let mut patch = RecordPatch::default().status(ConnectionStatus::Ko);
                if self.clear_branches_on_sync_failure {
                    debug!(%slug, "RepoManager::sync_branches: clearing branch lists");
                    patch = patch.branches(Vec::new()).observed(Vec::new());
                }
                repo.update(&record.repository_id, patch)?;
                if self.clear_branches_on_sync_failure {
                    self.cache.reconcile_repository(&repo).await?;
                }
                Err(e.into())
            }
        }
    }

    /// Replace the observed set and drop cache entries no longer observed
    ///
    /// Names already observed keep their hash. Returns the number of evicted
    /// cache directories.
    pub async fn set_observed(&self, slug: &str, names: &[String]) -> Result<usize, ManagerError> {
        debug!(%slug, count = names.len(), "RepoManager::set_observed: called");
        let repo = self.store.open_repository(slug)?;
        let record = repo.record()?;

        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !record.branches.iter().any(|b| &b.branch_name == *n))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ManagerError::UnknownBranches {
                slug: slug.to_string(),
                names: unknown,
            });
        }

        let mut observed: Vec<BranchRef> = Vec::new();
        for name in names {
            if observed.iter().any(|b| &b.branch_name == name) {
                continue;
            }
            let entry = record
                .observed(name)
                .cloned()
                .unwrap_or_else(|| BranchRef::unhashed(name.as_str()));
            observed.push(entry);
        }

        repo.update(&record.repository_id, RecordPatch::default().observed(observed))?;
        info!(%slug, observed = names.len(), "Updated observed branches");

        Ok(self.cache.reconcile_repository(&repo).await?)
    }

    /// Run the eviction sweep over every repository
    pub async fn clean(&self) -> Result<usize, ManagerError> {
        debug!("RepoManager::clean: called");
        let repos = self.store.repositories()?;
        Ok(self.cache.reconcile(&repos).await)
    }

    fn script_name(&self, repo: &Repository, target: &ScriptTarget) -> Result<String, ManagerError> {
        match target {
            ScriptTarget::Branch(branch) => Ok(branch.clone()),
            ScriptTarget::Default => Ok(repo.record()?.repository_name),
        }
    }

    /// Write a script; an empty or whitespace-only body deletes it
    pub fn set_script(&self, slug: &str, target: &ScriptTarget, body: &str) -> Result<ScriptChange, ManagerError> {
        debug!(%slug, ?target, "RepoManager::set_script: called");
        let repo = self.store.open_repository(slug)?;
        let name = self.script_name(&repo, target)?;

        if body.trim().is_empty() {
            let removed = repo.delete_script(&name)?;
            info!(%slug, script = %name, removed, "Empty script body, deleting");
            return Ok(ScriptChange::Removed(removed));
        }

        let path = repo.write_script(&name, body)?;
        info!(%slug, script = %name, "Saved script");
        Ok(ScriptChange::Written(path))
    }

    pub fn remove_script(&self, slug: &str, target: &ScriptTarget) -> Result<bool, ManagerError> {
        debug!(%slug, ?target, "RepoManager::remove_script: called");
        let repo = self.store.open_repository(slug)?;
        let name = self.script_name(&repo, target)?;
        Ok(repo.delete_script(&name)?)
    }

    pub fn show_script(&self, slug: &str, target: &ScriptTarget) -> Result<Option<String>, ManagerError> {
        let repo = self.store.open_repository(slug)?;
        let name = self.script_name(&repo, target)?;
        Ok(repo.script_content(&name)?)
    }

    pub fn list_scripts(&self, slug: &str) -> Result<Vec<String>, ManagerError> {
        Ok(self.store.open_repository(slug)?.script_names()?)
    }

    /// Known branches with their observation, cache and script state
    pub fn branches(&self, slug: &str) -> Result<Vec<BranchListing>, ManagerError> {
        let repo = self.store.open_repository(slug)?;
        let record = repo.record()?;
        let cached = repo.cached_branches()?;
        let scripts = repo.script_names()?;

        let mut listing: Vec<BranchListing> = record
            .branches
            .iter()
            .map(|b| BranchListing {
                name: b.branch_name.clone(),
                remote_hash: b.hash.clone(),
                observed: record.is_observed(&b.branch_name),
                materialized_hash: record.observed(&b.branch_name).and_then(|o| o.hash.clone()),
                cached: cached.contains(&b.branch_name),
                has_script: scripts.contains(&b.branch_name),
            })
            .collect();

        // Observed branches the remote no longer lists
        for ob in &record.observed_branches {
            if !listing.iter().any(|l| l.name == ob.branch_name) {
                listing.push(BranchListing {
                    name: ob.branch_name.clone(),
                    remote_hash: None,
                    observed: true,
                    materialized_hash: ob.hash.clone(),
                    cached: cached.contains(&ob.branch_name),
                    has_script: scripts.contains(&ob.branch_name),
                });
            }
        }
        Ok(listing)
    }

    /// One summary per readable repository, sorted by slug
    pub fn summaries(&self) -> Result<Vec<RepositorySummary>, ManagerError> {
        let mut summaries = Vec::new();
        for repo in self.store.repositories()? {
            let record = repo.record()?;
            let scripts = repo.script_names()?;
            summaries.push(RepositorySummary {
                slug: repo.slug().to_string(),
                workspace_name: record.repository_workspace_name.clone(),
                name: record.repository_name.clone(),
                status: record.remote_connection_status,
                branch_count: record.branches.len(),
                observed_count: record.observed_branches.len(),
                cached_count: self.cache.cached_count(&repo)?,
                has_default_script: scripts.contains(&record.repository_name),
                scripted_observed_count: record
                    .observed_branches
                    .iter()
                    .filter(|b| scripts.contains(&b.branch_name))
                    .count(),
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CloneOutput, Cloner};
    use crate::remote::RemoteBranch;
    use crate::remote::mock::MockProvider;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct NoopCloner;

    #[async_trait]
    impl Cloner for NoopCloner {
        async fn clone_branch(&self, _branch: &str, _url: &str, _dest: &Path) -> std::io::Result<CloneOutput> {
            Ok(CloneOutput {
                success: false,
                exit_code: Some(1),
                stderr: String::new(),
            })
        }
    }

    fn setup() -> (TempDir, Arc<MockProvider>, RepoManager) {
        let temp = TempDir::new().unwrap();
        let store = RepoStore::open(temp.path()).unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = RepoManager::new(store, provider.clone(), CacheManager::new(Arc::new(NoopCloner)));
        (temp, provider, manager)
    }

    fn branches(names: &[(&str, &str)]) -> Vec<RemoteBranch> {
        names.iter().map(|(n, h)| RemoteBranch::new(*n, *h)).collect()
    }

    #[tokio::test]
    async fn test_add_repository_syncs_branches() {
        let (_temp, provider, manager) = setup();
        provider.set_branches("acme", branches(&[("main", "abc"), ("dev", "def")]));

        let repo = manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();

        assert_eq!(repo.slug(), "acme");
        let record = repo.record().unwrap();
        assert_eq!(record.branches.len(), 2);
        assert!(record.observed_branches.is_empty());
        assert!(record.remote_connection_status.is_ok());
    }

    #[tokio::test]
    async fn test_add_repository_rejects_duplicates() {
        let (_temp, _provider, manager) = setup();
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();

        let err = manager
            .add_repository(Some("other"), NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::DuplicateRemote { .. }));

        let err = manager
            .add_repository(Some("acme"), NewRepository::new("team", "widgets", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::SlugTaken(_)));
    }

    #[tokio::test]
    async fn test_add_repository_requires_fields_and_access() {
        let (_temp, provider, manager) = setup();
        let err = manager
            .add_repository(None, NewRepository::new("team", "acme", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::EmptyField("access token")));

        provider.fail("acme");
        let err = manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Unreachable { .. }));
        assert!(manager.store().list_slugs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_failure_leaves_branches_by_default() {
        let (_temp, provider, manager) = setup();
        provider.set_branches("acme", branches(&[("main", "abc")]));
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();
        manager.set_observed("acme", &["main".to_string()]).await.unwrap();

        provider.fail("acme");
        assert!(manager.sync_branches("acme").await.is_err());

        let record = manager.store().open_repository("acme").unwrap().record().unwrap();
        assert_eq!(record.remote_connection_status, ConnectionStatus::Ko);
        assert_eq!(record.branches.len(), 1);
        assert_eq!(record.observed_branches.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_failure_can_clear_branches() {
        let (_temp, provider, manager) = setup();
        let manager = manager.with_clear_on_sync_failure(true);
        provider.set_branches("acme", branches(&[("main", "abc")]));
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();
        manager.set_observed("acme", &["main".to_string()]).await.unwrap();
        let repo = manager.store().open_repository("acme").unwrap();
        fs::create_dir_all(repo.branch_path("main")).unwrap();

        provider.fail("acme");
        assert!(manager.sync_branches("acme").await.is_err());

        let record = repo.record().unwrap();
        assert!(record.branches.is_empty());
        assert!(record.observed_branches.is_empty());
        assert!(!repo.branch_path("main").exists());
    }

    #[tokio::test]
    async fn test_set_observed_keeps_hashes_and_evicts() {
        let (_temp, provider, manager) = setup();
        provider.set_branches("acme", branches(&[("main", "abc"), ("dev", "def")]));
        let repo = manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();
        let id = repo.record().unwrap().repository_id;
        repo.update(
            &id,
            RecordPatch::default().observed(vec![BranchRef::at("main", "abc"), BranchRef::at("dev", "def")]),
        )
        .unwrap();
        fs::create_dir_all(repo.branch_path("main")).unwrap();
        fs::create_dir_all(repo.branch_path("dev")).unwrap();

        let evicted = manager.set_observed("acme", &["main".to_string()]).await.unwrap();

        assert_eq!(evicted, 1);
        let record = repo.record().unwrap();
        assert_eq!(record.observed_branches, vec![BranchRef::at("main", "abc")]);
        assert!(repo.branch_path("main").is_dir());
        assert!(!repo.branch_path("dev").exists());
    }

    #[tokio::test]
    async fn test_set_observed_rejects_unknown_branch() {
        let (_temp, provider, manager) = setup();
        provider.set_branches("acme", branches(&[("main", "abc")]));
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();

        let err = manager.set_observed("acme", &["nope".to_string()]).await.unwrap_err();
        assert!(matches!(err, ManagerError::UnknownBranches { .. }));
    }

    #[tokio::test]
    async fn test_check_connections_persists_status() {
        let (_temp, provider, manager) = setup();
        manager
            .add_repository(None, NewRepository::new("team", "good", "tok"))
            .await
            .unwrap();
        manager
            .add_repository(None, NewRepository::new("team", "bad", "tok"))
            .await
            .unwrap();
        provider.fail("bad");

        let checks = manager.check_connections().await.unwrap();

        assert_eq!(checks.len(), 2);
        let bad = checks.iter().find(|c| c.slug == "bad").unwrap();
        assert_eq!(bad.status, ConnectionStatus::Ko);
        assert!(bad.error.is_some());
        let record = manager.store().open_repository("bad").unwrap().record().unwrap();
        assert_eq!(record.remote_connection_status, ConnectionStatus::Ko);
    }

    #[tokio::test]
    async fn test_script_edits_and_summary() {
        let (_temp, provider, manager) = setup();
        provider.set_branches("acme", branches(&[("main", "abc"), ("dev", "def")]));
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();
        manager
            .set_observed("acme", &["main".to_string(), "dev".to_string()])
            .await
            .unwrap();

        let change = manager.set_script("acme", &ScriptTarget::Default, "echo default\n").unwrap();
        assert!(matches!(change, ScriptChange::Written(_)));
        manager
            .set_script("acme", &ScriptTarget::Branch("main".to_string()), "echo main\n")
            .unwrap();

        assert_eq!(
            manager.show_script("acme", &ScriptTarget::Default).unwrap().as_deref(),
            Some("echo default\n")
        );

        let summary = &manager.summaries().unwrap()[0];
        assert_eq!(summary.observed_count, 2);
        assert_eq!(summary.branch_count, 2);
        assert!(summary.has_default_script);
        assert_eq!(summary.scripted_observed_count, 1);

        let change = manager
            .set_script("acme", &ScriptTarget::Branch("main".to_string()), "   \n")
            .unwrap();
        assert_eq!(change, ScriptChange::Removed(true));
        assert!(manager.show_script("acme", &ScriptTarget::Branch("main".to_string())).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_branch_listing_includes_vanished_observed() {
        let (_temp, provider, manager) = setup();
        provider.set_branches("acme", branches(&[("main", "abc"), ("old", "123")]));
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();
        manager.set_observed("acme", &["old".to_string()]).await.unwrap();
        provider.set_branches("acme", branches(&[("main", "abc")]));
        manager.sync_branches("acme").await.unwrap();

        let listing = manager.branches("acme").unwrap();

        assert_eq!(listing.len(), 2);
        let old = listing.iter().find(|l| l.name == "old").unwrap();
        assert!(old.observed);
        assert!(old.remote_hash.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_rename() {
        let (_temp, _provider, manager) = setup();
        manager
            .add_repository(None, NewRepository::new("team", "acme", "tok"))
            .await
            .unwrap();

        let renamed = manager.rename_repository("acme", "widgets").unwrap();
        assert_eq!(renamed.slug(), "widgets");

        manager.remove_repository("widgets").unwrap();
        assert!(manager.store().list_slugs().unwrap().is_empty());
        assert!(matches!(
            manager.remove_repository("widgets").unwrap_err(),
            ManagerError::Store(StoreError::NotFound(_))
        ));
    }
}
