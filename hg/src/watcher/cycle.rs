//! One watch cycle

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use repostore::{RecordPatch, RepoStore, Repository, RepositoryRecord, StoreError};
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::diff::{BranchChange, diff_branches};
use crate::remote::{BranchProvider, RemoteBranch, RemoteCoordinates, RemoteError};
use crate::scripts::{ScriptExecutor, ScriptHandle, ScriptKind, resolve_script};

/// A repository whose branch list could not be fetched this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub slug: String,
    pub error: String,
}

/// The script resolved for an updated branch
#[derive(Debug)]
pub struct ScriptOutcome {
    pub script_name: String,
    pub kind: ScriptKind,
    /// Present when the process was spawned
    pub handle: Option<ScriptHandle>,
}

impl ScriptOutcome {
    pub fn launched(&self) -> bool {
        self.handle.is_some()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.handle.as_ref().map(|h| h.log_path())
    }
}

/// What happened to one change tuple in the apply phase
#[derive(Debug)]
pub struct BranchOutcome {
    pub slug: String,
    pub branch_name: String,
    pub new_hash: String,
    pub materialized: bool,
    /// The new hash was written to `observed_branches`
    pub persisted: bool,
    /// Record-store failure on the hash update
    pub error: Option<String>,
    /// `None` when no script matched or the branch was not materialized
    pub script: Option<ScriptOutcome>,
}

impl BranchOutcome {
    fn new(change: &BranchChange) -> Self {
        Self {
            slug: change.slug.clone(),
            branch_name: change.branch_name.clone(),
            new_hash: change.new_hash.clone(),
            materialized: false,
            persisted: false,
            error: None,
            script: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.materialized && self.persisted
    }
}

/// Result of [`WatchCycle::run_cycle`]
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Number of change tuples produced by the diff phase
    pub changed_count: usize,
    pub results: Vec<BranchOutcome>,
    pub fetch_failures: Vec<FetchFailure>,
    /// Cache directories removed by the reconciliation sweep
    pub evicted: usize,
}

impl CycleReport {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }

    pub fn launched_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.script.as_ref().is_some_and(|s| s.launched()))
            .count()
    }
}

/// A repository that took part in the fetch phase
struct Fetched {
    repo: Repository,
    record: RepositoryRecord,
    result: Result<Vec<RemoteBranch>, RemoteError>,
}

/// Drives a single fetch / diff / apply pass over the store
pub struct WatchCycle {
    store: RepoStore,
    provider: Arc<dyn BranchProvider>,
    cache: CacheManager,
    executor: ScriptExecutor,
    fetch_concurrency: usize,
}

impl WatchCycle {
    pub fn new(
        store: RepoStore,
        provider: Arc<dyn BranchProvider>,
        cache: CacheManager,
        executor: ScriptExecutor,
        fetch_concurrency: usize,
    ) -> Self {
        debug!(fetch_concurrency, "WatchCycle::new: called");
        Self {
            store,
            provider,
            cache,
            executor,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    pub fn store(&self) -> &RepoStore {
        &self.store
    }

    /// Run one cycle over every repository in the store
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        debug!("WatchCycle::run_cycle: called");
        let repos = self.store.repositories()?;
        Ok(self.run_cycle_for(repos).await)
    }

    /// Run one cycle over the given repositories
    ///
    /// Per-repository and per-branch failures end up in the report; nothing
    /// here aborts the cycle.
    pub async fn run_cycle_for(&self, repos: Vec<Repository>) -> CycleReport {
        debug!(count = repos.len(), "WatchCycle::run_cycle_for: called");
        let mut report = CycleReport::default();

        report.evicted = self.cache.reconcile(&repos).await;

        let fetched = self.fetch_phase(repos).await;

        let mut changes: Vec<(usize, BranchChange)> = Vec::new();
        for (index, entry) in fetched.iter().enumerate() {
            match &entry.result {
                Ok(remote) => {
                    for update in diff_branches(&entry.record.observed_branches, remote) {
                        changes.push((
                            index,
                            BranchChange {
                                slug: entry.repo.slug().to_string(),
                                repository_id: entry.record.repository_id.clone(),
                                branch_name: update.branch_name,
                                new_hash: update.new_hash,
                            },
                        ));
                    }
                }
                Err(e) => {
                    warn!(slug = %entry.repo.slug(), error = %e, "Branch fetch failed, skipping repository this cycle");
                    report.fetch_failures.push(FetchFailure {
                        slug: entry.repo.slug().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.changed_count = changes.len();
        debug!(changed = changes.len(), "WatchCycle::run_cycle_for: diff phase done");

        // Sequential: clones share the token's rate limit and scripts share branch folders
        for (index, change) in changes {
            let entry = &fetched[index];
            let outcome = self.apply(&entry.repo, &entry.record, &change).await;
            report.results.push(outcome);
        }

        info!(
            changed = report.changed_count,
            succeeded = report.succeeded_count(),
            fetch_failures = report.fetch_failures.len(),
            evicted = report.evicted,
            "Watch cycle completed"
        );
        report
    }

    /// Concurrently fetch branch lists for every connected repository
    async fn fetch_phase(&self, repos: Vec<Repository>) -> Vec<Fetched> {
        let mut targets = Vec::new();
        for repo in repos {
            match repo.record() {
                Ok(record) if record.remote_connection_status.is_ok() => targets.push((repo, record)),
                Ok(_) => debug!(slug = %repo.slug(), "WatchCycle::fetch_phase: repository is ko, skipping"),
                Err(e) => warn!(slug = %repo.slug(), error = %e, "Skipping unreadable repository"),
            }
        }

        let provider = &self.provider;
        stream::iter(targets.into_iter().map(|(repo, record)| async move {
            let coords = RemoteCoordinates::from(&record);
            let result = provider.fetch_branches(&coords).await;
            Fetched { repo, record, result }
        }))
        .buffered(self.fetch_concurrency)
        .collect()
        .await
    }

    /// Materialize one changed branch, persist its hash, launch its script
    async fn apply(&self, repo: &Repository, record: &RepositoryRecord, change: &BranchChange) -> BranchOutcome {
        debug!(slug = %change.slug, branch = %change.branch_name, "WatchCycle::apply: called");
        let mut outcome = BranchOutcome::new(change);

        let url = self.provider.clone_url(&RemoteCoordinates::from(record));
        outcome.materialized = self.cache.materialize(repo, &change.branch_name, &url).await;
        if !outcome.materialized {
            return outcome;
        }

        match self.persist_hash(repo, change) {
            Ok(true) => outcome.persisted = true,
            Ok(false) => {
                // Unobserved while the clone ran
                if let Err(e) = self.cache.evict(repo, &change.branch_name).await {
                    warn!(slug = %change.slug, branch = %change.branch_name, error = %e, "Could not evict unobserved branch");
                }
                outcome.materialized = false;
                return outcome;
            }
            Err(e) if e.is_consistency_error() => {
                warn!(slug = %change.slug, branch = %change.branch_name, error = %e, "Record changed during clone, hash not recorded");
                outcome.error = Some(e.to_string());
                return outcome;
            }
            Err(e) => {
                warn!(slug = %change.slug, branch = %change.branch_name, error = %e, "Could not persist new hash");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        }

        let available = repo.script_names().unwrap_or_else(|e| {
            warn!(slug = %change.slug, error = %e, "Could not list scripts");
            Vec::new()
        });
        if let Some(resolved) = resolve_script(&change.branch_name, &record.repository_name, &available) {
            let handle = self.executor.execute(repo, &resolved.name, &change.branch_name);
            outcome.script = Some(ScriptOutcome {
                script_name: resolved.name,
                kind: resolved.kind,
                handle,
            });
        } else {
            debug!(slug = %change.slug, branch = %change.branch_name, "WatchCycle::apply: no script");
        }

        outcome
    }

    /// Write the new hash against a fresh read of the record
    ///
    /// Returns false when the branch is no longer observed.
    fn persist_hash(&self, repo: &Repository, change: &BranchChange) -> Result<bool, StoreError> {
        let current = repo.record()?;
        if current.repository_id != change.repository_id {
            return Err(StoreError::IdentityMismatch {
                slug: change.slug.clone(),
                expected: change.repository_id.clone(),
                found: current.repository_id,
            });
        }
        if !current.is_observed(&change.branch_name) {
            info!(slug = %change.slug, branch = %change.branch_name, "Branch unobserved during clone, dropping");
            return Ok(false);
        }

        let observed = current.with_observed_hash(&change.branch_name, &change.new_hash);
        repo.update(&change.repository_id, RecordPatch::default().observed(observed))?;
        info!(slug = %change.slug, branch = %change.branch_name, hash = %change.new_hash, "Recorded new branch hash");
        Ok(true)
    }
}
