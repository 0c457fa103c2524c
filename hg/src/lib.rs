//! Hallucigenia - Bitbucket branch watcher
//!
//! Watches a set of remote repositories, keeps a local working tree of every
//! observed branch and runs a side-effect script each time one of those
//! branches moves.
//!
//! # Modules
//!
//! - [`remote`] - Remote branch provider trait and Bitbucket client
//! - [`diff`] - Observed-vs-remote branch comparison
//! - [`cache`] - Working-tree materialization and eviction
//! - [`scripts`] - Script resolution and detached execution
//! - [`watcher`] - Watch cycle and fixed-cooldown loop
//! - [`manager`] - Repository management operations
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cache;
pub mod cli;
pub mod config;
pub mod diff;
pub mod manager;
pub mod remote;
pub mod scripts;
pub mod watcher;

pub use cache::{CacheManager, Cloner, GitCloner};
pub use config::Config;
pub use diff::{BranchChange, BranchUpdate, diff_branches};
pub use manager::{RepoManager, RepositorySummary, ScriptTarget};
pub use remote::{BitbucketProvider, BranchProvider, RemoteBranch, RemoteCoordinates, RemoteError};
pub use scripts::{ScriptExecutor, ScriptHandle, resolve_script};
pub use watcher::{BranchWatcher, CycleReport, WatchConfig, WatchCycle};
