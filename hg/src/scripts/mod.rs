//! Side-effect scripts
//!
//! After a branch is re-materialized the matching script runs as a detached
//! process. The branch-specific script wins over the repository default;
//! at most one script runs per update.

mod executor;
mod resolver;

pub use executor::{ScriptExecutor, ScriptHandle, log_file_name};
pub use resolver::{ResolvedScript, ScriptKind, resolve_script};
