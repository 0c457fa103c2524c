//! Working-tree cache
//!
//! Each observed branch is materialized as a full single-branch clone under
//! its repository's `branches/` folder. A cache directory is either absent or
//! the complete output of a successful clone, never something in between.

mod cloner;
mod manager;

pub use cloner::{CloneOutput, Cloner, GitCloner, redact_credentials};
pub use manager::{CacheError, CacheManager};
