//! Watch loop configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the BranchWatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Idle period between cycles, in seconds
    #[serde(rename = "cooldown-secs", default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Upper bound on branch-list requests in flight during the fetch phase
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_max_concurrent_fetches() -> usize {
    8
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl WatchConfig {
    /// Get the cooldown as a Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Fetch concurrency, never zero
    pub fn fetch_concurrency(&self) -> usize {
        self.max_concurrent_fetches.max(1)
    }
}
