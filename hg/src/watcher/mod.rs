//! Watch loop: fetch, diff, materialize, run scripts, cool down

mod config;
mod cycle;
mod watch_loop;

pub use config::WatchConfig;
pub use cycle::{BranchOutcome, CycleReport, FetchFailure, ScriptOutcome, WatchCycle};
pub use watch_loop::BranchWatcher;
