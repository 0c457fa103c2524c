//! Fixed-cooldown watch loop

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info};

use super::cycle::{CycleReport, WatchCycle};

/// Runs watch cycles until asked to stop
pub struct BranchWatcher {
    cycle: WatchCycle,
    cooldown: Duration,
    cycles_run: u64,
}

impl BranchWatcher {
    pub fn new(cycle: WatchCycle, cooldown: Duration) -> Self {
        Self {
            cycle,
            cooldown,
            cycles_run: 0,
        }
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    /// Run cycles until `shutdown` resolves
    ///
    /// A cycle in progress is abandoned when the signal arrives; scripts it
    /// already launched keep running. `on_cycle` sees every report.
    pub async fn run<S, F>(&mut self, shutdown: S, mut on_cycle: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&CycleReport),
    {
        info!(cooldown_secs = self.cooldown.as_secs(), "BranchWatcher started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.cycle.run_cycle() => {
                    self.cycles_run += 1;
                    match result {
                        Ok(report) => on_cycle(&report),
                        Err(e) => error!(error = %e, "Watch cycle could not list repositories"),
                    }
                }
            }

            debug!(cooldown = ?self.cooldown, "BranchWatcher::run: cooling down");
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }

        info!(cycles = self.cycles_run, "BranchWatcher stopped");
    }
}
