//! Cycle observer that reports simulation progress through `tracing`.
//!
//! Every commit is logged at `trace`. A progress line is logged at `info`
//! each time another `every` commits have been made, so long runs stay
//! visible without flooding the default filter.

use ephemeris_core::driver::{CycleCommit, CycleObserver};
use tracing::{info, trace};

/// Logs commits and periodic progress.
pub struct LoggingObserver {
    every: u64,
    commits: u64,
}

impl LoggingObserver {
    /// Create an observer that logs progress every `every` commits
    /// (`0` disables progress lines).
    pub const fn new(every: u64) -> Self {
        Self { every, commits: 0 }
    }

    /// Commits seen so far.
    pub const fn commits(&self) -> u64 {
        self.commits
    }
}

impl CycleObserver for LoggingObserver {
    fn on_commit(&mut self, commit: &CycleCommit<'_>) {
        self.commits = self.commits.saturating_add(1);
        trace!(
            engine = %commit.engine,
            agent = %commit.agent,
            iteration = commit.iteration,
            low = commit.low,
            high = commit.high,
            state = %commit.state,
            "Cycle committed"
        );
        if self.commits.checked_rem(self.every) == Some(0) {
            info!(
                engine = %commit.engine,
                iteration = commit.iteration,
                commits = self.commits,
                "Simulation progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use ephemeris_types::{AgentId, EngineId};
    use serde_json::json;

    use super::*;

    #[test]
    fn counts_every_commit() {
        let (engine, agent) = (EngineId::new("orbits"), AgentId::new("Body1"));
        let state = json!({"time": 0.01});
        let mut observer = LoggingObserver::new(2);
        for iteration in 0..5 {
            observer.on_commit(&CycleCommit {
                iteration,
                engine: &engine,
                agent: &agent,
                low: 0.0,
                high: 0.01,
                state: &state,
            });
        }
        assert_eq!(observer.commits(), 5);
    }
}
