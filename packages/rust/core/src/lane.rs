//! Per-backend execution lane.
//!
//! A lane owns a fixed, ordered list of runnable units and runs them one after
//! another, round after round, until the shared stop signal is observed or its
//! round limit is exceeded. Lanes of different backends never coordinate.

use async_trait::async_trait;
use tracing::debug;

use quarry_shared::BackendName;

use crate::signal::StopSignal;
use crate::task::TaskOutcome;

/// Anything a lane can run once per round.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Name used in lane log lines.
    fn name(&self) -> &str;

    /// Execute one pass. Must not fail; problems are logged and tallied.
    async fn run(&self) -> TaskOutcome;
}

/// Summary of a finished lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneReport {
    pub backend: BackendName,
    /// Number of complete rounds run.
    pub rounds: u32,
    /// Tallies summed over every unit and round.
    pub outcome: TaskOutcome,
}

/// Serial runner of one backend's units.
pub struct TaskLane {
    backend: BackendName,
    units: Vec<Box<dyn Runnable>>,
    stop: StopSignal,
    round_limit: u32,
}

impl TaskLane {
    pub fn new(backend: BackendName, stop: StopSignal, round_limit: u32) -> Self {
        Self {
            backend,
            units: Vec::new(),
            stop,
            round_limit,
        }
    }

    /// Append a unit; units run in the order they were added.
    pub fn push(&mut self, unit: Box<dyn Runnable>) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn backend(&self) -> &BackendName {
        &self.backend
    }

    /// Run rounds until the stop signal is raised or the round counter exceeds
    /// the limit. The signal is checked only between rounds, so the first
    /// round always runs and at most `round_limit + 1` rounds run.
    pub async fn run(self) -> LaneReport {
        debug!(backend = %self.backend, units = self.units.len(), "starting lane");
        if self.units.is_empty() {
            debug!(backend = %self.backend, "lane without tasks");
        }

        let mut rounds: u32 = 0;
        let mut outcome = TaskOutcome::default();

        loop {
            for unit in &self.units {
                debug!(
                    backend = %self.backend,
                    unit = unit.name(),
                    round = rounds + 1,
                    "running unit"
                );
                outcome.absorb(unit.run().await);
            }
            rounds = rounds.saturating_add(1);

            // Let sibling lanes and the phase timer make progress.
            tokio::task::yield_now().await;

            if self.stop.is_raised() {
                debug!(backend = %self.backend, rounds, "stop signal observed");
                break;
            }
            if rounds > self.round_limit {
                debug!(backend = %self.backend, rounds, "round limit reached");
                break;
            }
        }

        debug!(backend = %self.backend, rounds, "exiting lane");

        LaneReport {
            backend: self.backend,
            rounds,
            outcome,
        }
    }
}

impl std::fmt::Debug for TaskLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLane")
            .field("backend", &self.backend)
            .field("units", &self.units.iter().map(|u| u.name()).collect::<Vec<_>>())
            .field("round_limit", &self.round_limit)
            .finish()
    }
}
