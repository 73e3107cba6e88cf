use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::orchestrator::Orchestrator;

pub const DEFAULT_MAX_RUNS: usize = 32;

/// Live analysis runs addressed by run id. The oldest run is shut down and
/// dropped once `max_runs` is exceeded.
pub struct RunRegistry {
    runs: Mutex<IndexMap<Uuid, Arc<Orchestrator>>>,
    max_runs: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RUNS)
    }
}

impl RunRegistry {
    pub fn new(max_runs: usize) -> Self {
        Self {
            runs: Mutex::new(IndexMap::new()),
            max_runs: max_runs.max(1),
        }
    }

    pub fn insert(&self, run: Orchestrator) -> Arc<Orchestrator> {
        let run = Arc::new(run);
        let evicted: Vec<Arc<Orchestrator>> = {
            let mut runs = self.runs.lock();
            runs.insert(run.run_id(), Arc::clone(&run));
            let excess = runs.len().saturating_sub(self.max_runs);
            runs.drain(..excess).map(|(_, r)| r).collect()
        };
        for old in evicted {
            debug!(run_id = %old.run_id(), "Evicting analysis run");
            old.shutdown();
        }
        run
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Orchestrator>> {
        self.runs.lock().get(&id).cloned()
    }

    /// Removes and shuts down a run.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.runs.lock().shift_remove(&id);
        match removed {
            Some(run) => {
                run.shutdown();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.runs.lock().len()
    }
}
