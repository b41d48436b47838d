//! Per-run mutual exclusion.
//!
//! At most one rollback attempt may hold a run at a time. A second attempt is
//! rejected with `Conflict` instead of queueing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RollbackError;

type HeldRuns = Arc<Mutex<HashSet<String>>>;

fn held(runs: &HeldRuns) -> MutexGuard<'_, HashSet<String>> {
    // The set is only mutated by insert/remove, so a poisoned guard is still consistent.
    runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct RunLocks {
    held: HeldRuns,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the run for the duration of one attempt.
    pub fn try_acquire(&self, run_id: &str) -> Result<RunLease, RollbackError> {
        let mut runs = held(&self.held);
        if !runs.insert(run_id.to_string()) {
            return Err(RollbackError::Conflict(format!(
                "a rollback is already in progress for run {}",
                run_id
            )));
        }
        Ok(RunLease {
            run_id: run_id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, run_id: &str) -> bool {
        held(&self.held).contains(run_id)
    }
}

/// Released on drop, including on every failure path.
pub struct RunLease {
    run_id: String,
    held: HeldRuns,
}

impl Drop for RunLease {
    fn drop(&mut self) {
        held(&self.held).remove(&self.run_id);
    }
}
