//! Cycle Scope Resolver
//!
//! Computes which cycles of a run are eligible for file-level rollback.

use std::collections::BTreeSet;

use crate::error::RollbackError;
use crate::types::{CycleId, Run, RunStatus};

#[derive(Debug, Clone)]
pub struct CycleScopeResolver {
    fallback_to_full_range: bool,
}

impl Default for CycleScopeResolver {
    fn default() -> Self {
        Self {
            fallback_to_full_range: true,
        }
    }
}

impl CycleScopeResolver {
    pub fn new(fallback_to_full_range: bool) -> Self {
        Self {
            fallback_to_full_range,
        }
    }

    /// Cycles ingested for `run` and not yet rolled back.
    ///
    /// `ledger` is the ingestion ledger's view of the run, `None` when the
    /// ledger is unavailable. A fully rolled back run has no eligible cycles
    /// regardless of the ledger.
    pub fn available_cycles(
        &self,
        run: &Run,
        ledger: Option<&BTreeSet<CycleId>>,
    ) -> BTreeSet<CycleId> {
        if run.status == RunStatus::RolledBack {
            return BTreeSet::new();
        }
        match ledger {
            Some(cycles) => cycles.clone(),
            None if self.fallback_to_full_range => CycleId::full_range(),
            None => BTreeSet::new(),
        }
    }

    /// Check that `requested` is eligible for rollback on `run`.
    pub fn resolve(
        &self,
        run: &Run,
        ledger: Option<&BTreeSet<CycleId>>,
        requested: CycleId,
    ) -> Result<CycleId, RollbackError> {
        let available = self.available_cycles(run, ledger);
        if available.contains(&requested) {
            return Ok(requested);
        }

        let listed = available
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Err(RollbackError::NotFound(format!(
            "cycle {} is not available for rollback on run {} (available: [{}])",
            requested, run.run_id, listed
        )))
    }
}
