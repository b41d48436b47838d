//! Read projections over the audit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::AuditRecorder;
use crate::error::RollbackError;
use crate::ports::RunRegistry;
use crate::types::*;

/// Most recent rollback attempt against a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRollback {
    pub rollback_id: String,
    pub level: RollbackLevel,
    pub status: RecordStatus,
    pub timestamp: DateTime<Utc>,
}

impl From<&RollbackRecord> for LastRollback {
    fn from(record: &RollbackRecord) -> Self {
        Self {
            rollback_id: record.rollback_id.clone(),
            level: record.level,
            status: record.status,
            timestamp: record.timestamp,
        }
    }
}

/// A run joined with a summary of its rollback attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    #[serde(flatten)]
    pub run: Run,
    pub rollback_attempts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rollback: Option<LastRollback>,
}

#[derive(Clone)]
pub struct HistoryProjector {
    runs: Arc<dyn RunRegistry>,
    audit: AuditRecorder,
}

impl HistoryProjector {
    pub fn new(runs: Arc<dyn RunRegistry>, audit: AuditRecorder) -> Self {
        Self { runs, audit }
    }

    /// All records, or one run's, in append order. Unknown runs read as empty.
    pub async fn rollback_history(
        &self,
        run_id: Option<&str>,
    ) -> Result<Vec<RollbackRecord>, RollbackError> {
        self.audit.query(run_id).await
    }

    /// Audit trail for a run that must exist.
    pub async fn audit_trail(&self, run_id: &str) -> Result<Vec<RollbackRecord>, RollbackError> {
        if self.runs.get_run(run_id).await?.is_none() {
            return Err(RollbackError::NotFound(format!("run {} not found", run_id)));
        }
        self.audit.query(Some(run_id)).await
    }

    /// Every run with its attempt count and latest attempt.
    pub async fn run_history(&self) -> Result<Vec<RunHistoryEntry>, RollbackError> {
        let runs = self.runs.list_runs().await?;
        let records = self.audit.query(None).await?;

        let mut by_run: HashMap<&str, (usize, &RollbackRecord)> = HashMap::new();
        for record in &records {
            // append order is time-ascending within a run, so the last one seen wins
            by_run
                .entry(record.run_id.as_str())
                .and_modify(|(count, last)| {
                    *count += 1;
                    *last = record;
                })
                .or_insert((1, record));
        }

        Ok(runs
            .into_iter()
            .map(|run| {
                let (rollback_attempts, last_rollback) = match by_run.get(run.run_id.as_str()) {
                    Some((count, last)) => (*count, Some(LastRollback::from(*last))),
                    None => (0, None),
                };
                RunHistoryEntry {
                    run,
                    rollback_attempts,
                    last_rollback,
                }
            })
            .collect())
    }
}
