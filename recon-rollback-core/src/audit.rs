//! Audit Recorder
//!
//! Front door to the append-only audit ledger. Every append failure is
//! surfaced to the caller; nothing is dropped silently.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::RollbackError;
use crate::ports::AuditStore;
use crate::types::RollbackRecord;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append `record` to the ledger.
    ///
    /// Callers hold the run lease while appending, which linearises records
    /// for the same run.
    pub async fn append(&self, record: RollbackRecord) -> Result<RollbackRecord, RollbackError> {
        match self.store.append(&record).await {
            Ok(seq) => {
                debug!(
                    rollback_id = %record.rollback_id,
                    run_id = %record.run_id,
                    status = %record.status,
                    seq,
                    "Rollback recorded"
                );
                Ok(record)
            }
            Err(e) => {
                error!(
                    rollback_id = %record.rollback_id,
                    run_id = %record.run_id,
                    error = %e,
                    "Audit ledger append failed"
                );
                Err(
                    RollbackError::execution(format!("audit ledger append failed: {e:#}"))
                        .with_rollback_id(record.rollback_id),
                )
            }
        }
    }

    /// Records in ledger append order.
    ///
    /// Not re-sorted by timestamp: records of different runs may append out
    /// of timestamp order, and readers must only ever see growth at the end.
    pub async fn query(&self, run_id: Option<&str>) -> Result<Vec<RollbackRecord>, RollbackError> {
        Ok(self.store.query(run_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;
    use crate::types::{RecordDetails, RecordStatus, RollbackLevel, RollbackRequest, RunStatus};
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct BrokenLedger;

    #[async_trait]
    impl AuditStore for BrokenLedger {
        async fn append(&self, _record: &RollbackRecord) -> anyhow::Result<u64> {
            Err(anyhow!("disk full"))
        }

        async fn query(&self, _run_id: Option<&str>) -> anyhow::Result<Vec<RollbackRecord>> {
            Ok(Vec::new())
        }
    }

    fn committed(run_id: &str) -> RollbackRecord {
        RollbackRecord::new(
            &RollbackRequest::new(run_id, RollbackLevel::Reports),
            RecordStatus::Completed,
            RecordDetails::Committed {
                steps: Vec::new(),
                skipped_steps: Vec::new(),
                run_status: RunStatus::Completed,
            },
        )
    }

    #[tokio::test]
    async fn test_append_then_query_by_run() {
        let recorder = AuditRecorder::new(Arc::new(MemoryStore::new()));
        recorder.append(committed("RUN_001")).await.unwrap();
        recorder.append(committed("RUN_002")).await.unwrap();
        recorder.append(committed("RUN_001")).await.unwrap();

        assert_eq!(recorder.query(None).await.unwrap().len(), 3);
        let trail = recorder.query(Some("RUN_001")).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_query_keeps_append_order_over_timestamps() {
        let recorder = AuditRecorder::new(Arc::new(MemoryStore::new()));
        let older = committed("RUN_001");
        let newer = committed("RUN_002");
        assert!(older.timestamp <= newer.timestamp);

        // the newer record reaches the ledger first
        recorder.append(newer.clone()).await.unwrap();
        recorder.append(older.clone()).await.unwrap();

        let ids: Vec<_> = recorder
            .query(None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.rollback_id)
            .collect();
        assert_eq!(ids, vec![newer.rollback_id, older.rollback_id]);
    }

    #[tokio::test]
    async fn test_empty_ledger_queries_empty() {
        let recorder = AuditRecorder::new(Arc::new(MemoryStore::new()));
        assert!(recorder.query(Some("RUN_001")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_failure_is_surfaced() {
        let recorder = AuditRecorder::new(Arc::new(BrokenLedger));
        let record = committed("RUN_001");
        let id = record.rollback_id.clone();
        let err = recorder.append(record).await.unwrap_err();
        assert!(matches!(err, RollbackError::Execution { .. }));
        assert_eq!(err.rollback_id(), Some(id.as_str()));
        assert!(err.to_string().contains("disk full"));
    }
}
