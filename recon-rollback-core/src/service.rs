//! RollbackService: the single entry point for every rollback operation.
//!
//! HTTP handlers and in-process callers go through this trait; nothing else
//! touches the executor or the ports directly.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::RollbackError;
use crate::executor::{RollbackExecutor, RollbackPreview};
use crate::history::{HistoryProjector, RunHistoryEntry};
use crate::ports::EnginePorts;
use crate::proto::RollbackRequestBody;
use crate::types::*;

pub type Result<T> = std::result::Result<T, RollbackError>;

#[async_trait]
pub trait RollbackService: Send + Sync {
    /// Execute a rollback and return its committed audit record.
    async fn rollback(&self, body: RollbackRequestBody) -> Result<RollbackRecord>;

    /// Compute what a rollback would remove without removing anything.
    async fn plan_rollback(&self, body: RollbackRequestBody) -> Result<RollbackPreview>;

    async fn available_cycles(&self, run_id: &str) -> Result<BTreeSet<CycleId>>;

    async fn rollback_history(&self, run_id: Option<&str>) -> Result<Vec<RollbackRecord>>;

    async fn audit_trail(&self, run_id: &str) -> Result<Vec<RollbackRecord>>;

    async fn list_runs(&self) -> Result<Vec<Run>>;

    async fn run_history(&self) -> Result<Vec<RunHistoryEntry>>;

    async fn guardrail_state(&self, run_id: &str) -> Result<GuardrailState>;

    /// Download-completion event. Sets the sticky TTUM flag for the run.
    async fn mark_ttum_downloaded(&self, run_id: &str) -> Result<GuardrailState>;
}

pub struct RollbackServiceImpl {
    ports: EnginePorts,
    executor: RollbackExecutor,
    history: HistoryProjector,
}

impl RollbackServiceImpl {
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        let executor = RollbackExecutor::new(ports.clone(), config);
        let history = HistoryProjector::new(ports.runs.clone(), executor.audit().clone());
        Self {
            ports,
            executor,
            history,
        }
    }

    pub fn executor(&self) -> &RollbackExecutor {
        &self.executor
    }

    async fn require_run(&self, run_id: &str) -> Result<Run> {
        self.ports
            .runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| RollbackError::NotFound(format!("run {} not found", run_id)))
    }
}

#[async_trait]
impl RollbackService for RollbackServiceImpl {
    async fn rollback(&self, body: RollbackRequestBody) -> Result<RollbackRecord> {
        let request = body.parse()?;
        self.executor.execute(request).await
    }

    async fn plan_rollback(&self, body: RollbackRequestBody) -> Result<RollbackPreview> {
        let request = body.parse()?;
        self.executor.preview(&request).await
    }

    async fn available_cycles(&self, run_id: &str) -> Result<BTreeSet<CycleId>> {
        let run = self.require_run(run_id).await?;
        let ledger = self.ports.ledger.ingested_cycles(run_id).await?;
        Ok(self.executor.resolver().available_cycles(&run, ledger.as_ref()))
    }

    async fn rollback_history(&self, run_id: Option<&str>) -> Result<Vec<RollbackRecord>> {
        self.history.rollback_history(run_id).await
    }

    async fn audit_trail(&self, run_id: &str) -> Result<Vec<RollbackRecord>> {
        self.history.audit_trail(run_id).await
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        Ok(self.ports.runs.list_runs().await?)
    }

    async fn run_history(&self) -> Result<Vec<RunHistoryEntry>> {
        self.history.run_history().await
    }

    async fn guardrail_state(&self, run_id: &str) -> Result<GuardrailState> {
        self.require_run(run_id).await?;
        Ok(self.ports.guardrails.load(run_id).await?)
    }

    async fn mark_ttum_downloaded(&self, run_id: &str) -> Result<GuardrailState> {
        self.require_run(run_id).await?;
        let state = self
            .ports
            .guardrails
            .mark_ttum_downloaded(run_id, Utc::now())
            .await?;
        info!(run_id, at = ?state.ttum_downloaded_at, "TTUM guardrail engaged");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::{MemoryStore, SeedBundle};
    use std::sync::Arc;

    fn service() -> RollbackServiceImpl {
        let store = Arc::new(MemoryStore::from_seed(SeedBundle::demo().unwrap()));
        RollbackServiceImpl::new(EnginePorts::in_memory(store), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_available_cycles_for_unknown_run() {
        let svc = service();
        assert!(matches!(
            svc.available_cycles("RUN_404").await,
            Err(RollbackError::NotFound(_))
        ));
        assert_eq!(svc.available_cycles("RUN_002").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mark_downloaded_then_ttum_is_denied() {
        let svc = service();
        let state = svc.mark_ttum_downloaded("RUN_001").await.unwrap();
        assert!(state.ttum_downloaded);

        let err = svc
            .rollback(RollbackRequestBody::new("RUN_001", "ttum"))
            .await
            .unwrap_err();
        assert!(matches!(err, RollbackError::GuardrailViolation { .. }));
        assert!(err.rollback_id().is_some());
    }

    #[tokio::test]
    async fn test_mark_downloaded_unknown_run() {
        let svc = service();
        assert!(matches!(
            svc.mark_ttum_downloaded("RUN_404").await,
            Err(RollbackError::NotFound(_))
        ));
    }
}
