//! Persistence and collaborator seams for the rollback engine.
//!
//! The engine operates exclusively through these traits, enabling pluggable
//! backends (`MemoryStore` for tests and demos, file-backed stores for the
//! audit ledger and guardrails, remote adapters for the run provider).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::store_memory::MemoryStore;
use crate::types::*;

// ── Runs ──

/// Read view over reconciliation runs supplied by the run/summary provider.
#[async_trait]
pub trait RunRegistry: Send + Sync {
    async fn list_runs(&self) -> Result<Vec<Run>>;
    async fn get_run(&self, run_id: &str) -> Result<Option<Run>>;
    /// Annotate a run with a rollback outcome. Runs are never deleted.
    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()>;
}

// ── Artifacts ──

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn inventory(&self, run_id: &str) -> Result<ArtifactInventory>;

    /// Remove the artifacts named by `step`.
    ///
    /// Must be swap-or-nothing: on `Err` the artifact class is untouched.
    async fn remove(&self, run_id: &str, step: &CascadeStep) -> Result<()>;
}

// ── Ingestion ledger ──

#[async_trait]
pub trait CycleLedger: Send + Sync {
    /// Cycles with ingested input for the run, `None` when the ledger has no
    /// record of the run.
    async fn ingested_cycles(&self, run_id: &str) -> Result<Option<BTreeSet<CycleId>>>;
}

// ── Guardrails ──

#[async_trait]
pub trait GuardrailStore: Send + Sync {
    /// Current flags for a run; unknown runs read as all-clear.
    async fn load(&self, run_id: &str) -> Result<GuardrailState>;

    /// Record that the TTUM package left the system. Idempotent; keeps the
    /// first download time. The only writer of guardrail state.
    async fn mark_ttum_downloaded(&self, run_id: &str, at: DateTime<Utc>)
        -> Result<GuardrailState>;
}

// ── Audit ledger (append-only) ──

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Durably append a record and return its sequence number.
    async fn append(&self, record: &RollbackRecord) -> Result<u64>;

    /// Records in append order, optionally filtered by run.
    async fn query(&self, run_id: Option<&str>) -> Result<Vec<RollbackRecord>>;
}

/// The full set of ports an engine instance is wired with.
#[derive(Clone)]
pub struct EnginePorts {
    pub runs: Arc<dyn RunRegistry>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub ledger: Arc<dyn CycleLedger>,
    pub guardrails: Arc<dyn GuardrailStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl EnginePorts {
    /// Every port served by one in-memory store.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            runs: store.clone(),
            artifacts: store.clone(),
            ledger: store.clone(),
            guardrails: store.clone(),
            audit: store,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_guardrails(mut self, guardrails: Arc<dyn GuardrailStore>) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = audit;
        self
    }
}
