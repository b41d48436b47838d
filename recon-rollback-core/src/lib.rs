//! Granular rollback and recovery for reconciliation runs.
//!
//! A run's artifacts can be removed at five levels (`file`, `recon`,
//! `reports`, `ttum`, `complete`). Each level cascades through a fixed set of
//! artifact classes, an irreversible TTUM download permanently blocks the
//! levels that would remove the TTUM package, and every attempt that reaches
//! the guardrail leaves an immutable record in an append-only audit ledger.
//!
//! ```text
//! RollbackService
//!   └─ RollbackExecutor ── RollbackLevelPolicy / GuardrailEvaluator / CycleScopeResolver
//!        ├─ RunLocks (one attempt per run)
//!        ├─ AuditRecorder ──> AuditStore
//!        └─ EnginePorts (RunRegistry, ArtifactStore, CycleLedger, GuardrailStore)
//! ```

pub mod audit;
pub mod config;
pub mod cycles;
pub mod error;
pub mod executor;
pub mod guardrail;
pub mod history;
pub mod locks;
pub mod policy;
pub mod ports;
pub mod proto;
pub mod service;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use config::EngineConfig;
pub use error::{ErrorKind, RollbackError};
pub use executor::{AttemptState, RollbackExecutor, RollbackPreview};
pub use ports::EnginePorts;
pub use proto::{ListRollbacksQuery, RollbackRequestBody};
pub use service::{RollbackService, RollbackServiceImpl};
pub use store_file::{FileGuardrailStore, JsonlAuditStore};
pub use store_memory::{MemoryStore, SeedBundle};
pub use types::*;
