//! Rollback Executor
//!
//! Drives a single rollback attempt through the state machine
//!
//! ```text
//! Requested → Validated → GuardrailChecked → Applying → Committed
//!                  │               │             │
//!                  └───────────────┴─────────────┴──→ Failed
//! ```
//!
//! There is no retry in place: a failed attempt is terminal and the caller
//! issues a new request. Committed attempts, guardrail denials and execution
//! failures each leave exactly one record in the audit ledger.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::audit::AuditRecorder;
use crate::config::EngineConfig;
use crate::cycles::CycleScopeResolver;
use crate::error::{ErrorKind, RollbackError};
use crate::guardrail::{GuardrailDecision, GuardrailEvaluator};
use crate::locks::RunLocks;
use crate::policy::RollbackLevelPolicy;
use crate::ports::EnginePorts;
use crate::types::*;

/// Position of an attempt in the rollback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Requested,
    Validated,
    GuardrailChecked,
    Applying,
    Committed,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Requested, Validated)
                | (Requested, Failed)
                | (Validated, GuardrailChecked)
                | (Validated, Failed)
                | (GuardrailChecked, Applying)
                | (GuardrailChecked, Failed)
                | (Applying, Committed)
                | (Applying, Failed)
        )
    }
}

struct Attempt<'a> {
    request: &'a RollbackRequest,
    state: AttemptState,
}

impl<'a> Attempt<'a> {
    fn new(request: &'a RollbackRequest) -> Self {
        Self {
            request,
            state: AttemptState::Requested,
        }
    }

    fn advance(&mut self, next: AttemptState) -> Result<(), RollbackError> {
        if !self.state.can_transition_to(next) {
            return Err(RollbackError::Internal(anyhow!(
                "illegal rollback transition {:?} -> {:?} for run {}",
                self.state,
                next,
                self.request.run_id
            )));
        }
        debug!(
            run_id = %self.request.run_id,
            level = %self.request.level,
            from = ?self.state,
            to = ?next,
            "Rollback attempt transition"
        );
        self.state = next;
        Ok(())
    }
}

/// Dry-run result: what an attempt would remove right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPreview {
    pub run_id: RunId,
    pub level: RollbackLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<CycleId>,
    pub steps: Vec<CascadeStep>,
    pub skipped_steps: Vec<CascadeStep>,
    /// Lower levels this rollback makes redundant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsumed_levels: Vec<RollbackLevel>,
}

struct StepFailure {
    step: CascadeStep,
    error: String,
}

pub struct RollbackExecutor {
    ports: EnginePorts,
    audit: AuditRecorder,
    resolver: CycleScopeResolver,
    locks: RunLocks,
    config: EngineConfig,
}

impl RollbackExecutor {
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        Self {
            audit: AuditRecorder::new(ports.audit.clone()),
            resolver: CycleScopeResolver::new(config.fallback_cycle_range),
            locks: RunLocks::new(),
            ports,
            config,
        }
    }

    pub fn locks(&self) -> &RunLocks {
        &self.locks
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn resolver(&self) -> &CycleScopeResolver {
        &self.resolver
    }

    /// Run one rollback attempt to a terminal state.
    pub async fn execute(&self, request: RollbackRequest) -> Result<RollbackRecord, RollbackError> {
        let result = self.run_attempt(&request).await;
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::ExecutionError | ErrorKind::Internal => error!(
                    run_id = %request.run_id,
                    level = %request.level,
                    kind = %err.kind(),
                    rollback_id = ?err.rollback_id(),
                    error = %err,
                    "Rollback failed"
                ),
                _ => warn!(
                    run_id = %request.run_id,
                    level = %request.level,
                    kind = %err.kind(),
                    error = %err,
                    "Rollback rejected"
                ),
            }
        }
        result
    }

    /// Validate, check guardrails and compute the cascade without mutating
    /// anything or writing to the audit ledger.
    pub async fn preview(&self, request: &RollbackRequest) -> Result<RollbackPreview, RollbackError> {
        let run = self.load_run(request).await?;
        self.resolve_cycle(request, &run).await?;
        ensure_not_in_progress(&run)?;
        if let Some(reason) = self.guardrail_denial(request, &run).await? {
            return Err(RollbackError::GuardrailViolation {
                reason,
                rollback_id: None,
            });
        }
        let (steps, skipped_steps) = self.plan_steps(request, &run).await?;
        Ok(RollbackPreview {
            run_id: run.run_id,
            level: request.level,
            cycle_id: request.cycle_id,
            steps,
            skipped_steps,
            subsumed_levels: RollbackLevelPolicy::subsumed_levels(request.level),
        })
    }

    async fn run_attempt(&self, request: &RollbackRequest) -> Result<RollbackRecord, RollbackError> {
        let mut attempt = Attempt::new(request);

        // Requested → Validated
        let run = self.load_run(request).await?;
        self.resolve_cycle(request, &run).await?;
        let _lease = self.locks.try_acquire(&run.run_id)?;
        ensure_not_in_progress(&run)?;
        attempt.advance(AttemptState::Validated)?;

        // Validated → GuardrailChecked
        if let Some(reason) = self.guardrail_denial(request, &run).await? {
            attempt.advance(AttemptState::Failed)?;
            return Err(self.record_guardrail_denial(request, reason).await);
        }
        attempt.advance(AttemptState::GuardrailChecked)?;

        let (steps, skipped) = self.plan_steps(request, &run).await?;

        // GuardrailChecked → Applying
        attempt.advance(AttemptState::Applying)?;
        let mut completed = Vec::with_capacity(steps.len());
        let applied = tokio::time::timeout(
            self.config.apply_timeout(),
            self.apply_steps(&run.run_id, &steps, &mut completed),
        )
        .await;

        match applied {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                attempt.advance(AttemptState::Failed)?;
                let reason = format!(
                    "cascade step {} failed after {} of {} steps: {}",
                    failure.step,
                    completed.len(),
                    steps.len(),
                    failure.error
                );
                return Err(self
                    .record_execution_failure(request, completed, Some(failure.step), reason)
                    .await);
            }
            Err(_elapsed) => {
                attempt.advance(AttemptState::Failed)?;
                let in_flight = steps.get(completed.len()).copied();
                let reason = format!(
                    "timeout: apply phase exceeded {}ms with {} of {} steps done",
                    self.config.apply_timeout_ms,
                    completed.len(),
                    steps.len()
                );
                return Err(self
                    .record_execution_failure(request, completed, in_flight, reason)
                    .await);
            }
        }

        // Applying → Committed
        let run_status = if request.level == RollbackLevel::Complete {
            if let Err(e) = self
                .ports
                .runs
                .update_run_status(&run.run_id, RunStatus::RolledBack)
                .await
            {
                attempt.advance(AttemptState::Failed)?;
                let reason = format!("marking run {} rolled back failed: {e:#}", run.run_id);
                return Err(self
                    .record_execution_failure(request, completed, None, reason)
                    .await);
            }
            RunStatus::RolledBack
        } else {
            run.status
        };
        attempt.advance(AttemptState::Committed)?;

        let record = RollbackRecord::new(
            request,
            RecordStatus::Completed,
            RecordDetails::Committed {
                steps: completed,
                skipped_steps: skipped,
                run_status,
            },
        );
        let record = self.audit.append(record).await?;
        info!(
            rollback_id = %record.rollback_id,
            run_id = %record.run_id,
            level = %record.level,
            cycle_id = ?record.cycle_id.map(|c| c.to_string()),
            "Rollback committed"
        );
        Ok(record)
    }

    async fn load_run(&self, request: &RollbackRequest) -> Result<Run, RollbackError> {
        if request.run_id.trim().is_empty() {
            return Err(RollbackError::Validation("run_id is required".to_string()));
        }
        request.check_cycle_scope()?;
        self.ports
            .runs
            .get_run(&request.run_id)
            .await?
            .ok_or_else(|| RollbackError::NotFound(format!("run {} not found", request.run_id)))
    }

    async fn guardrail_denial(
        &self,
        request: &RollbackRequest,
        run: &Run,
    ) -> Result<Option<String>, RollbackError> {
        let state = self.ports.guardrails.load(&run.run_id).await?;
        match GuardrailEvaluator::evaluate(request.level, run, &state) {
            GuardrailDecision::Allowed => Ok(None),
            GuardrailDecision::Denied { reason } => Ok(Some(reason)),
        }
    }

    /// A file-level request must name a cycle the run still has available.
    async fn resolve_cycle(&self, request: &RollbackRequest, run: &Run) -> Result<(), RollbackError> {
        if let Some(cycle) = request.cycle_id {
            let ledger = self.ports.ledger.ingested_cycles(&run.run_id).await?;
            self.resolver.resolve(run, ledger.as_ref(), cycle)?;
        }
        Ok(())
    }

    /// Split the cascade into steps to apply and steps whose artifacts are
    /// already gone. An attempt with nothing to apply is `NotFound`.
    async fn plan_steps(
        &self,
        request: &RollbackRequest,
        run: &Run,
    ) -> Result<(Vec<CascadeStep>, Vec<CascadeStep>), RollbackError> {
        let plan = RollbackLevelPolicy::apply(request.level, run, request.cycle_id)?;
        let inventory = self.ports.artifacts.inventory(&run.run_id).await?;
        let (steps, skipped) = plan.partition(&inventory);
        if steps.is_empty() {
            let scope = request
                .cycle_id
                .map(|c| format!(" for cycle {}", c))
                .unwrap_or_default();
            return Err(RollbackError::NotFound(format!(
                "nothing left to roll back: run {} has no `{}` artifacts{}",
                run.run_id, request.level, scope
            )));
        }
        Ok((steps, skipped))
    }

    /// Apply steps strictly in cascade order, stopping at the first failure.
    async fn apply_steps(
        &self,
        run_id: &str,
        steps: &[CascadeStep],
        completed: &mut Vec<CascadeStep>,
    ) -> Result<(), StepFailure> {
        for step in steps {
            debug!(run_id, step = %step, "Removing artifacts");
            if let Err(e) = self.ports.artifacts.remove(run_id, step).await {
                return Err(StepFailure {
                    step: *step,
                    error: format!("{e:#}"),
                });
            }
            completed.push(*step);
        }
        Ok(())
    }

    async fn record_guardrail_denial(
        &self,
        request: &RollbackRequest,
        reason: String,
    ) -> RollbackError {
        let record = RollbackRecord::new(
            request,
            RecordStatus::Failed,
            RecordDetails::GuardrailDenied {
                reason: reason.clone(),
            },
        );
        match self.audit.append(record).await {
            Ok(record) => RollbackError::GuardrailViolation {
                reason,
                rollback_id: Some(record.rollback_id),
            },
            Err(audit_err) => audit_err,
        }
    }

    async fn record_execution_failure(
        &self,
        request: &RollbackRequest,
        completed_steps: Vec<CascadeStep>,
        failed_step: Option<CascadeStep>,
        reason: String,
    ) -> RollbackError {
        let record = RollbackRecord::new(
            request,
            RecordStatus::Failed,
            RecordDetails::ExecutionFailed {
                completed_steps,
                failed_step,
                error: reason.clone(),
            },
        );
        match self.audit.append(record).await {
            Ok(record) => RollbackError::Execution {
                reason,
                rollback_id: Some(record.rollback_id),
            },
            Err(audit_err) => RollbackError::execution(format!("{reason}; {audit_err}")),
        }
    }
}

fn ensure_not_in_progress(run: &Run) -> Result<(), RollbackError> {
    if run.status == RunStatus::InProgress {
        return Err(RollbackError::Conflict(format!(
            "run {} is still being reconciled; roll back once it completes",
            run.run_id
        )));
    }
    Ok(())
}
