//! Guardrail Evaluator
//!
//! The single safety check consulted before any destructive action. Input
//! validation (missing cycle, unknown level) is not a guardrail concern.

use serde::{Deserialize, Serialize};

use crate::types::{GuardrailState, RollbackLevel, Run};

/// Outcome of a guardrail evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardrailDecision {
    Allowed,
    Denied { reason: String },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub struct GuardrailEvaluator;

impl GuardrailEvaluator {
    /// Deny TTUM-touching levels once the TTUM package has left the system.
    pub fn evaluate(level: RollbackLevel, run: &Run, state: &GuardrailState) -> GuardrailDecision {
        if !(level.touches_ttum() && state.ttum_downloaded) {
            return GuardrailDecision::Allowed;
        }

        let when = state
            .ttum_downloaded_at
            .map(|at| format!(" at {}", at.to_rfc3339()))
            .unwrap_or_default();

        GuardrailDecision::Denied {
            reason: format!(
                "ttum already downloaded: TTUM files for run {} were downloaded{}, \
                 so `{}` rollback is permanently blocked",
                run.run_id, when, level
            ),
        }
    }
}
