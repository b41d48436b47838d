//! Rollback engine errors and their stable kinds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error kind reported to callers and recorded in audit details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    GuardrailViolation,
    Conflict,
    ExecutionError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::NotFound => "not_found",
            Self::GuardrailViolation => "guardrail_violation",
            Self::Conflict => "conflict",
            Self::ExecutionError => "execution_error",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RollbackError {
    /// Malformed request. Caller-correctable.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown run, cycle outside the run's available set, or nothing left to roll back.
    #[error("not found: {0}")]
    NotFound(String),

    /// Business-rule rejection. Never retriable for the same run and level.
    #[error("guardrail violation: {reason}")]
    GuardrailViolation {
        reason: String,
        rollback_id: Option<String>,
    },

    /// Another attempt is applying for the same run.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cascade application failed or timed out.
    #[error("execution error: {reason}")]
    Execution {
        reason: String,
        rollback_id: Option<String>,
    },

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RollbackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::GuardrailViolation { .. } => ErrorKind::GuardrailViolation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Execution { .. } => ErrorKind::ExecutionError,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::GuardrailViolation { .. } => 422,
            Self::Conflict(_) => 409,
            Self::Execution { .. } => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Only a conflict clears on its own, once the in-flight attempt terminates.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Id of the audit record written for this failure, if one was written.
    pub fn rollback_id(&self) -> Option<&str> {
        match self {
            Self::GuardrailViolation { rollback_id, .. } | Self::Execution { rollback_id, .. } => {
                rollback_id.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn with_rollback_id(self, id: impl Into<String>) -> Self {
        match self {
            Self::GuardrailViolation { reason, .. } => Self::GuardrailViolation {
                reason,
                rollback_id: Some(id.into()),
            },
            Self::Execution { reason, .. } => Self::Execution {
                reason,
                rollback_id: Some(id.into()),
            },
            other => other,
        }
    }

    pub(crate) fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
            rollback_id: None,
        }
    }
}
