//! Wire-level request bodies.
//!
//! Callers send loosely-typed JSON; `parse` turns it into a `RollbackRequest`
//! or a `Validation` error naming the offending field.

use serde::{Deserialize, Serialize};

use crate::error::RollbackError;
use crate::types::{CycleId, RollbackLevel, RollbackRequest};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRequestBody {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub cycle_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RollbackRequestBody {
    pub fn new(run_id: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            level: Some(level.into()),
            ..Self::default()
        }
    }

    pub fn with_cycle(mut self, cycle_id: impl Into<String>) -> Self {
        self.cycle_id = Some(cycle_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn parse(&self) -> Result<RollbackRequest, RollbackError> {
        let run_id = self
            .run_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RollbackError::Validation("run_id is required".to_string()))?;

        let level: RollbackLevel = self
            .level
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| RollbackError::Validation("level is required".to_string()))?
            .parse()
            .map_err(RollbackError::Validation)?;

        let cycle_id = match self.cycle_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<CycleId>().map_err(RollbackError::Validation)?),
        };

        let mut request = RollbackRequest::new(run_id, level);
        if let Some(cycle) = cycle_id {
            request = request.with_cycle(cycle);
        }
        if let Some(reason) = self.reason.as_deref().map(str::trim) {
            if !reason.is_empty() {
                request = request.with_reason(reason);
            }
        }
        request.check_cycle_scope()?;
        Ok(request)
    }
}

/// Optional run filter for history queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRollbacksQuery {
    #[serde(default)]
    pub run_id: Option<String>,
}
