//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on the apply phase of a single rollback
pub const DEFAULT_APPLY_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum duration of the apply phase before the attempt fails with a timeout
    pub apply_timeout_ms: u64,
    /// Offer the static `1C..10C` range when the ingestion ledger has no record of a run
    pub fallback_cycle_range: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apply_timeout_ms: DEFAULT_APPLY_TIMEOUT_MS,
            fallback_cycle_range: true,
        }
    }
}

impl EngineConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }

    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
