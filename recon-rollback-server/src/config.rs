//! Server configuration, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use recon_rollback_core::EngineConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";
pub const DEFAULT_DATA_DIR: &str = "./data";

const AUDIT_LEDGER_FILE: &str = "audit.jsonl";
const GUARDRAILS_FILE: &str = "guardrails.json";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    /// Overrides the engine config's apply timeout when set.
    pub apply_timeout: Option<Duration>,
    /// YAML engine config; engine defaults are used when unset.
    pub engine_config_file: Option<PathBuf>,
    /// Run/artifact seed; the built-in demo runs are used when unset.
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            apply_timeout: None,
            engine_config_file: None,
            seed_file: None,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment.
    ///
    /// - `ROLLBACK_BIND_ADDR` (default `0.0.0.0:4200`)
    /// - `ROLLBACK_DATA_DIR` (default `./data`)
    /// - `ROLLBACK_ENGINE_CONFIG` (optional YAML engine config)
    /// - `ROLLBACK_APPLY_TIMEOUT_MS` (optional, wins over the engine config)
    /// - `ROLLBACK_SEED_FILE` (optional)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let apply_timeout = match lookup("ROLLBACK_APPLY_TIMEOUT_MS") {
            Some(raw) => Some(Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("ROLLBACK_APPLY_TIMEOUT_MS is not a number: {raw}"))?,
            )),
            None => defaults.apply_timeout,
        };
        let optional_path = |key: &str| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
        };

        Ok(Self {
            bind_addr: lookup("ROLLBACK_BIND_ADDR").unwrap_or(defaults.bind_addr),
            data_dir: lookup("ROLLBACK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            apply_timeout,
            engine_config_file: optional_path("ROLLBACK_ENGINE_CONFIG"),
            seed_file: optional_path("ROLLBACK_SEED_FILE"),
        })
    }

    pub fn audit_ledger_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_LEDGER_FILE)
    }

    pub fn guardrails_path(&self) -> PathBuf {
        self.data_dir.join(GUARDRAILS_FILE)
    }

    /// Engine config from `engine_config_file`, then the timeout override.
    pub async fn load_engine_config(&self) -> Result<EngineConfig> {
        let config = match &self.engine_config_file {
            Some(path) => {
                let yaml = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading engine config {}", path.display()))?;
                EngineConfig::from_yaml_str(&yaml)
                    .with_context(|| format!("parsing engine config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        Ok(match self.apply_timeout {
            Some(timeout) => config.with_apply_timeout(timeout),
            None => config,
        })
    }
}
