//! Startup wiring: seeded run state, durable stores and the service.
//!
//! Runs and artifacts live in memory and are rebuilt from the seed on every
//! start. The audit ledger and guardrail flags are on disk, so the seed's
//! guardrail flags are merged into the guardrail file and the ledger is
//! replayed over the seeded runs before the service is handed out.

use std::sync::Arc;

use anyhow::{Context, Result};
use recon_rollback_core::ports::{AuditStore, GuardrailStore};
use recon_rollback_core::{
    EnginePorts, FileGuardrailStore, JsonlAuditStore, MemoryStore, RollbackService,
    RollbackServiceImpl, SeedBundle,
};
use tracing::info;

use crate::config::ServerConfig;

pub async fn load_seed(config: &ServerConfig) -> Result<SeedBundle> {
    let seed = match &config.seed_file {
        Some(path) => SeedBundle::from_yaml_file(path).await?,
        None => SeedBundle::demo()?,
    };
    info!(runs = seed.runs.len(), "Run seed loaded");
    Ok(seed)
}

/// Engine ports over the seed and the stores under `config.data_dir`.
pub async fn build_ports(config: &ServerConfig, seed: SeedBundle) -> Result<EnginePorts> {
    let downloaded: Vec<_> = seed
        .runs
        .iter()
        .filter(|s| s.guardrails.ttum_downloaded)
        .map(|s| {
            let at = s.guardrails.ttum_downloaded_at.unwrap_or(s.run.timestamp);
            (s.run.run_id.clone(), at)
        })
        .collect();
    let store = Arc::new(MemoryStore::from_seed(seed));

    let audit = JsonlAuditStore::open(config.audit_ledger_path()).await?;
    let records = audit.query(None).await?;
    store.replay(&records).await;

    // seeded flags only add to what is on disk; the first recorded time stays
    let guardrails = FileGuardrailStore::open(config.guardrails_path()).await?;
    for (run_id, at) in &downloaded {
        guardrails
            .mark_ttum_downloaded(run_id, *at)
            .await
            .with_context(|| format!("seeding guardrails for {run_id}"))?;
    }
    info!(
        ledger_records = records.len(),
        seeded_downloads = downloaded.len(),
        "Durable state restored"
    );

    Ok(EnginePorts::in_memory(store)
        .with_audit(Arc::new(audit))
        .with_guardrails(Arc::new(guardrails)))
}

/// The service exactly as the server binary runs it.
pub async fn build_service(config: &ServerConfig) -> Result<Arc<dyn RollbackService>> {
    let seed = load_seed(config).await?;
    let ports = build_ports(config, seed).await?;
    let engine = config.load_engine_config().await?;
    Ok(Arc::new(RollbackServiceImpl::new(ports, engine)))
}
