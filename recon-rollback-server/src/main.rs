//! recon-rollback-server: REST server for the reconciliation rollback engine.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   ROLLBACK_BIND_ADDR       : listen address (default: 0.0.0.0:4200)
//!   ROLLBACK_DATA_DIR        : audit ledger and guardrail files (default: ./data)
//!   ROLLBACK_ENGINE_CONFIG   : YAML engine config (default: engine defaults)
//!   ROLLBACK_APPLY_TIMEOUT_MS: apply-phase bound per rollback, overrides the engine config
//!   ROLLBACK_SEED_FILE       : YAML runs/artifacts seed (default: built-in demo runs)

use anyhow::{Context, Result};
use recon_rollback_server::bootstrap::build_service;
use recon_rollback_server::config::ServerConfig;
use recon_rollback_server::router::build_router;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,recon_rollback_core=debug,recon_rollback_server=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let service = build_service(&config).await?;
    let app = build_router(service);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!(
        "recon-rollback-server listening on {} (data dir {})",
        config.bind_addr,
        config.data_dir.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
