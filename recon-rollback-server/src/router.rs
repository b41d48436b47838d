//! Router construction for the rollback server.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use recon_rollback_core::RollbackService;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;

/// Build the full axum router with all routes and middleware.
pub fn build_router(service: Arc<dyn RollbackService>) -> Router {
    let runs = Router::new()
        .route("/runs", get(handlers::runs::list_runs))
        .route("/runs/history", get(handlers::runs::run_history))
        .route("/runs/:run_id/cycles", get(handlers::runs::available_cycles))
        .route("/runs/:run_id/audit", get(handlers::runs::audit_trail))
        .route("/runs/:run_id/guardrails", get(handlers::runs::guardrail_state))
        .route(
            "/runs/:run_id/ttum-downloaded",
            post(handlers::runs::mark_ttum_downloaded),
        );

    let rollbacks = Router::new()
        .route(
            "/rollbacks",
            get(handlers::rollbacks::rollback_history).post(handlers::rollbacks::rollback),
        )
        .route("/rollbacks/plan", post(handlers::rollbacks::plan_rollback));

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(runs)
        .merge(rollbacks)
        .layer(Extension(service))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
