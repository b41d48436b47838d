//! Run handlers.
//!
//! GET  /runs                         : runs as reported by the run provider
//! GET  /runs/history                 : runs with their latest rollback
//! GET  /runs/:run_id/cycles          : cycles eligible for file-level rollback
//! GET  /runs/:run_id/audit           : audit trail for one run
//! GET  /runs/:run_id/guardrails      : guardrail flags
//! POST /runs/:run_id/ttum-downloaded : download-completion event

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use recon_rollback_core::RollbackService;
use serde_json::json;

use crate::error::AppError;

pub async fn list_runs(
    Extension(service): Extension<Arc<dyn RollbackService>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let runs = service.list_runs().await?;
    Ok(Json(serde_json::to_value(&runs)?))
}

pub async fn run_history(
    Extension(service): Extension<Arc<dyn RollbackService>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let history = service.run_history().await?;
    Ok(Json(serde_json::to_value(&history)?))
}

pub async fn available_cycles(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cycles = service.available_cycles(&run_id).await?;
    Ok(Json(json!({ "run_id": run_id, "cycles": cycles })))
}

pub async fn audit_trail(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = service.audit_trail(&run_id).await?;
    Ok(Json(serde_json::to_value(&records)?))
}

pub async fn guardrail_state(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let state = service.guardrail_state(&run_id).await?;
    Ok(Json(serde_json::to_value(&state)?))
}

pub async fn mark_ttum_downloaded(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let state = service.mark_ttum_downloaded(&run_id).await?;
    Ok(Json(serde_json::to_value(&state)?))
}
