//! Rollback handlers.
//!
//! POST /rollbacks       : execute a rollback
//! POST /rollbacks/plan  : dry-run: cascade that would be applied
//! GET  /rollbacks       : audit ledger, optionally `?run_id=`

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query},
    Extension, Json,
};
use recon_rollback_core::{ListRollbacksQuery, RollbackError, RollbackRequestBody, RollbackService};

use crate::error::AppError;

fn request_body(
    body: Result<Json<RollbackRequestBody>, JsonRejection>,
) -> Result<RollbackRequestBody, AppError> {
    body.map(|Json(body)| body)
        .map_err(|rejection| RollbackError::Validation(rejection.body_text()).into())
}

pub async fn rollback(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    body: Result<Json<RollbackRequestBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = service.rollback(request_body(body)?).await?;
    Ok(Json(serde_json::to_value(&record)?))
}

pub async fn plan_rollback(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    body: Result<Json<RollbackRequestBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let preview = service.plan_rollback(request_body(body)?).await?;
    Ok(Json(serde_json::to_value(&preview)?))
}

pub async fn rollback_history(
    Extension(service): Extension<Arc<dyn RollbackService>>,
    Query(query): Query<ListRollbacksQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = service.rollback_history(query.run_id.as_deref()).await?;
    Ok(Json(serde_json::to_value(&records)?))
}
