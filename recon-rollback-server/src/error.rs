//! Maps `RollbackError` onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recon_rollback_core::RollbackError;
use serde_json::json;

#[derive(Debug)]
pub struct AppError(pub RollbackError);

impl From<RollbackError> for AppError {
    fn from(err: RollbackError) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self(RollbackError::Internal(err.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &err {
            RollbackError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut error = json!({
            "kind": err.kind(),
            "message": message,
        });
        if let Some(id) = err.rollback_id() {
            error["rollback_id"] = json!(id);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
