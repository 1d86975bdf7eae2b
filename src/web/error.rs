use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::monitoring::MonitorError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<MonitorError> for AppError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::NoCheckConfig(service_id) => {
                AppError::NotFound(format!("no health check configured for service {service_id}"))
            }
            MonitorError::UnsupportedCheckType(kind) => {
                AppError::InvalidInput(format!("unsupported check type: {kind}"))
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::InternalServerError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(e) => {
                error!(error = %e, "database error while handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
