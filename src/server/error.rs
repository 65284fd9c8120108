//! Error type returned by every handler.
//!
//! Anything that goes wrong before the download starts becomes a JSON
//! `{"error": "..."}` body with a matching status. Once bytes are streaming
//! the status is committed, so later failures are only logged.

use crate::error::ConvertError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no file provided")]
    NoFileProvided,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NoFileProvided => (StatusCode::BAD_REQUEST, "No file provided".to_owned()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m.clone()),
            ApiError::Convert(e) => {
                let status = match e {
                    ConvertError::UnsupportedFormat { .. } | ConvertError::InvalidOptions(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    ConvertError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    ConvertError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    ConvertError::Failed(_) | ConvertError::OutputOverflow { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    ConvertError::Io(_) => {
                        error!(error = %e, "i/o error during conversion");
                        return internal();
                    }
                };
                if e.is_client_error() {
                    warn!(error = %e, "rejected conversion request");
                } else {
                    error!(error = %e, "conversion failed");
                }
                (status, e.to_string())
            }
            ApiError::Internal(m) => {
                error!(message = %m, "internal server error");
                return internal();
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn internal() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ApiError::Internal");
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("conversion task aborted: {e}"))
    }
}
