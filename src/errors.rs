use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::notification::ChannelError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("approval already pending for message {0}")]
    ApprovalPending(String),

    #[error("approval timeout")]
    ApprovalTimeout,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::DuplicateKey(key) => AppError::ApprovalPending(key),
            BridgeError::ChannelFetch(e) => AppError::Channel(e),
            other => AppError::Internal(other.into()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ApprovalPending(_) => StatusCode::CONFLICT,
            AppError::ApprovalTimeout => StatusCode::REQUEST_TIMEOUT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Channel(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, code, msg) = match &self {
            AppError::ApprovalPending(key) => (
                "conflict_error",
                "approval_pending",
                format!("a decision for message {} is already being awaited", key),
            ),
            AppError::ApprovalTimeout => (
                "timeout_error",
                "approval_timeout",
                "no response from the operator before the deadline".to_string(),
            ),
            AppError::BadRequest(msg) => ("invalid_request_error", "bad_request", msg.clone()),
            AppError::Channel(e) => {
                tracing::warn!("Channel error: {}", e);
                ("upstream_error", "channel_failed", e.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
