use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::errors::AppError;
use crate::models::approval::{ApprovalOutcome, ApprovalResponse};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    /// Telegram `reply_markup`, forwarded as-is.
    pub keyboard: Option<serde_json::Value>,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/check-update/:message_id — wait for the operator's decision.
///
/// Holds the request open until the decision arrives or the configured
/// timeout passes. Dropping the connection cancels the wait.
pub async fn check_update(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> Result<Json<ApprovalResponse>, AppError> {
    let message_id = message_id.trim();
    if message_id.is_empty() {
        return Err(AppError::BadRequest("message id is required".into()));
    }

    match state
        .gateway
        .await_decision(message_id, state.config.approval_timeout())
        .await?
    {
        ApprovalOutcome::Resolved(decision) => Ok(Json(decision.into())),
        ApprovalOutcome::TimedOut => Err(AppError::ApprovalTimeout),
    }
}

/// POST /api/send-message — send a notification to the operator chat.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let text = payload
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("message text is required".into()))?;

    let message_id = state
        .bridge
        .channel
        .send_notification(&text, payload.keyboard.filter(|k| !k.is_null()))
        .await?;

    // Same shape as Telegram's own reply, so existing clients keep working.
    let id_value = match message_id.parse::<i64>() {
        Ok(id) => json!(id),
        Err(_) => json!(message_id),
    };
    Ok(Json(json!({ "ok": true, "result": { "message_id": id_value } })))
}

/// GET /metrics — Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let body = state.bridge.metrics.render()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
