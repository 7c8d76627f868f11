use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;

use crate::{error::AppError, state::AppState, telegram::Update};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Accepts one update from the Bot API and queues it for the dispatcher.
/// Handling happens asynchronously; the response only acknowledges receipt.
pub async fn receive_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(secret) {
            tracing::warn!("webhook call with invalid secret token");
            return Err(AppError::Forbidden("Invalid secret token".to_string()));
        }
    }

    let update: Update = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!(error = %err, "malformed webhook payload");
        AppError::BadRequest(err.to_string())
    })?;
    let update_id = update.update_id;

    match state.update_tx.try_send(update) {
        Ok(()) => {
            tracing::debug!(update_id, "update queued");
            Ok(Json(json!({ "ok": true })))
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!(update_id, "update queue full, asking for redelivery");
            Err(AppError::ServiceUnavailable(
                "Update queue is full".to_string(),
            ))
        }
        Err(TrySendError::Closed(_)) => {
            tracing::error!(update_id, "update queue closed");
            Err(AppError::ServiceUnavailable(
                "Bot is shutting down".to_string(),
            ))
        }
    }
}
