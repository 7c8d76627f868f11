use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub users: i64,
    pub analyses: i64,
    pub active_subscriptions: i64,
    pub sessions: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let now = Utc::now();
    let health = state.store.health(now).await.map_err(|err| {
        tracing::error!(error = %err, "health check failed");
        AppError::from(err)
    })?;
    Ok(Json(HealthResponse {
        status: "ok",
        users: health.users,
        analyses: health.analyses,
        active_subscriptions: health.active_subscriptions,
        sessions: state.sessions.len(),
        timestamp: now,
    }))
}
