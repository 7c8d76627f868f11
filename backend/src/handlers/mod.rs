pub mod health;
pub mod webhook;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub const WEBHOOK_PATH: &str = "/telegram/webhook";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(WEBHOOK_PATH, post(webhook::receive_update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
