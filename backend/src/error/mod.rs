use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    recognition::RecognitionError, repositories::StoreError, services::payments::PaymentError,
    telegram::TransportError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Errors surfaced by the HTTP endpoints.
#[derive(Debug)]
pub enum AppError {
    Forbidden(String),
    BadRequest(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "Malformed update payload".to_string(),
                "BAD_REQUEST".to_string(),
                Some(serde_json::json!({ "reason": msg })),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE".to_string(),
                None,
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::ServiceUnavailable(format!("Store unavailable: {}", err))
    }
}

/// Failure of a single bot update handler.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl BotError {
    /// Short label used for error-type counters.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Store(StoreError::Transient(_)) => "store_transient",
            BotError::Store(_) => "store",
            BotError::Transport(_) => "transport",
            BotError::Recognition(_) => "recognition",
            BotError::Payment(_) => "payment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn app_error_into_response_maps_status_and_body() {
        let response = AppError::Forbidden("denied".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = response_json(response).await;
        assert_eq!(json["error"], "denied");
        assert_eq!(json["code"], "FORBIDDEN");

        let response = AppError::ServiceUnavailable("busy".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = response_json(response).await;
        assert_eq!(json["error"], "busy");
        assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn bad_request_carries_reason_in_details() {
        let response = AppError::BadRequest("missing field `update_id`".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["code"], "BAD_REQUEST");
        assert_eq!(json["details"]["reason"], "missing field `update_id`");
    }

    #[tokio::test]
    async fn internal_error_hides_cause() {
        let response = AppError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn bot_error_kind_distinguishes_transient_store_failures() {
        let transient = BotError::from(StoreError::Transient(sqlx::Error::PoolTimedOut));
        assert_eq!(transient.kind(), "store_transient");
        let payment = BotError::from(PaymentError::MalformedPayload("x".into()));
        assert_eq!(payment.kind(), "payment");
    }
}
