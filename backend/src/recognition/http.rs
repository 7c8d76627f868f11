use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{NutritionLookup, RecognitionError, RecognitionService};
use crate::models::nutrition::NutritionResult;

/// Response body of the recognition service. Every field is optional so
/// sentinel payloads such as `{"no_food": true}` decode too.
#[derive(Debug, Default, Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    calories: f64,
    #[serde(default)]
    proteins: f64,
    #[serde(default)]
    fats: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    portion_weight: Option<f64>,
    #[serde(default)]
    is_estimated: bool,
    #[serde(default)]
    no_food: bool,
    #[serde(default)]
    no_voice: bool,
}

impl RecognitionResponse {
    fn into_result(self) -> Option<NutritionResult> {
        if self.no_voice {
            return None;
        }
        let name = self.name.unwrap_or_default();
        Some(NutritionResult {
            no_food_detected: self.no_food || name.trim().is_empty(),
            name,
            calories: self.calories,
            proteins: self.proteins,
            fats: self.fats,
            carbs: self.carbs,
            portion_weight_grams: self.portion_weight.unwrap_or(100.0),
            is_estimated: self.is_estimated,
        })
    }
}

#[derive(Serialize)]
struct MediaRequest<'a> {
    data_base64: String,
    file_name: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpRecognitionClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl HttpRecognitionClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: Client::builder().timeout(timeout).build()?,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<Option<NutritionResult>, RecognitionError> {
        let url = format!("{}/{}", self.base_url, route);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let started = std::time::Instant::now();
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(
            route,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recognition call finished"
        );

        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RecognitionError::Status(status.as_u16()));
        }
        let body: Option<RecognitionResponse> = response.json().await?;
        Ok(body.and_then(RecognitionResponse::into_result))
    }

    async fn post_media(
        &self,
        route: &str,
        path: &Path,
    ) -> Result<Option<NutritionResult>, RecognitionError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload");
        let body = MediaRequest {
            data_base64: STANDARD.encode(bytes),
            file_name,
        };
        self.post(route, &body).await
    }
}

#[async_trait]
impl RecognitionService for HttpRecognitionClient {
    async fn analyze_image(&self, path: &Path) -> Result<Option<NutritionResult>, RecognitionError> {
        self.post_media("analyze/image", path).await
    }

    async fn analyze_voice(&self, path: &Path) -> Result<Option<NutritionResult>, RecognitionError> {
        self.post_media("analyze/voice", path).await
    }

    async fn analyze_text(&self, text: &str) -> Result<Option<NutritionResult>, RecognitionError> {
        self.post("analyze/text", &serde_json::json!({ "text": text }))
            .await
    }
}

#[async_trait]
impl NutritionLookup for HttpRecognitionClient {
    async fn lookup(&self, name: &str) -> Result<Option<NutritionResult>, RecognitionError> {
        self.post("lookup", &serde_json::json!({ "name": name })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> Option<NutritionResult> {
        let body: Option<RecognitionResponse> = serde_json::from_str(raw).unwrap();
        body.and_then(RecognitionResponse::into_result)
    }

    #[test]
    fn full_payload_maps_to_result() {
        let result = decode(
            r#"{"name":"Apple","calories":95,"proteins":0.5,"fats":0.3,"carbs":25,"portion_weight":100}"#,
        )
        .unwrap();
        assert_eq!(result.name, "Apple");
        assert_eq!(result.calories, 95.0);
        assert!(!result.is_nothing_to_log());
    }

    #[test]
    fn sentinels_and_null_are_nothing_to_log() {
        assert!(decode("null").is_none());
        assert!(decode(r#"{"no_voice":true}"#).is_none());
        assert!(decode(r#"{"no_food":true}"#).unwrap().is_nothing_to_log());
        assert!(decode(r#"{"name":"Unknown dish"}"#).unwrap().is_nothing_to_log());
    }

    #[test]
    fn missing_portion_defaults_to_hundred_grams() {
        let result = decode(r#"{"name":"Tea","calories":2}"#).unwrap();
        assert_eq!(result.portion_weight_grams, 100.0);
    }
}
