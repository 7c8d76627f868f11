//! Nutrition recognition collaborators.
//!
//! `Ok(None)` and results flagged as "nothing to log" are normal outcomes;
//! errors are reserved for transport failures.

pub mod http;

use std::path::Path;

use async_trait::async_trait;

use crate::models::nutrition::NutritionResult;

pub use http::HttpRecognitionClient;

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("recognition service returned status {0}")]
    Status(u16),
    #[error("failed to read media: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn analyze_image(&self, path: &Path) -> Result<Option<NutritionResult>, RecognitionError>;

    async fn analyze_voice(&self, path: &Path) -> Result<Option<NutritionResult>, RecognitionError>;

    async fn analyze_text(&self, text: &str) -> Result<Option<NutritionResult>, RecognitionError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NutritionLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Option<NutritionResult>, RecognitionError>;
}
