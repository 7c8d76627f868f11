//! Persistence: Postgres query functions, the [`NutritionStore`] port and
//! its implementations.

pub mod food_analysis;
pub mod memory;
pub mod retry;
pub mod store;
pub mod subscription;
pub mod user;

pub use memory::InMemoryStore;
pub use retry::RetryPolicy;
pub use store::{NutritionStore, PgStore, PurgeReport, StoreHealth};

#[cfg(test)]
pub use store::MockNutritionStore;

/// Persistence failure after the retry policy has been applied.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transient database failure persisted after retries: {0}")]
    Transient(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Database(other),
        }
    }
}
