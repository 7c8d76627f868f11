//! Messaging transport: Bot API types, the [`Messenger`] port and its
//! HTTP implementation.

pub mod client;
pub mod polling;
pub mod types;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use client::TelegramClient;
pub use types::{InlineButton, InlineKeyboard, Invoice, LabeledPrice, Update};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bot api error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Outbound side of the chat transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a text message and returns its message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<i64, TransportError>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<String>,
    ) -> Result<(), TransportError>;

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<String>,
    ) -> Result<(), TransportError>;

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<(), TransportError>;

    /// Downloads a file into `dir` and returns the local path.
    async fn download_file(&self, file_id: &str, dir: &Path) -> Result<PathBuf, TransportError>;
}
