//! Bot API client over `reqwest`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use super::{
    types::{InlineKeyboard, Invoice, Update},
    Messenger, TransportError,
};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// Seconds the server holds a `getUpdates` request open.
pub const LONG_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TelegramClient {
    api_base: String,
    token: String,
    http: Client,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 30))
            .build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<P, T>(&self, method: &str, payload: &P) -> Result<T, TransportError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await?;
        let body: ApiResponse<T> = response.json().await?;
        if !body.ok {
            return Err(TransportError::Api {
                code: body.error_code.unwrap_or_default(),
                description: body.description.unwrap_or_default(),
            });
        }
        body.result
            .ok_or_else(|| TransportError::Decode(format!("{} returned no result", method)))
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query", "pre_checkout_query"],
            }),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TransportError> {
        let mut payload = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query", "pre_checkout_query"],
        });
        if let Some(secret) = secret {
            payload["secret_token"] = json!(secret);
        }
        let _: bool = self.call("setWebhook", &payload).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: bool = self.call("deleteWebhook", &json!({})).await?;
        Ok(())
    }
}

fn is_not_modified(err: &TransportError) -> bool {
    matches!(err, TransportError::Api { description, .. } if description.contains("message is not modified"))
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<i64, TransportError> {
        let mut payload = json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = json!(keyboard);
        }
        let sent: SentMessage = self.call("sendMessage", &payload).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<(), TransportError> {
        let mut payload = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = json!(keyboard);
        }
        match self.call::<_, serde_json::Value>("editMessageText", &payload).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_modified(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<String>,
    ) -> Result<(), TransportError> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<String>,
    ) -> Result<(), TransportError> {
        let mut payload = json!({ "pre_checkout_query_id": query_id, "ok": ok });
        if let Some(error_message) = error_message {
            payload["error_message"] = json!(error_message);
        }
        let _: bool = self.call("answerPreCheckoutQuery", &payload).await?;
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<(), TransportError> {
        let payload = json!({
            "chat_id": chat_id,
            "title": invoice.title,
            "description": invoice.description,
            "payload": invoice.payload,
            "provider_token": invoice.provider_token,
            "currency": invoice.currency,
            "prices": invoice.prices,
        });
        let _: serde_json::Value = self.call("sendInvoice", &payload).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dir: &Path) -> Result<PathBuf, TransportError> {
        let info: FileInfo = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let remote_path = info
            .file_path
            .ok_or_else(|| TransportError::Decode("getFile returned no file_path".into()))?;

        let bytes = self
            .http
            .get(self.file_url(&remote_path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let extension = Path::new(&remote_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        tokio::fs::create_dir_all(dir).await?;
        let local_path = dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension));
        tokio::fs::write(&local_path, &bytes).await?;
        Ok(local_path)
    }
}
