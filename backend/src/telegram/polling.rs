//! Long-poll update source for deployments without a public webhook.

use std::time::Duration;

use tokio::sync::mpsc;

use super::{types::Update, TelegramClient};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Pulls updates forever and forwards them to the dispatcher queue. Returns
/// when the queue is closed.
pub async fn run_polling(client: TelegramClient, queue: mpsc::Sender<Update>) {
    if let Err(err) = client.delete_webhook().await {
        tracing::warn!(error = %err, "failed to remove webhook before polling");
    }

    let mut offset = 0;
    loop {
        match client.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if queue.send(update).await.is_err() {
                        tracing::info!("update queue closed, stopping poller");
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "getUpdates failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
}
