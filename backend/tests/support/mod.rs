#![allow(dead_code)]
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snapeat_backend::{
    bot::BotService,
    config::{Config, TransportMode},
    models::nutrition::NutritionResult,
    recognition::{NutritionLookup, RecognitionError, RecognitionService},
    repositories::InMemoryStore,
    services::{
        janitor::{JanitorSettings, SessionJanitor},
        metrics::MetricsCollector,
        session_store::SessionStore,
    },
    telegram::{
        types::{
            CallbackQuery, Chat, Message, PhotoSize, PreCheckoutQuery, SuccessfulPayment, TgUser,
            Voice,
        },
        InlineKeyboard, Invoice, Messenger, TransportError, Update,
    },
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tempfile::TempDir;

pub const ADMIN_ID: i64 = 1;

static NEXT_UPDATE_ID: AtomicI64 = AtomicI64::new(1);

fn next_update_id() -> i64 {
    NEXT_UPDATE_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        telegram_bot_token: "123456:test-token".into(),
        telegram_api_base: "http://127.0.0.1:9".into(),
        transport_mode: TransportMode::Webhook,
        webhook_url: None,
        webhook_secret: Some("s3cret".into()),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        recognition_api_url: "http://127.0.0.1:9".into(),
        recognition_api_key: None,
        recognition_timeout_secs: 5,
        payment_provider_token: "provider-token".into(),
        subscription_cost: 199.0,
        payment_currency: "RUB".into(),
        free_requests_limit: 5,
        admin_ids: vec![ADMIN_ID],
        time_zone: chrono_tz::Europe::Moscow,
        metrics_file: dir.join("metrics.json"),
        metrics_flush_interval_secs: 3600,
        download_dir: dir.join("uploads"),
        reconcile_interval_secs: 600,
        janitor_interval_secs: 1800,
        session_max_age_secs: 7200,
        food_cache_max_age_secs: 3600,
        session_max_entries: 10_000,
        janitor_alert_threshold: 100,
        worker_concurrency: 4,
        update_queue_capacity: 16,
    }
}

pub fn nutrition(name: &str, calories: f64, proteins: f64, fats: f64, carbs: f64, grams: f64) -> NutritionResult {
    NutritionResult {
        name: name.into(),
        calories,
        proteins,
        fats,
        carbs,
        portion_weight_grams: grams,
        is_estimated: false,
        no_food_detected: false,
    }
}

pub fn apple() -> NutritionResult {
    nutrition("Apple", 95.0, 0.5, 0.3, 25.0, 100.0)
}

/// Everything the bot said, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Sent {
        chat_id: i64,
        message_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Edited {
        chat_id: i64,
        message_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Deleted {
        chat_id: i64,
        message_id: i64,
    },
    CallbackAnswer {
        callback_id: String,
        text: Option<String>,
    },
    PreCheckout {
        query_id: String,
        ok: bool,
        error_message: Option<String>,
    },
    Invoice {
        chat_id: i64,
        invoice: Invoice,
    },
}

/// A message as currently displayed in a chat.
#[derive(Debug, Clone, PartialEq)]
pub struct Shown {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    outbound: Mutex<Vec<Outbound>>,
    next_message_id: AtomicI64,
    pub fail_sends: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    fn push(&self, item: Outbound) {
        self.outbound.lock().unwrap().push(item);
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.outbound.lock().unwrap().clear();
    }

    /// Texts of sent and edited messages, in order.
    pub fn texts(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Sent { text, .. } | Outbound::Edited { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().pop().expect("no message was sent")
    }

    pub fn sent_to(&self, chat: i64) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Sent { chat_id, text, .. } if chat_id == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Latest sent or edited message that carries a keyboard.
    pub fn last_with_keyboard(&self) -> Shown {
        self.outbound()
            .into_iter()
            .rev()
            .find_map(|item| match item {
                Outbound::Sent {
                    chat_id,
                    message_id,
                    text,
                    keyboard: Some(keyboard),
                }
                | Outbound::Edited {
                    chat_id,
                    message_id,
                    text,
                    keyboard: Some(keyboard),
                } => Some(Shown {
                    chat_id,
                    message_id,
                    text,
                    keyboard: Some(keyboard),
                }),
                _ => None,
            })
            .expect("no message with a keyboard")
    }

    pub fn callback_answers(&self) -> Vec<Option<String>> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::CallbackAnswer { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Invoice { invoice, .. } => Some(invoice),
                _ => None,
            })
            .collect()
    }

    pub fn pre_checkout_answers(&self) -> Vec<(bool, Option<String>)> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::PreCheckout {
                    ok, error_message, ..
                } => Some((ok, error_message)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Deleted { message_id, .. } => Some(message_id),
                _ => None,
            })
            .collect()
    }
}

fn unavailable() -> TransportError {
    TransportError::Api {
        code: 502,
        description: "Bad Gateway".into(),
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<i64, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.push(Outbound::Sent {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<(), TransportError> {
        self.push(Outbound::Edited {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        self.push(Outbound::Deleted {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<String>,
    ) -> Result<(), TransportError> {
        self.push(Outbound::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text,
        });
        Ok(())
    }

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<String>,
    ) -> Result<(), TransportError> {
        self.push(Outbound::PreCheckout {
            query_id: query_id.to_string(),
            ok,
            error_message,
        });
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<(), TransportError> {
        self.push(Outbound::Invoice {
            chat_id,
            invoice: invoice.clone(),
        });
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dir: &Path) -> Result<PathBuf, TransportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{file_id}.bin"));
        tokio::fs::write(&path, b"media").await?;
        Ok(path)
    }
}

/// Recognition double returning a configurable result.
#[derive(Default)]
pub struct StubRecognition {
    result: Mutex<Option<NutritionResult>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl StubRecognition {
    pub fn returns(&self, result: Option<NutritionResult>) {
        *self.result.lock().unwrap() = result;
    }

    fn outcome(&self) -> Result<Option<NutritionResult>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RecognitionError::Status(503));
        }
        Ok(self.result.lock().unwrap().clone())
    }
}

#[async_trait]
impl RecognitionService for StubRecognition {
    async fn analyze_image(&self, _path: &Path) -> Result<Option<NutritionResult>, RecognitionError> {
        self.outcome()
    }

    async fn analyze_voice(&self, _path: &Path) -> Result<Option<NutritionResult>, RecognitionError> {
        self.outcome()
    }

    async fn analyze_text(&self, _text: &str) -> Result<Option<NutritionResult>, RecognitionError> {
        self.outcome()
    }
}

#[derive(Default)]
pub struct StubLookup {
    result: Mutex<Option<NutritionResult>>,
    pub queries: Mutex<Vec<String>>,
}

impl StubLookup {
    pub fn returns(&self, result: Option<NutritionResult>) {
        *self.result.lock().unwrap() = result;
    }
}

#[async_trait]
impl NutritionLookup for StubLookup {
    async fn lookup(&self, name: &str) -> Result<Option<NutritionResult>, RecognitionError> {
        self.queries.lock().unwrap().push(name.to_string());
        Ok(self.result.lock().unwrap().clone())
    }
}

/// A bot wired to in-process doubles.
pub struct Harness {
    pub bot: Arc<BotService>,
    pub config: Arc<Config>,
    pub store: Arc<InMemoryStore>,
    pub sessions: SessionStore,
    pub messenger: Arc<RecordingMessenger>,
    pub recognition: Arc<StubRecognition>,
    pub lookup: Arc<StubLookup>,
    pub metrics: Arc<MetricsCollector>,
    pub janitor: Arc<SessionJanitor>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        adjust(&mut config);
        let config = Arc::new(config);

        let store = Arc::new(InMemoryStore::new());
        let sessions = SessionStore::new();
        let messenger = Arc::new(RecordingMessenger::new());
        let recognition = Arc::new(StubRecognition::default());
        let lookup = Arc::new(StubLookup::default());
        let metrics = Arc::new(MetricsCollector::open(&config.metrics_file, Utc::now()));
        let janitor = Arc::new(SessionJanitor::new(
            sessions.clone(),
            messenger.clone(),
            config.admin_ids.clone(),
            JanitorSettings::from_config(&config),
        ));
        let bot = Arc::new(BotService::new(
            config.clone(),
            store.clone(),
            sessions.clone(),
            messenger.clone(),
            recognition.clone(),
            lookup.clone(),
            metrics.clone(),
            janitor.clone(),
        ));

        Self {
            bot,
            config,
            store,
            sessions,
            messenger,
            recognition,
            lookup,
            metrics,
            janitor,
            dir,
        }
    }

    pub async fn process(&self, update: Update) {
        self.bot.process(update).await.expect("update handled");
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn user(id: i64) -> TgUser {
    TgUser {
        id,
        is_bot: false,
        first_name: format!("User{id}"),
        last_name: None,
        username: Some(format!("user{id}")),
    }
}

fn message(user_id: i64, message_id: i64) -> Message {
    Message {
        message_id,
        from: Some(user(user_id)),
        chat: Chat { id: user_id },
        date: Utc::now().timestamp(),
        text: None,
        caption: None,
        photo: None,
        voice: None,
        successful_payment: None,
    }
}

fn wrap_message(message: Message) -> Update {
    Update {
        update_id: next_update_id(),
        message: Some(message),
        callback_query: None,
        pre_checkout_query: None,
    }
}

pub fn text_update(user_id: i64, text: &str) -> Update {
    let mut message = message(user_id, 1);
    message.text = Some(text.to_string());
    wrap_message(message)
}

pub fn photo_update(user_id: i64, file_id: &str) -> Update {
    let mut message = message(user_id, 1);
    message.photo = Some(vec![
        PhotoSize {
            file_id: format!("{file_id}-thumb"),
            width: 90,
            height: 90,
        },
        PhotoSize {
            file_id: file_id.to_string(),
            width: 1280,
            height: 960,
        },
    ]);
    wrap_message(message)
}

pub fn voice_update(user_id: i64, file_id: &str) -> Update {
    let mut message = message(user_id, 1);
    message.voice = Some(Voice {
        file_id: file_id.to_string(),
        duration: 3,
    });
    wrap_message(message)
}

/// A button press on `shown` (or on a message with no known content).
pub fn callback_update(user_id: i64, shown: Option<&Shown>, data: &str) -> Update {
    let pressed = shown.map(|shown| {
        let mut pressed = message(user_id, shown.message_id);
        pressed.from = None;
        pressed.chat = Chat { id: shown.chat_id };
        pressed.text = Some(shown.text.clone());
        pressed
    });
    Update {
        update_id: next_update_id(),
        message: None,
        callback_query: Some(CallbackQuery {
            id: format!("cb-{}", next_update_id()),
            from: user(user_id),
            message: pressed,
            data: Some(data.to_string()),
        }),
        pre_checkout_query: None,
    }
}

pub fn pre_checkout_update(user_id: i64, payload: &str, currency: &str, amount: i64) -> Update {
    Update {
        update_id: next_update_id(),
        message: None,
        callback_query: None,
        pre_checkout_query: Some(PreCheckoutQuery {
            id: format!("pcq-{}", next_update_id()),
            from: user(user_id),
            currency: currency.to_string(),
            total_amount: amount,
            invoice_payload: payload.to_string(),
        }),
    }
}

pub fn payment_update(user_id: i64, payload: &str, amount: i64) -> Update {
    let mut message = message(user_id, 1);
    message.successful_payment = Some(SuccessfulPayment {
        currency: "RUB".into(),
        total_amount: amount,
        invoice_payload: payload.to_string(),
        telegram_payment_charge_id: format!("charge-{}", next_update_id()),
        provider_payment_charge_id: "provider-charge".into(),
    });
    wrap_message(message)
}
