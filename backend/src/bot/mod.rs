//! Update handling: routes commands, button presses, dialog answers and
//! payments to the flows that serve them.

pub mod admin;
pub mod analysis;
pub mod billing;
pub mod callback;
pub mod commands;
pub mod dispatcher;
pub mod render;
pub mod stats;
pub mod wizard;

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use self::{callback::Callback, dispatcher::UpdateHandler};
use crate::{
    config::Config,
    error::BotError,
    models::user::{User, UserIdentity},
    recognition::{NutritionLookup, RecognitionService},
    repositories::NutritionStore,
    services::{
        dialog::{DialogState, WizardInput},
        janitor::SessionJanitor,
        metrics::MetricsRecorder,
        quota::QuotaService,
        session_store::SessionStore,
    },
    telegram::{
        types::{CallbackQuery, Message, TgUser},
        InlineKeyboard, Messenger, TransportError, Update,
    },
    validation::rules::is_cancel,
};

/// Everything a handler needs, shared by all workers.
pub struct BotService {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<dyn NutritionStore>,
    pub(crate) sessions: SessionStore,
    pub(crate) quota: QuotaService,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) recognition: Arc<dyn RecognitionService>,
    pub(crate) lookup: Arc<dyn NutritionLookup>,
    pub(crate) metrics: Arc<dyn MetricsRecorder>,
    pub(crate) janitor: Arc<SessionJanitor>,
}

/// Who pressed or sent something, and where to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversation {
    pub user_id: i64,
    pub chat_id: i64,
}

fn identity(user: &TgUser) -> UserIdentity {
    UserIdentity {
        telegram_id: user.id,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
        last_name: user.last_name.clone(),
    }
}

impl BotService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn NutritionStore>,
        sessions: SessionStore,
        messenger: Arc<dyn Messenger>,
        recognition: Arc<dyn RecognitionService>,
        lookup: Arc<dyn NutritionLookup>,
        metrics: Arc<dyn MetricsRecorder>,
        janitor: Arc<SessionJanitor>,
    ) -> Self {
        let quota = QuotaService::new(store.clone(), config.free_requests_limit);
        Self {
            config,
            store,
            sessions,
            quota,
            messenger,
            recognition,
            lookup,
            metrics,
            janitor,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles one update; errors are returned to the caller untouched.
    pub async fn process(&self, update: Update) -> Result<(), BotError> {
        let now = Utc::now();
        if let Some(query) = update.pre_checkout_query {
            return billing::on_pre_checkout(self, &query).await;
        }
        if let Some(query) = update.callback_query {
            return self.on_callback(query, now).await;
        }
        if let Some(message) = update.message {
            return self.on_message(message, now).await;
        }
        Ok(())
    }

    pub(crate) async fn ensure_user(&self, user: &TgUser) -> Result<User, BotError> {
        Ok(self.store.get_or_create_user(&identity(user)).await?)
    }

    pub(crate) async fn send(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<i64, TransportError> {
        let started = Instant::now();
        let result = self.messenger.send_message(chat_id, text, keyboard).await;
        self.metrics
            .record_call("send_message", started.elapsed(), result.is_err());
        result
    }

    /// Edits `message_id` in place, falling back to a new message when the
    /// edit is rejected. Returns the id of the message now showing `text`.
    pub(crate) async fn edit_or_send(
        &self,
        chat_id: i64,
        message_id: Option<i64>,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<i64, TransportError> {
        if let Some(message_id) = message_id {
            match self
                .messenger
                .edit_message(chat_id, message_id, text, keyboard.clone())
                .await
            {
                Ok(()) => return Ok(message_id),
                Err(err) => {
                    tracing::debug!(chat_id, message_id, error = %err, "edit failed, sending a new message")
                }
            }
        }
        self.send(chat_id, text, keyboard).await
    }

    pub(crate) async fn answer(&self, callback_id: &str, text: Option<&str>) {
        if let Err(err) = self
            .messenger
            .answer_callback(callback_id, text.map(str::to_string))
            .await
        {
            tracing::warn!(callback_id, error = %err, "failed to answer callback");
        }
    }

    async fn on_message(&self, message: Message, now: DateTime<Utc>) -> Result<(), BotError> {
        let Some(from) = message.from.clone() else {
            return Ok(());
        };
        let conversation = Conversation {
            user_id: from.id,
            chat_id: message.chat.id,
        };
        self.sessions.touch(conversation.user_id, now);

        if let Some(payment) = &message.successful_payment {
            return billing::on_successful_payment(self, conversation, &from, payment, now).await;
        }
        if let Some(photo) = message.photo.as_ref().and_then(|sizes| sizes.last()) {
            return analysis::analyze_photo(self, conversation, &from, &photo.file_id, now).await;
        }
        if let Some(voice) = &message.voice {
            return analysis::analyze_voice(self, conversation, &from, &voice.file_id, now).await;
        }
        let Some(text) = message.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        if text.starts_with('/') {
            return commands::dispatch(self, conversation, &from, text, now).await;
        }
        if is_cancel(text) {
            return commands::cancel(self, conversation, now).await;
        }

        let state = self.sessions.get(conversation.user_id, now).dialog_state;
        match state {
            DialogState::Idle => {
                analysis::analyze_text(self, conversation, &from, text, now).await
            }
            DialogState::AwaitingManualNorms => {
                wizard::on_manual_norms(self, conversation, &from, text, now).await
            }
            DialogState::AwaitingFoodName => {
                analysis::on_food_name(self, conversation, &from, text, now).await
            }
            DialogState::AwaitingPortionSize => {
                analysis::on_portion_size(self, conversation, text, now).await
            }
            _ => wizard::on_answer(self, conversation, &from, WizardInput::Text(text), None, now).await,
        }
    }

    async fn on_callback(&self, query: CallbackQuery, now: DateTime<Utc>) -> Result<(), BotError> {
        let chat_id = query
            .message
            .as_ref()
            .map(|message| message.chat.id)
            .unwrap_or(query.from.id);
        let conversation = Conversation {
            user_id: query.from.id,
            chat_id,
        };
        self.sessions.touch(conversation.user_id, now);

        let data = query.data.as_deref().unwrap_or_default();
        let Some(callback) = Callback::parse(data) else {
            tracing::warn!(user_id = conversation.user_id, data, "unknown callback payload");
            self.answer(&query.id, None).await;
            return Ok(());
        };

        let callback_id = query.id.as_str();
        match callback {
            Callback::SetupProfile => {
                self.answer(callback_id, None).await;
                wizard::start_profile(self, conversation, now).await
            }
            Callback::SetupManualNorms => {
                self.answer(callback_id, None).await;
                wizard::start_manual_norms(self, conversation, now).await
            }
            Callback::Gender(gender) => {
                wizard::on_answer(self, conversation, &query.from, WizardInput::Gender(gender), Some(callback_id), now).await
            }
            Callback::Activity(level) => {
                wizard::on_answer(self, conversation, &query.from, WizardInput::Activity(level), Some(callback_id), now).await
            }
            Callback::Goal(goal) => {
                wizard::on_answer(self, conversation, &query.from, WizardInput::Goal(goal), Some(callback_id), now).await
            }
            Callback::Subscribe => {
                self.answer(callback_id, None).await;
                billing::show_plans(self, conversation).await
            }
            Callback::SubscribePlan(months) => {
                billing::send_plan_invoice(self, conversation, months, callback_id, now).await
            }
            Callback::AddStats(owner_id) => {
                analysis::add_to_stats(self, conversation, &query, owner_id, now).await
            }
            Callback::SpecifyFood => {
                self.answer(callback_id, None).await;
                analysis::start_food_name(self, conversation, now).await
            }
            Callback::SpecifyPortion => analysis::start_portion(self, conversation, &query, now).await,
            Callback::StatsPrev(date) => {
                self.answer(callback_id, None).await;
                let target = date.pred_opt().unwrap_or(date);
                stats::navigate(self, conversation, &query, target, now).await
            }
            Callback::StatsNext(date) => {
                self.answer(callback_id, None).await;
                let target = date.succ_opt().unwrap_or(date);
                stats::navigate(self, conversation, &query, target, now).await
            }
            Callback::StatsToday => {
                self.answer(callback_id, None).await;
                let today = crate::utils::time::local_date(now, &self.config.time_zone);
                stats::navigate(self, conversation, &query, today, now).await
            }
        }
    }

    /// Tells the user something failed and leaves the dialog recoverable.
    async fn report_failure(&self, chat_id: Option<i64>, err: &BotError) {
        self.metrics.record_error(err.kind());
        let Some(chat_id) = chat_id else {
            return;
        };
        let text = match err {
            BotError::Payment(_) => render::PAYMENT_SUPPORT,
            _ => render::GENERIC_FAILURE,
        };
        if let Err(send_err) = self.send(chat_id, text, None).await {
            tracing::warn!(chat_id, error = %send_err, "failed to deliver failure notice");
        }
    }
}

fn reply_chat(update: &Update) -> Option<i64> {
    if let Some(message) = &update.message {
        return Some(message.chat.id);
    }
    if let Some(query) = &update.callback_query {
        return Some(
            query
                .message
                .as_ref()
                .map(|message| message.chat.id)
                .unwrap_or(query.from.id),
        );
    }
    update.pre_checkout_query.as_ref().map(|query| query.from.id)
}

#[async_trait]
impl UpdateHandler for BotService {
    async fn handle(&self, update: Update) {
        let update_id = update.update_id;
        let user_id = update.sender_id();
        let chat_id = reply_chat(&update);
        if let Err(err) = self.process(update).await {
            tracing::error!(update_id, user_id, kind = err.kind(), error = %err, "update handling failed");
            self.report_failure(chat_id, &err).await;
        }
    }
}
