//! Meal analysis: photo, voice and text recognition, adding results to the
//! food log, and the portion and dish-name refinements.

use std::{path::PathBuf, time::Instant};

use chrono::{DateTime, Utc};

use super::{render, BotService, Conversation};
use crate::{
    error::BotError,
    models::{
        food_analysis::{MealType, NewFoodAnalysis},
        nutrition::{FoodSnapshot, NutritionResult},
    },
    recognition::RecognitionError,
    services::{
        dialog::DialogState,
        food_card,
        metrics::AnalysisKind,
        quota::Remaining,
        session_store::CachedAnalysis,
    },
    telegram::types::{CallbackQuery, TgUser},
    utils::time::local_hour,
    validation::rules::parse_portion_grams,
};

enum Source<'a> {
    Photo(&'a str),
    Voice(&'a str),
    Text(&'a str),
}

impl Source<'_> {
    fn kind(&self) -> AnalysisKind {
        match self {
            Source::Photo(_) => AnalysisKind::Photo,
            Source::Voice(_) => AnalysisKind::Voice,
            Source::Text(_) => AnalysisKind::Text,
        }
    }
}

pub async fn analyze_photo(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    file_id: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    analyze(bot, conversation, from, Source::Photo(file_id), now).await
}

pub async fn analyze_voice(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    file_id: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    analyze(bot, conversation, from, Source::Voice(file_id), now).await
}

pub async fn analyze_text(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    text: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    analyze(bot, conversation, from, Source::Text(text), now).await
}

async fn analyze(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    source: Source<'_>,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let user_id = conversation.user_id;
    bot.sessions.clear_transient(user_id);
    // Refinements refer to the previous result, which is gone now.
    bot.sessions.update(user_id, now, |record| {
        if matches!(
            record.dialog_state,
            DialogState::AwaitingFoodName | DialogState::AwaitingPortionSize
        ) {
            record.reset_dialog();
        }
    });
    bot.ensure_user(from).await?;

    let remaining = bot.quota.remaining_free_requests(user_id, now).await?;
    if remaining.is_exhausted() {
        bot.send(
            conversation.chat_id,
            &render::quota_exhausted(bot.quota.free_limit()),
            Some(render::subscribe_keyboard()),
        )
        .await?;
        return Ok(());
    }

    let processing_id = bot
        .send(conversation.chat_id, render::PROCESSING, None)
        .await?;

    let kind = source.kind();
    let (outcome, image_path) = recognize(bot, &source).await?;
    let result = match outcome {
        Ok(Some(result)) if !result.is_nothing_to_log() => result,
        Ok(_) => {
            bot.edit_or_send(conversation.chat_id, Some(processing_id), render::NOTHING_TO_LOG, None)
                .await?;
            return Ok(());
        }
        Err(err) => {
            tracing::warn!(user_id, kind = kind.as_str(), error = %err, "recognition failed");
            bot.metrics.record_error("recognition");
            bot.edit_or_send(
                conversation.chat_id,
                Some(processing_id),
                render::RECOGNITION_UNAVAILABLE,
                None,
            )
            .await?;
            return Ok(());
        }
    };

    let food = FoodSnapshot::from_result(&result, image_path);
    let subscribed = matches!(remaining, Remaining::Unlimited);
    let message_id = bot
        .edit_or_send(
            conversation.chat_id,
            Some(processing_id),
            &food_card::render(&food),
            Some(render::result_keyboard(user_id, true, subscribed)),
        )
        .await?;
    cache_result(bot, user_id, food, message_id, now);
    bot.metrics.record_analysis(kind, user_id);
    Ok(())
}

/// Downloads media when needed and calls the matching recognition
/// endpoint. Transport failures propagate; recognition failures are
/// returned for the caller to explain.
async fn recognize(
    bot: &BotService,
    source: &Source<'_>,
) -> Result<(Result<Option<NutritionResult>, RecognitionError>, Option<String>), BotError> {
    let kind = source.kind();
    let download_dir = bot.config.download_dir.as_path();
    let started;
    let (outcome, image_path) = match source {
        Source::Photo(file_id) => {
            let path = bot.messenger.download_file(file_id, download_dir).await?;
            started = Instant::now();
            let outcome = bot.recognition.analyze_image(&path).await;
            (outcome, Some(path.to_string_lossy().into_owned()))
        }
        Source::Voice(file_id) => {
            let path: PathBuf = bot.messenger.download_file(file_id, download_dir).await?;
            started = Instant::now();
            let outcome = bot.recognition.analyze_voice(&path).await;
            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove voice file");
            }
            (outcome, None)
        }
        Source::Text(text) => {
            started = Instant::now();
            (bot.recognition.analyze_text(text).await, None)
        }
    };
    bot.metrics
        .record_call(kind.api_name(), started.elapsed(), outcome.is_err());
    Ok((outcome, image_path))
}

fn cache_result(
    bot: &BotService,
    user_id: i64,
    food: FoodSnapshot,
    message_id: i64,
    now: DateTime<Utc>,
) {
    bot.sessions.update(user_id, now, |record| {
        record.last_food_analysis = Some(CachedAnalysis::new(food, Some(message_id), now));
    });
}

enum Reservation {
    Reserved(FoodSnapshot),
    AlreadyAdded,
    Missing,
}

/// Persists the cached result shown in the pressed message. The message id
/// is the idempotence key: it is reserved before the write and released if
/// the write fails.
pub async fn add_to_stats(
    bot: &BotService,
    conversation: Conversation,
    query: &CallbackQuery,
    owner_id: i64,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    if owner_id != conversation.user_id {
        bot.answer(&query.id, Some(render::NOT_YOUR_RESULT)).await;
        return Ok(());
    }
    let Some(message) = &query.message else {
        bot.answer(&query.id, Some(render::RESULT_EXPIRED)).await;
        return Ok(());
    };
    let message_id = message.message_id;
    let key = message_id.to_string();

    let reservation = bot.sessions.update(conversation.user_id, now, |record| {
        if record.committed_analysis_keys.contains(&key) {
            return Reservation::AlreadyAdded;
        }
        match &record.last_food_analysis {
            Some(cached) if cached.message_id == Some(message_id) => {
                record.committed_analysis_keys.insert(key.clone());
                Reservation::Reserved(cached.food.clone())
            }
            _ => Reservation::Missing,
        }
    });

    let food = match reservation {
        Reservation::AlreadyAdded => {
            bot.answer(&query.id, Some(render::ALREADY_ADDED)).await;
            return Ok(());
        }
        Reservation::Missing => {
            bot.answer(&query.id, Some(render::RESULT_EXPIRED)).await;
            return Ok(());
        }
        Reservation::Reserved(food) => food,
    };

    let meal_type = MealType::from_local_hour(local_hour(now, &bot.config.time_zone));
    let entry = NewFoodAnalysis::from_snapshot(conversation.user_id, &food, now, meal_type);
    if let Err(err) = bot.store.save_food_analysis(&entry).await {
        bot.sessions.update(conversation.user_id, now, |record| {
            record.committed_analysis_keys.remove(&key);
        });
        return Err(err.into());
    }
    tracing::info!(
        user_id = conversation.user_id,
        meal_type = meal_type.as_str(),
        "food analysis added to statistics"
    );

    bot.answer(&query.id, Some(render::ADDED)).await;
    let subscribed = bot
        .quota
        .is_subscription_active(conversation.user_id, now)
        .await?;
    let text = message
        .text
        .clone()
        .unwrap_or_else(|| food_card::render(&food));
    if let Err(err) = bot
        .messenger
        .edit_message(
            conversation.chat_id,
            message_id,
            &text,
            Some(render::result_keyboard(conversation.user_id, false, subscribed)),
        )
        .await
    {
        tracing::debug!(message_id, error = %err, "could not remove add button");
    }
    Ok(())
}

pub async fn start_food_name(
    bot: &BotService,
    conversation: Conversation,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let prompt_id = bot
        .send(conversation.chat_id, render::FOOD_NAME_PROMPT, None)
        .await?;
    bot.sessions.update(conversation.user_id, now, |record| {
        record.dialog_state = DialogState::AwaitingFoodName;
        record.pending_message_id = Some(prompt_id);
    });
    Ok(())
}

/// Looks the dish up by name and overwrites the latest log entry when the
/// user has one.
pub async fn on_food_name(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    name: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let user_id = conversation.user_id;
    let previous = bot.sessions.update(user_id, now, |record| {
        record.reset_dialog();
        record.last_food_analysis.clone()
    });

    let started = Instant::now();
    let outcome = bot.lookup.lookup(name).await;
    bot.metrics
        .record_call("lookup", started.elapsed(), outcome.is_err());
    let result = match outcome {
        Ok(Some(result)) if !result.is_nothing_to_log() => result,
        Ok(_) => {
            bot.send(conversation.chat_id, render::NOT_FOUND_BY_NAME, None)
                .await?;
            return Ok(());
        }
        Err(err) => {
            tracing::warn!(user_id, error = %err, "lookup failed");
            bot.metrics.record_error("recognition");
            bot.send(conversation.chat_id, render::RECOGNITION_UNAVAILABLE, None)
                .await?;
            return Ok(());
        }
    };

    bot.ensure_user(from).await?;
    let overwritten = bot
        .store
        .overwrite_latest_analysis(user_id, &result.name, &result)
        .await?;
    let subscribed = bot.quota.is_subscription_active(user_id, now).await?;

    let image_path = previous.and_then(|cached| cached.food.source_image_path);
    let food = FoodSnapshot::from_result(&result, image_path);
    let mut text = food_card::render(&food);
    if overwritten.is_some() {
        text.push_str("\n\n");
        text.push_str(render::ENTRY_UPDATED);
    }
    let message_id = bot
        .send(
            conversation.chat_id,
            &text,
            Some(render::result_keyboard(user_id, overwritten.is_none(), subscribed)),
        )
        .await?;
    cache_result(bot, user_id, food, message_id, now);
    Ok(())
}

/// Portion button: prefers the structured copy of the pressed result and
/// falls back to reading the pressed message text.
pub async fn start_portion(
    bot: &BotService,
    conversation: Conversation,
    query: &CallbackQuery,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let pressed = query.message.as_ref();
    let pressed_id = pressed.map(|message| message.message_id);
    let cached = bot
        .sessions
        .get(conversation.user_id, now)
        .last_food_analysis
        .filter(|cached| pressed_id.is_none() || cached.message_id == pressed_id);

    let food = match cached {
        Some(cached) => Some(cached.food),
        None => {
            let recovered = pressed
                .and_then(|message| message.text.as_deref())
                .and_then(food_card::parse);
            if let Some(food) = &recovered {
                tracing::debug!(user_id = conversation.user_id, "recovered analysis from message text");
                cache_result(bot, conversation.user_id, food.clone(), pressed_id.unwrap_or_default(), now);
            }
            recovered
        }
    };

    let Some(food) = food else {
        bot.answer(&query.id, None).await;
        bot.send(conversation.chat_id, render::RESUBMIT_PHOTO, None)
            .await?;
        return Ok(());
    };

    bot.answer(&query.id, None).await;
    let prompt_id = bot
        .send(
            conversation.chat_id,
            &render::portion_prompt(food.portion_weight_grams),
            None,
        )
        .await?;
    bot.sessions.update(conversation.user_id, now, |record| {
        record.dialog_state = DialogState::AwaitingPortionSize;
        record.pending_message_id = Some(prompt_id);
    });
    Ok(())
}

pub async fn on_portion_size(
    bot: &BotService,
    conversation: Conversation,
    text: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let user_id = conversation.user_id;
    let grams = match parse_portion_grams(text) {
        Ok(grams) => grams,
        Err(err) => {
            bot.send(
                conversation.chat_id,
                &render::invalid_input(&err),
                None,
            )
            .await?;
            return Ok(());
        }
    };

    let cached = bot.sessions.update(user_id, now, |record| {
        record.reset_dialog();
        record.last_food_analysis.clone()
    });
    let Some(cached) = cached else {
        bot.send(conversation.chat_id, render::RESUBMIT_PHOTO, None)
            .await?;
        return Ok(());
    };

    let food = cached.with_portion(grams);
    let subscribed = bot.quota.is_subscription_active(user_id, now).await?;
    let message_id = bot
        .send(
            conversation.chat_id,
            &food_card::render(&food),
            Some(render::result_keyboard(user_id, true, subscribed)),
        )
        .await?;
    bot.sessions.update(user_id, now, |record| {
        record.last_food_analysis = Some(cached.reshown(food, Some(message_id), now));
    });
    Ok(())
}
