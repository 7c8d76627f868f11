//! Daily statistics view with day-by-day navigation.

use chrono::{DateTime, NaiveDate, Utc};

use super::{render, BotService, Conversation};
use crate::{
    error::BotError,
    models::food_analysis::DailyStats,
    telegram::types::CallbackQuery,
    utils::time::{local_date, local_day_bounds},
};

/// Sends the report for `date`, never later than today.
pub async fn show(
    bot: &BotService,
    conversation: Conversation,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let tz = &bot.config.time_zone;
    let today = local_date(now, tz);
    let date = date.min(today);

    let (from, to) = local_day_bounds(date, tz);
    let rows = bot
        .store
        .food_analyses_between(conversation.user_id, from, to)
        .await?;
    let norms = bot
        .store
        .find_user(conversation.user_id)
        .await?
        .and_then(|user| user.norms());
    let stats = DailyStats::from_rows(rows);

    bot.send(
        conversation.chat_id,
        &render::daily_report(date, &stats, norms.as_ref()),
        Some(render::stats_keyboard(date, today)),
    )
    .await?;
    Ok(())
}

/// Replaces the pressed report with the one for `date`.
pub async fn navigate(
    bot: &BotService,
    conversation: Conversation,
    query: &CallbackQuery,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    if let Some(message) = &query.message {
        if let Err(err) = bot
            .messenger
            .delete_message(conversation.chat_id, message.message_id)
            .await
        {
            tracing::debug!(message_id = message.message_id, error = %err, "could not delete old report");
        }
    }
    show(bot, conversation, date, now).await
}
