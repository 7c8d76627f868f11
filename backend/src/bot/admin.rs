//! Operator commands, restricted to `ADMIN_IDS`.

use chrono::{DateTime, Duration, Utc};

use super::{render, BotService, Conversation};
use crate::error::BotError;

pub async fn dispatch(
    bot: &BotService,
    conversation: Conversation,
    command: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    if !bot.config.is_admin(conversation.user_id) {
        tracing::warn!(user_id = conversation.user_id, command, "admin command refused");
        bot.send(conversation.chat_id, render::ACCESS_DENIED, None)
            .await?;
        return Ok(());
    }

    let text = match command {
        "metrics" => metrics_report(bot, now).await?,
        "memory" => render::memory_report(&bot.sessions.stats(now), bot.janitor.settings()),
        "cleanup" => {
            let report = bot.janitor.force_cleanup(now, Duration::hours(1));
            tracing::info!(
                before = report.before,
                after = report.after,
                evicted = report.evicted_idle,
                "forced session cleanup"
            );
            format!(
                "🧹 Cleanup done: {} sessions evicted, {} -> {}.",
                report.evicted_idle, report.before, report.after
            )
        }
        "reset_metrics" => {
            bot.metrics.reset(now);
            match bot.metrics.flush() {
                Ok(()) => "Metrics reset.".to_string(),
                Err(err) => {
                    tracing::error!(error = %err, "failed to persist reset metrics");
                    "Metrics reset, but saving them failed.".to_string()
                }
            }
        }
        _ => render::HELP.to_string(),
    };
    bot.send(conversation.chat_id, &text, None).await?;
    Ok(())
}

async fn metrics_report(bot: &BotService, now: DateTime<Utc>) -> Result<String, BotError> {
    let summary = bot.metrics.summary(now);
    let health = bot.store.health(now).await?;
    let last_day = bot
        .store
        .count_food_analyses_since(now - Duration::hours(24))
        .await?;
    Ok(format!(
        "{}\n\n🗄 Database\nUsers: {}\nAnalyses: {} ({} in the last 24h)\nActive subscriptions: {}",
        summary.render(),
        health.users,
        health.analyses,
        last_day,
        health.active_subscriptions
    ))
}
