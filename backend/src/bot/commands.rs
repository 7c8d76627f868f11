use chrono::{DateTime, Utc};

use super::{admin, billing, render, stats, BotService, Conversation};
use crate::{error::BotError, telegram::types::TgUser, utils::time::local_date};

/// `/name@bot args` -> `name`.
pub fn command_name(text: &str) -> &str {
    let head = text.split_whitespace().next().unwrap_or_default();
    let head = head.trim_start_matches('/');
    head.split('@').next().unwrap_or(head)
}

pub async fn dispatch(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    text: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let name = command_name(text).to_ascii_lowercase();
    if name == "cancel" {
        return cancel(bot, conversation, now).await;
    }

    // A command abandons whatever question was pending.
    bot.sessions
        .update(conversation.user_id, now, |record| record.reset_dialog());
    bot.metrics.record_command(&name, conversation.user_id);

    match name.as_str() {
        "start" => start(bot, conversation, from, now).await,
        "help" => {
            bot.send(conversation.chat_id, render::HELP, None).await?;
            Ok(())
        }
        "setup" => setup(bot, conversation, from).await,
        "subscription" => billing::show_status(bot, conversation, now).await,
        "stats" => {
            let today = local_date(now, &bot.config.time_zone);
            stats::show(bot, conversation, today, now).await
        }
        "metrics" | "memory" | "cleanup" | "reset_metrics" => {
            admin::dispatch(bot, conversation, &name, now).await
        }
        _ => {
            bot.send(conversation.chat_id, render::HELP, None).await?;
            Ok(())
        }
    }
}

async fn start(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    bot.ensure_user(from).await?;
    let remaining = bot
        .quota
        .remaining_free_requests(conversation.user_id, now)
        .await?;
    let subscribed = matches!(remaining, crate::services::quota::Remaining::Unlimited);
    bot.send(
        conversation.chat_id,
        &render::welcome(&from.first_name, remaining),
        Some(render::start_keyboard(subscribed)),
    )
    .await?;
    Ok(())
}

async fn setup(bot: &BotService, conversation: Conversation, from: &TgUser) -> Result<(), BotError> {
    let user = bot.ensure_user(from).await?;
    let profile = user.profile();
    let norms = user.norms();
    bot.send(
        conversation.chat_id,
        &render::setup_overview(profile.as_ref(), norms.as_ref()),
        Some(render::setup_keyboard()),
    )
    .await?;
    Ok(())
}

/// Clears any pending dialog step.
pub async fn cancel(
    bot: &BotService,
    conversation: Conversation,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let was_active = bot.sessions.update(conversation.user_id, now, |record| {
        let active = record.dialog_state != crate::services::dialog::DialogState::Idle;
        record.reset_dialog();
        active
    });
    let text = if was_active {
        render::CANCELLED
    } else {
        render::NOTHING_TO_CANCEL
    };
    bot.send(conversation.chat_id, text, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_name_strips_slash_mention_and_args() {
        assert_eq!(command_name("/start"), "start");
        assert_eq!(command_name("/stats@SnapEatBot today"), "stats");
        assert_eq!(command_name("/"), "");
    }
}
