//! Profile wizard and manual norms entry.

use chrono::{DateTime, Utc};

use super::{render, BotService, Conversation};
use crate::{
    error::BotError,
    services::{
        dialog::{advance, start_wizard, DialogState, WizardError, WizardInput, WizardStep},
        norms::calculate_daily_norms,
    },
    telegram::{types::TgUser, InlineKeyboard},
    validation::rules::parse_manual_norms,
};

fn prompt_for(state: DialogState) -> Option<(String, Option<InlineKeyboard>)> {
    let prompt = match state {
        DialogState::AwaitingGender => {
            let (text, keyboard) = render::gender_prompt();
            (text.to_string(), Some(keyboard))
        }
        DialogState::AwaitingAge => (render::AGE_PROMPT.to_string(), None),
        DialogState::AwaitingWeight => (render::WEIGHT_PROMPT.to_string(), None),
        DialogState::AwaitingHeight => (render::HEIGHT_PROMPT.to_string(), None),
        DialogState::AwaitingActivity => {
            let (text, keyboard) = render::activity_prompt();
            (text.to_string(), Some(keyboard))
        }
        DialogState::AwaitingGoal => {
            let (text, keyboard) = render::goal_prompt();
            (text.to_string(), Some(keyboard))
        }
        _ => return None,
    };
    Some(prompt)
}

pub async fn start_profile(
    bot: &BotService,
    conversation: Conversation,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let state = bot.sessions.update(conversation.user_id, now, |record| {
        let state = start_wizard(&mut record.profile_draft);
        record.dialog_state = state;
        record.pending_message_id = None;
        state
    });
    if let Some((text, keyboard)) = prompt_for(state) {
        let message_id = bot.send(conversation.chat_id, &text, keyboard).await?;
        bot.sessions.update(conversation.user_id, now, |record| {
            record.pending_message_id = Some(message_id);
        });
    }
    Ok(())
}

/// Applies one wizard answer. Invalid answers re-prompt without changing
/// the state; button presses that do not match the current step are
/// refused.
pub async fn on_answer(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    input: WizardInput<'_>,
    callback_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let record = bot.sessions.get(conversation.user_id, now);
    let mut draft = record.profile_draft.clone();

    match advance(record.dialog_state, &mut draft, input) {
        Err(WizardError::OutOfStep) => {
            match callback_id {
                Some(callback_id) => {
                    bot.answer(callback_id, Some(render::START_SETUP_AGAIN)).await
                }
                None => {
                    bot.send(conversation.chat_id, render::CHOOSE_WITH_BUTTONS, None)
                        .await?;
                }
            }
            Ok(())
        }
        Err(WizardError::Invalid(err)) => {
            if let Some(callback_id) = callback_id {
                bot.answer(callback_id, None).await;
            }
            let (prompt, keyboard) = prompt_for(record.dialog_state).unwrap_or_default();
            let text = format!("{}\n\n{}", render::invalid_input(&err), prompt);
            bot.send(conversation.chat_id, &text, keyboard).await?;
            Ok(())
        }
        Ok(WizardStep::Next(next)) => {
            if let Some(callback_id) = callback_id {
                bot.answer(callback_id, None).await;
            }
            bot.sessions.update(conversation.user_id, now, |record| {
                record.profile_draft = draft;
                record.dialog_state = next;
            });
            if let Some((text, keyboard)) = prompt_for(next) {
                // Button answers edit the prompt in place; typed answers get
                // a fresh prompt below the user's message.
                let pending = callback_id.and(record.pending_message_id);
                let message_id = bot
                    .edit_or_send(conversation.chat_id, pending, &text, keyboard)
                    .await?;
                bot.sessions.update(conversation.user_id, now, |record| {
                    record.pending_message_id = Some(message_id);
                });
            }
            Ok(())
        }
        Ok(WizardStep::Completed(profile)) => {
            if let Some(callback_id) = callback_id {
                bot.answer(callback_id, None).await;
            }
            let norms = calculate_daily_norms(&profile);
            bot.ensure_user(from).await?;
            bot.store
                .save_profile(conversation.user_id, &profile, &norms)
                .await?;
            bot.sessions.update(conversation.user_id, now, |record| {
                record.profile_draft = draft;
                record.reset_dialog();
            });
            tracing::info!(user_id = conversation.user_id, "profile saved");
            bot.edit_or_send(
                conversation.chat_id,
                record.pending_message_id,
                &render::profile_saved(&norms),
                None,
            )
            .await?;
            Ok(())
        }
    }
}

pub async fn start_manual_norms(
    bot: &BotService,
    conversation: Conversation,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    bot.sessions.update(conversation.user_id, now, |record| {
        record.dialog_state = DialogState::AwaitingManualNorms;
        record.pending_message_id = None;
    });
    bot.send(conversation.chat_id, render::MANUAL_NORMS_PROMPT, None)
        .await?;
    Ok(())
}

/// Consumes the single answer to the manual norms prompt. The state ends
/// whatever the outcome; rejected input leaves stored norms untouched.
pub async fn on_manual_norms(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    text: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    bot.sessions
        .update(conversation.user_id, now, |record| record.reset_dialog());

    match parse_manual_norms(text) {
        Ok(norms) => {
            bot.ensure_user(from).await?;
            bot.store.save_norms(conversation.user_id, &norms).await?;
            bot.send(
                conversation.chat_id,
                &render::manual_norms_saved(&norms),
                None,
            )
            .await?;
        }
        Err(err) => {
            bot.send(
                conversation.chat_id,
                &render::manual_norms_rejected(&err),
                None,
            )
            .await?;
        }
    }
    Ok(())
}
