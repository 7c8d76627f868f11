//! Subscription status, invoices and payment callbacks.

use chrono::{DateTime, Utc};

use super::{render, BotService, Conversation};
use crate::{
    error::BotError,
    services::payments::{
        build_invoice, find_plan, validate_pre_checkout, InvoicePayload, PaymentError,
    },
    telegram::types::{PreCheckoutQuery, SuccessfulPayment, TgUser},
};

pub async fn show_status(
    bot: &BotService,
    conversation: Conversation,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let tz = &bot.config.time_zone;
    let text = match bot
        .quota
        .current_subscription(conversation.user_id, now)
        .await?
    {
        Some(subscription) => render::subscription_active(subscription.end_date, now, tz),
        None => {
            let remaining = bot
                .quota
                .remaining_free_requests(conversation.user_id, now)
                .await?;
            render::subscription_inactive(remaining)
        }
    };
    bot.send(
        conversation.chat_id,
        &text,
        Some(render::subscribe_keyboard()),
    )
    .await?;
    Ok(())
}

pub async fn show_plans(bot: &BotService, conversation: Conversation) -> Result<(), BotError> {
    let cost = bot.config.subscription_cost;
    bot.send(
        conversation.chat_id,
        &render::plans_text(cost, &bot.config.payment_currency),
        Some(render::plans_keyboard(cost)),
    )
    .await?;
    Ok(())
}

pub async fn send_plan_invoice(
    bot: &BotService,
    conversation: Conversation,
    months: u32,
    callback_id: &str,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let plan = match find_plan(months) {
        Ok(plan) => plan,
        Err(err) => {
            bot.answer(callback_id, Some(err.user_message())).await;
            return Ok(());
        }
    };
    bot.answer(callback_id, None).await;
    let invoice = build_invoice(
        conversation.user_id,
        plan,
        bot.config.subscription_cost,
        &bot.config.payment_currency,
        &bot.config.payment_provider_token,
        now,
    );
    bot.messenger
        .send_invoice(conversation.chat_id, &invoice)
        .await?;
    tracing::info!(user_id = conversation.user_id, months, "invoice sent");
    Ok(())
}

/// Approves or rejects a checkout. Always answers the query.
pub async fn on_pre_checkout(bot: &BotService, query: &PreCheckoutQuery) -> Result<(), BotError> {
    match validate_pre_checkout(
        query,
        bot.config.subscription_cost,
        &bot.config.payment_currency,
    ) {
        Ok(payload) => {
            bot.messenger
                .answer_pre_checkout(&query.id, true, None)
                .await?;
            tracing::info!(user_id = payload.user_id, months = payload.months, "pre-checkout approved");
        }
        Err(err) => {
            tracing::warn!(user_id = query.from.id, error = %err, "pre-checkout rejected");
            bot.metrics.record_error("payment");
            bot.messenger
                .answer_pre_checkout(&query.id, false, Some(err.user_message().to_string()))
                .await?;
        }
    }
    Ok(())
}

/// Records the purchase. Failures after the money was taken are logged and
/// the user is referred to support.
pub async fn on_successful_payment(
    bot: &BotService,
    conversation: Conversation,
    from: &TgUser,
    payment: &SuccessfulPayment,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let payload = InvoicePayload::parse(&payment.invoice_payload)?;
    bot.ensure_user(from).await.map_err(|err| {
        tracing::error!(user_id = from.id, error = %err, "failed to record paying user");
        PaymentError::ActivationFailed(err.to_string())
    })?;
    let payment_id = if payment.telegram_payment_charge_id.is_empty() {
        payment.invoice_payload.as_str()
    } else {
        payment.telegram_payment_charge_id.as_str()
    };

    let subscription = bot
        .store
        .add_subscription(payload.user_id, payload.months, payment_id, now)
        .await
        .map_err(|err| {
            tracing::error!(
                user_id = payload.user_id,
                payment_id,
                error = %err,
                "failed to activate paid subscription"
            );
            PaymentError::ActivationFailed(err.to_string())
        })?;

    bot.metrics.record_subscription_purchase(payload.user_id);
    if let Err(err) = bot.metrics.flush() {
        tracing::warn!(error = %err, "failed to persist metrics after purchase");
    }
    tracing::info!(
        user_id = payload.user_id,
        months = payload.months,
        end_date = %subscription.end_date,
        "subscription activated"
    );
    bot.send(
        conversation.chat_id,
        &render::payment_confirmed(subscription.end_date, &bot.config.time_zone),
        None,
    )
    .await?;
    Ok(())
}
