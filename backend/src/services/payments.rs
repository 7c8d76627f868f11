//! Subscription plans, invoice payloads and pre-checkout validation.

use chrono::{DateTime, Utc};

use crate::telegram::{types::PreCheckoutQuery, Invoice, LabeledPrice};

const PAYLOAD_PREFIX: &str = "subscription";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentError {
    #[error("malformed invoice payload: {0}")]
    MalformedPayload(String),
    #[error("unknown plan: {0} months")]
    UnknownPlan(u32),
    #[error("payer {payer} does not match invoice owner {owner}")]
    PayerMismatch { payer: i64, owner: i64 },
    #[error("amount {actual} does not match expected {expected}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("currency {actual} does not match expected {expected}")]
    CurrencyMismatch { expected: String, actual: String },
    #[error("subscription activation failed: {0}")]
    ActivationFailed(String),
}

impl PaymentError {
    /// Reason shown to the payer when the checkout is rejected.
    pub fn user_message(&self) -> &'static str {
        match self {
            PaymentError::MalformedPayload(_) | PaymentError::PayerMismatch { .. } => {
                "This invoice is not valid. Please request a new one with /subscription."
            }
            PaymentError::UnknownPlan(_) => "This plan is no longer available.",
            PaymentError::AmountMismatch { .. } | PaymentError::CurrencyMismatch { .. } => {
                "The price has changed. Please request a new invoice with /subscription."
            }
            PaymentError::ActivationFailed(_) => {
                "We could not activate your subscription. Please contact support."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    pub months: u32,
    /// Fraction taken off the undiscounted price.
    pub discount: f64,
}

pub const PLANS: [Plan; 4] = [
    Plan { months: 1, discount: 0.0 },
    Plan { months: 3, discount: 0.10 },
    Plan { months: 6, discount: 0.15 },
    Plan { months: 12, discount: 0.20 },
];

pub fn find_plan(months: u32) -> Result<Plan, PaymentError> {
    PLANS
        .iter()
        .copied()
        .find(|plan| plan.months == months)
        .ok_or(PaymentError::UnknownPlan(months))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Plan {
    pub fn price(&self, monthly_cost: f64) -> f64 {
        round2(monthly_cost * self.months as f64 * (1.0 - self.discount))
    }

    /// Price in minor currency units, as the provider expects it.
    pub fn amount_minor_units(&self, monthly_cost: f64) -> i64 {
        (self.price(monthly_cost) * 100.0).round() as i64
    }

    pub fn label(&self) -> String {
        match self.months {
            1 => "1 month".to_string(),
            months => format!("{months} months"),
        }
    }

    pub fn button_text(&self, monthly_cost: f64) -> String {
        let price = self.price(monthly_cost);
        if self.discount > 0.0 {
            format!(
                "{} for {:.2} (-{:.0}%)",
                self.label(),
                price,
                self.discount * 100.0
            )
        } else {
            format!("{} for {:.2}", self.label(), price)
        }
    }
}

/// Decoded `subscription_{user}_{months}_{unix_ts}` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoicePayload {
    pub user_id: i64,
    pub months: u32,
    pub issued_at: i64,
}

impl InvoicePayload {
    pub fn new(user_id: i64, months: u32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            months,
            issued_at: now.timestamp(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{PAYLOAD_PREFIX}_{}_{}_{}",
            self.user_id, self.months, self.issued_at
        )
    }

    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        let malformed = || PaymentError::MalformedPayload(raw.to_string());
        let mut parts = raw.split('_');
        if parts.next() != Some(PAYLOAD_PREFIX) {
            return Err(malformed());
        }
        let user_id = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(malformed)?;
        let months = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(malformed)?;
        let issued_at = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self {
            user_id,
            months,
            issued_at,
        })
    }
}

/// Builds the invoice for `plan`, payable by `user_id`.
pub fn build_invoice(
    user_id: i64,
    plan: Plan,
    monthly_cost: f64,
    currency: &str,
    provider_token: &str,
    now: DateTime<Utc>,
) -> Invoice {
    let amount = plan.amount_minor_units(monthly_cost);
    Invoice {
        title: format!("SnapEat subscription, {}", plan.label()),
        description: format!(
            "Unlimited meal analyses for {}.",
            plan.label()
        ),
        payload: InvoicePayload::new(user_id, plan.months, now).encode(),
        provider_token: provider_token.to_string(),
        currency: currency.to_string(),
        prices: vec![LabeledPrice {
            label: plan.label(),
            amount,
        }],
    }
}

/// Checks a pre-checkout query against the plan encoded in its payload.
pub fn validate_pre_checkout(
    query: &PreCheckoutQuery,
    monthly_cost: f64,
    currency: &str,
) -> Result<InvoicePayload, PaymentError> {
    let payload = InvoicePayload::parse(&query.invoice_payload)?;
    let plan = find_plan(payload.months)?;
    if payload.user_id != query.from.id {
        return Err(PaymentError::PayerMismatch {
            payer: query.from.id,
            owner: payload.user_id,
        });
    }
    if !query.currency.eq_ignore_ascii_case(currency) {
        return Err(PaymentError::CurrencyMismatch {
            expected: currency.to_string(),
            actual: query.currency.clone(),
        });
    }
    let expected = plan.amount_minor_units(monthly_cost);
    if query.total_amount != expected {
        return Err(PaymentError::AmountMismatch {
            expected,
            actual: query.total_amount,
        });
    }
    Ok(payload)
}
