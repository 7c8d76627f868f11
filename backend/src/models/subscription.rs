//! Paid subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// A paid period. Rows are deactivated on expiry, never deleted by the bot.
pub struct UserSubscription {
    pub id: i64,
    /// Owning `users.id`.
    pub user_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    /// Provider charge id of the payment that created the row.
    pub payment_id: Option<String>,
}

impl UserSubscription {
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_date > now
    }
}

/// A subscription that a reconciliation pass has just deactivated.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ExpiredSubscription {
    pub subscription_id: i64,
    pub telegram_id: i64,
    pub end_date: DateTime<Utc>,
}
