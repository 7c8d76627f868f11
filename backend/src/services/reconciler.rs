//! Periodic subscription reconciliation and renewal reminders.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::notification_cache::NotificationDedupeCache;
use crate::{
    repositories::{NutritionStore, StoreError},
    telegram::{InlineKeyboard, Messenger},
};

pub const RENEWAL_REMINDER: &str = "Your subscription has expired. Renew it to keep analysing meals without limits.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub deactivated: usize,
    pub notified: usize,
    pub suppressed: usize,
    pub retried: usize,
    pub failed_notifications: usize,
    pub purged_dedupe_entries: usize,
}

pub struct SubscriptionReconciler {
    store: Arc<dyn NutritionStore>,
    messenger: Arc<dyn Messenger>,
    dedupe: Arc<NotificationDedupeCache>,
}

impl SubscriptionReconciler {
    pub fn new(
        store: Arc<dyn NutritionStore>,
        messenger: Arc<dyn Messenger>,
        dedupe: Arc<NotificationDedupeCache>,
    ) -> Self {
        Self {
            store,
            messenger,
            dedupe,
        }
    }

    /// One reconciliation pass. The deactivation is committed before any
    /// reminder is sent; a store failure abandons the pass. Reminders that
    /// failed in earlier passes are retried unless the user renewed since.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<ReconcileReport, StoreError> {
        let expired = self.store.deactivate_expired_subscriptions(None, now).await?;
        let mut report = ReconcileReport {
            deactivated: expired.len(),
            ..ReconcileReport::default()
        };

        let mut owners: BTreeSet<i64> = expired.iter().map(|row| row.telegram_id).collect();
        for user_id in self.dedupe.undelivered() {
            if owners.contains(&user_id) {
                continue;
            }
            match self.store.active_subscription(user_id, now).await {
                Ok(Some(_)) => self.dedupe.forget(user_id),
                Ok(None) => {
                    report.retried += 1;
                    owners.insert(user_id);
                }
                Err(err) => {
                    tracing::warn!(user_id, error = %err, "could not check subscription before retrying reminder");
                }
            }
        }

        for user_id in owners {
            if !self.dedupe.try_reserve(user_id, now) {
                report.suppressed += 1;
                continue;
            }
            let keyboard = InlineKeyboard::new().button("Renew subscription", "subscribe");
            match self
                .messenger
                .send_message(user_id, RENEWAL_REMINDER, Some(keyboard))
                .await
            {
                Ok(_) => {
                    self.dedupe.confirm(user_id);
                    report.notified += 1;
                }
                Err(err) => {
                    self.dedupe.release(user_id, now);
                    report.failed_notifications += 1;
                    tracing::warn!(user_id, error = %err, "failed to send renewal reminder");
                }
            }
        }

        report.purged_dedupe_entries = self.dedupe.purge(now);
        Ok(report)
    }

    /// Entry point for the periodic loop: logs the outcome, never fails.
    pub async fn tick(&self) {
        match self.run_cycle(Utc::now()).await {
            Ok(report)
                if report.deactivated > 0
                    || report.retried > 0
                    || report.purged_dedupe_entries > 0 =>
            {
                tracing::info!(
                    deactivated = report.deactivated,
                    notified = report.notified,
                    suppressed = report.suppressed,
                    retried = report.retried,
                    failed = report.failed_notifications,
                    purged = report.purged_dedupe_entries,
                    "subscription reconciliation finished"
                );
            }
            Ok(_) => tracing::debug!("subscription reconciliation found nothing to do"),
            Err(err) => {
                tracing::error!(error = %err, "subscription reconciliation cycle failed")
            }
        }
    }
}
