//! Free-quota and subscription status checks.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    models::subscription::UserSubscription,
    repositories::{NutritionStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Limited(u32),
}

impl Remaining {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Remaining::Limited(0))
    }
}

#[derive(Clone)]
pub struct QuotaService {
    store: Arc<dyn NutritionStore>,
    free_limit: u32,
}

impl QuotaService {
    pub fn new(store: Arc<dyn NutritionStore>, free_limit: u32) -> Self {
        Self { store, free_limit }
    }

    pub fn free_limit(&self) -> u32 {
        self.free_limit
    }

    /// Current subscription of the user. Expired rows still flagged active
    /// are deactivated and committed first, through the same routine the
    /// reconciler uses.
    pub async fn current_subscription(
        &self,
        telegram_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSubscription>, StoreError> {
        let healed = self
            .store
            .deactivate_expired_subscriptions(Some(telegram_id), now)
            .await?;
        if !healed.is_empty() {
            tracing::info!(
                user_id = telegram_id,
                count = healed.len(),
                "deactivated expired subscription during quota check"
            );
        }
        self.store.active_subscription(telegram_id, now).await
    }

    pub async fn is_subscription_active(
        &self,
        telegram_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.current_subscription(telegram_id, now).await?.is_some())
    }

    pub async fn remaining_free_requests(
        &self,
        telegram_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Remaining, StoreError> {
        if self.is_subscription_active(telegram_id, now).await? {
            return Ok(Remaining::Unlimited);
        }
        let used = self.store.count_food_analyses(telegram_id).await?.max(0);
        let used = u32::try_from(used).unwrap_or(u32::MAX);
        Ok(Remaining::Limited(self.free_limit.saturating_sub(used)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::subscription::ExpiredSubscription, repositories::MockNutritionStore};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn remaining_is_limit_minus_saved_analyses() {
        let mut store = MockNutritionStore::new();
        store
            .expect_deactivate_expired_subscriptions()
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_active_subscription()
            .returning(|_, _| Ok(None));
        store
            .expect_count_food_analyses()
            .with(eq(7))
            .returning(|_| Ok(3));

        let quota = QuotaService::new(Arc::new(store), 5);
        assert_eq!(
            quota.remaining_free_requests(7, Utc::now()).await.unwrap(),
            Remaining::Limited(2)
        );
    }

    #[tokio::test]
    async fn remaining_never_goes_negative() {
        let mut store = MockNutritionStore::new();
        store
            .expect_deactivate_expired_subscriptions()
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_active_subscription()
            .returning(|_, _| Ok(None));
        store.expect_count_food_analyses().returning(|_| Ok(12));

        let quota = QuotaService::new(Arc::new(store), 5);
        let remaining = quota.remaining_free_requests(7, Utc::now()).await.unwrap();
        assert_eq!(remaining, Remaining::Limited(0));
        assert!(remaining.is_exhausted());
    }

    #[tokio::test]
    async fn status_check_heals_before_reading() {
        let now = Utc::now();
        let mut seq = mockall::Sequence::new();
        let mut store = MockNutritionStore::new();
        store
            .expect_deactivate_expired_subscriptions()
            .with(eq(Some(7)), eq(now))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| {
                Ok(vec![ExpiredSubscription {
                    subscription_id: 1,
                    telegram_id: 7,
                    end_date: now,
                }])
            });
        store
            .expect_active_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));

        let quota = QuotaService::new(Arc::new(store), 5);
        assert!(!quota.is_subscription_active(7, now).await.unwrap());
    }
}
