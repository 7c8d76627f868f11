//! The storage port used by the bot core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use super::{food_analysis, retry::with_retry, subscription, user, RetryPolicy, StoreError};
use crate::{
    db::connection::DbPool,
    models::{
        food_analysis::{FoodAnalysis, NewFoodAnalysis},
        nutrition::{DailyNorms, NutritionResult, Profile},
        subscription::{ExpiredSubscription, UserSubscription},
        user::{User, UserIdentity},
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub users: i64,
    pub analyses: i64,
    pub active_subscriptions: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub food_analyses: u64,
    pub subscriptions: u64,
}

/// Persistent store for users, the food log and subscriptions.
///
/// Users are addressed by their messenger id throughout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NutritionStore: Send + Sync {
    async fn get_or_create_user(&self, identity: &UserIdentity) -> Result<User, StoreError>;

    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>, StoreError>;

    async fn save_profile(
        &self,
        telegram_id: i64,
        profile: &Profile,
        norms: &DailyNorms,
    ) -> Result<(), StoreError>;

    async fn save_norms(&self, telegram_id: i64, norms: &DailyNorms) -> Result<(), StoreError>;

    async fn save_food_analysis(&self, entry: &NewFoodAnalysis)
        -> Result<FoodAnalysis, StoreError>;

    /// Total log rows ever saved by the user.
    async fn count_food_analyses(&self, telegram_id: i64) -> Result<i64, StoreError>;

    async fn food_analyses_between(
        &self,
        telegram_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FoodAnalysis>, StoreError>;

    /// Overwrites the user's most recent log row; `None` when there is none.
    async fn overwrite_latest_analysis(
        &self,
        telegram_id: i64,
        food_name: &str,
        result: &NutritionResult,
    ) -> Result<Option<FoodAnalysis>, StoreError>;

    /// Deactivates flagged-active subscriptions with `end_date <= now`
    /// (for one user, or everyone when `telegram_id` is `None`) and commits
    /// before returning what was deactivated.
    async fn deactivate_expired_subscriptions(
        &self,
        telegram_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSubscription>, StoreError>;

    async fn active_subscription(
        &self,
        telegram_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSubscription>, StoreError>;

    async fn add_subscription(
        &self,
        telegram_id: i64,
        months: u32,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserSubscription, StoreError>;

    async fn health(&self, now: DateTime<Utc>) -> Result<StoreHealth, StoreError>;

    async fn count_food_analyses_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Deletes log rows and inactive subscriptions older than `cutoff`.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError>;
}

/// Postgres-backed store; every call goes through the transient retry policy.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    retry: RetryPolicy,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NutritionStore for PgStore {
    async fn get_or_create_user(&self, identity: &UserIdentity) -> Result<User, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "upsert_user", || user::upsert_user(pool, identity)).await
    }

    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "find_user", || {
            user::find_by_telegram_id(pool, telegram_id)
        })
        .await
    }

    async fn save_profile(
        &self,
        telegram_id: i64,
        profile: &Profile,
        norms: &DailyNorms,
    ) -> Result<(), StoreError> {
        let pool = self.pool();
        let updated = with_retry(self.retry, "save_profile", || {
            user::save_profile(pool, telegram_id, profile, norms)
        })
        .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("user {}", telegram_id)));
        }
        Ok(())
    }

    async fn save_norms(&self, telegram_id: i64, norms: &DailyNorms) -> Result<(), StoreError> {
        let pool = self.pool();
        let updated = with_retry(self.retry, "save_norms", || {
            user::save_norms(pool, telegram_id, norms)
        })
        .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("user {}", telegram_id)));
        }
        Ok(())
    }

    async fn save_food_analysis(
        &self,
        entry: &NewFoodAnalysis,
    ) -> Result<FoodAnalysis, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "save_food_analysis", || {
            food_analysis::insert_food_analysis(pool, entry)
        })
        .await
    }

    async fn count_food_analyses(&self, telegram_id: i64) -> Result<i64, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "count_food_analyses", || {
            food_analysis::count_for_user(pool, telegram_id)
        })
        .await
    }

    async fn food_analyses_between(
        &self,
        telegram_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FoodAnalysis>, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "food_analyses_between", || {
            food_analysis::list_between(pool, telegram_id, from, to)
        })
        .await
    }

    async fn overwrite_latest_analysis(
        &self,
        telegram_id: i64,
        food_name: &str,
        result: &NutritionResult,
    ) -> Result<Option<FoodAnalysis>, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "overwrite_latest_analysis", || {
            food_analysis::overwrite_latest(pool, telegram_id, food_name, result)
        })
        .await
    }

    async fn deactivate_expired_subscriptions(
        &self,
        telegram_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSubscription>, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "deactivate_expired_subscriptions", || {
            subscription::deactivate_expired(pool, telegram_id, now)
        })
        .await
    }

    async fn active_subscription(
        &self,
        telegram_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSubscription>, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "active_subscription", || {
            subscription::find_active(pool, telegram_id, now)
        })
        .await
    }

    async fn add_subscription(
        &self,
        telegram_id: i64,
        months: u32,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserSubscription, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "add_subscription", || {
            subscription::add_subscription(pool, telegram_id, months, payment_id, now)
        })
        .await
    }

    async fn health(&self, now: DateTime<Utc>) -> Result<StoreHealth, StoreError> {
        let pool = self.pool();
        let users = with_retry(self.retry, "count_users", || user::count_users(pool)).await?;
        let analyses =
            with_retry(self.retry, "count_analyses", || food_analysis::count_all(pool)).await?;
        let active_subscriptions = with_retry(self.retry, "count_active_subscriptions", || {
            subscription::count_active(pool, now)
        })
        .await?;
        Ok(StoreHealth {
            users,
            analyses,
            active_subscriptions,
        })
    }

    async fn count_food_analyses_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let pool = self.pool();
        with_retry(self.retry, "count_food_analyses_since", || {
            food_analysis::count_since(pool, since)
        })
        .await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        let pool = self.pool();
        let food_analyses = with_retry(self.retry, "purge_food_analyses", || {
            food_analysis::delete_older_than(pool, cutoff)
        })
        .await?;
        let subscriptions = with_retry(self.retry, "purge_subscriptions", || {
            subscription::delete_inactive_older_than(pool, cutoff)
        })
        .await?;
        Ok(PurgeReport {
            food_analyses,
            subscriptions,
        })
    }
}
