//! Process-local store used when no database is configured, and by tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{
    store::{NutritionStore, PurgeReport, StoreHealth},
    subscription::DAYS_PER_MONTH,
    StoreError,
};
use crate::models::{
    food_analysis::{FoodAnalysis, NewFoodAnalysis},
    nutrition::{DailyNorms, NutritionResult, Profile},
    subscription::{ExpiredSubscription, UserSubscription},
    user::{User, UserIdentity},
};

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    analyses: Vec<FoodAnalysis>,
    subscriptions: Vec<UserSubscription>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_id(&self, telegram_id: i64) -> Option<i64> {
        self.users
            .iter()
            .find(|user| user.telegram_id == telegram_id)
            .map(|user| user.id)
    }

    fn require_user_mut(&mut self, telegram_id: i64) -> Result<&mut User, StoreError> {
        self.users
            .iter_mut()
            .find(|user| user.telegram_id == telegram_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", telegram_id)))
    }

    fn telegram_id_of(&self, user_id: i64) -> Option<i64> {
        self.users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.telegram_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a subscription row verbatim, bypassing the folding logic of
    /// [`NutritionStore::add_subscription`].
    pub fn insert_subscription(
        &self,
        telegram_id: i64,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        is_active: bool,
    ) -> Result<UserSubscription, StoreError> {
        let mut state = self.state();
        let user_id = state
            .user_id(telegram_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", telegram_id)))?;
        let id = state.next_id();
        let row = UserSubscription {
            id,
            user_id,
            start_date,
            end_date,
            is_active,
            payment_id: None,
        };
        state.subscriptions.push(row.clone());
        Ok(row)
    }

    /// All subscription rows of a user, oldest first.
    pub fn subscriptions_of(&self, telegram_id: i64) -> Vec<UserSubscription> {
        let state = self.state();
        let Some(user_id) = state.user_id(telegram_id) else {
            return Vec::new();
        };
        state
            .subscriptions
            .iter()
            .filter(|sub| sub.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All log rows of a user, oldest first.
    pub fn analyses_of(&self, telegram_id: i64) -> Vec<FoodAnalysis> {
        let state = self.state();
        let Some(user_id) = state.user_id(telegram_id) else {
            return Vec::new();
        };
        state
            .analyses
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NutritionStore for InMemoryStore {
    async fn get_or_create_user(&self, identity: &UserIdentity) -> Result<User, StoreError> {
        let mut state = self.state();
        if let Some(user) = state
            .users
            .iter_mut()
            .find(|user| user.telegram_id == identity.telegram_id)
        {
            if identity.username.is_some() {
                user.username = identity.username.clone();
            }
            if identity.first_name.is_some() {
                user.first_name = identity.first_name.clone();
            }
            if identity.last_name.is_some() {
                user.last_name = identity.last_name.clone();
            }
            return Ok(user.clone());
        }
        let id = state.next_id();
        let user = User::new(identity, id, Utc::now());
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|user| user.telegram_id == telegram_id)
            .cloned())
    }

    async fn save_profile(
        &self,
        telegram_id: i64,
        profile: &Profile,
        norms: &DailyNorms,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.require_user_mut(telegram_id)?.apply_profile(profile, norms);
        Ok(())
    }

    async fn save_norms(&self, telegram_id: i64, norms: &DailyNorms) -> Result<(), StoreError> {
        let mut state = self.state();
        state.require_user_mut(telegram_id)?.apply_norms(norms);
        Ok(())
    }

    async fn save_food_analysis(
        &self,
        entry: &NewFoodAnalysis,
    ) -> Result<FoodAnalysis, StoreError> {
        let mut state = self.state();
        let user_id = state
            .user_id(entry.telegram_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", entry.telegram_id)))?;
        let id = state.next_id();
        let row = FoodAnalysis {
            id,
            user_id,
            analysis_date: entry.analysis_date,
            food_name: entry.food_name.clone(),
            calories: entry.calories,
            proteins: entry.proteins,
            fats: entry.fats,
            carbs: entry.carbs,
            image_path: entry.image_path.clone(),
            portion_weight: entry.portion_weight,
            meal_type: entry.meal_type.as_str().to_string(),
        };
        state.analyses.push(row.clone());
        Ok(row)
    }

    async fn count_food_analyses(&self, telegram_id: i64) -> Result<i64, StoreError> {
        let state = self.state();
        let Some(user_id) = state.user_id(telegram_id) else {
            return Ok(0);
        };
        Ok(state
            .analyses
            .iter()
            .filter(|row| row.user_id == user_id)
            .count() as i64)
    }

    async fn food_analyses_between(
        &self,
        telegram_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FoodAnalysis>, StoreError> {
        let state = self.state();
        let Some(user_id) = state.user_id(telegram_id) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<FoodAnalysis> = state
            .analyses
            .iter()
            .filter(|row| row.user_id == user_id && row.analysis_date >= from && row.analysis_date < to)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.analysis_date, row.id));
        Ok(rows)
    }

    async fn overwrite_latest_analysis(
        &self,
        telegram_id: i64,
        food_name: &str,
        result: &NutritionResult,
    ) -> Result<Option<FoodAnalysis>, StoreError> {
        let mut state = self.state();
        let Some(user_id) = state.user_id(telegram_id) else {
            return Ok(None);
        };
        let latest = state
            .analyses
            .iter_mut()
            .filter(|row| row.user_id == user_id)
            .max_by_key(|row| (row.analysis_date, row.id));
        Ok(latest.map(|row| {
            row.food_name = food_name.to_string();
            row.calories = result.calories;
            row.proteins = result.proteins;
            row.fats = result.fats;
            row.carbs = result.carbs;
            row.portion_weight = Some(result.portion_weight_grams);
            row.clone()
        }))
    }

    async fn deactivate_expired_subscriptions(
        &self,
        telegram_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSubscription>, StoreError> {
        let mut state = self.state();
        let owner_filter = match telegram_id {
            Some(id) => match state.user_id(id) {
                Some(user_id) => Some(user_id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut expired = Vec::new();
        for index in 0..state.subscriptions.len() {
            let sub = &state.subscriptions[index];
            if !sub.is_active || sub.end_date > now {
                continue;
            }
            if owner_filter.is_some_and(|user_id| sub.user_id != user_id) {
                continue;
            }
            let Some(owner) = state.telegram_id_of(sub.user_id) else {
                continue;
            };
            expired.push(ExpiredSubscription {
                subscription_id: sub.id,
                telegram_id: owner,
                end_date: sub.end_date,
            });
            state.subscriptions[index].is_active = false;
        }
        Ok(expired)
    }

    async fn active_subscription(
        &self,
        telegram_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSubscription>, StoreError> {
        let state = self.state();
        let Some(user_id) = state.user_id(telegram_id) else {
            return Ok(None);
        };
        Ok(state
            .subscriptions
            .iter()
            .filter(|sub| sub.user_id == user_id && sub.is_current(now))
            .max_by_key(|sub| sub.end_date)
            .cloned())
    }

    async fn add_subscription(
        &self,
        telegram_id: i64,
        months: u32,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserSubscription, StoreError> {
        let mut state = self.state();
        let user_id = state
            .user_id(telegram_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", telegram_id)))?;

        let mut start_date = now;
        for sub in state
            .subscriptions
            .iter_mut()
            .filter(|sub| sub.user_id == user_id && sub.is_active)
        {
            start_date = start_date.max(sub.end_date);
            sub.is_active = false;
        }

        let id = state.next_id();
        let row = UserSubscription {
            id,
            user_id,
            start_date,
            end_date: start_date + Duration::days(DAYS_PER_MONTH * i64::from(months)),
            is_active: true,
            payment_id: Some(payment_id.to_string()),
        };
        state.subscriptions.push(row.clone());
        Ok(row)
    }

    async fn health(&self, now: DateTime<Utc>) -> Result<StoreHealth, StoreError> {
        let state = self.state();
        Ok(StoreHealth {
            users: state.users.len() as i64,
            analyses: state.analyses.len() as i64,
            active_subscriptions: state
                .subscriptions
                .iter()
                .filter(|sub| sub.is_current(now))
                .count() as i64,
        })
    }

    async fn count_food_analyses_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self
            .state()
            .analyses
            .iter()
            .filter(|row| row.analysis_date >= since)
            .count() as i64)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        let mut state = self.state();
        let analyses_before = state.analyses.len();
        state.analyses.retain(|row| row.analysis_date >= cutoff);
        let subscriptions_before = state.subscriptions.len();
        state
            .subscriptions
            .retain(|sub| sub.is_active || sub.end_date >= cutoff);
        Ok(PurgeReport {
            food_analyses: (analyses_before - state.analyses.len()) as u64,
            subscriptions: (subscriptions_before - state.subscriptions.len()) as u64,
        })
    }
}
