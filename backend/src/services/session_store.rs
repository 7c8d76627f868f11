//! Concurrency-safe per-user scratch memory.
//!
//! Records live in a sharded [`DashMap`]; every operation holds a shard lock
//! only for the duration of a lookup or an in-place mutation. Closures passed
//! to [`SessionStore::update`] must not call back into the store.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::{
    dialog::{DialogState, ProfileDraft},
    portion::rescale,
};
use crate::models::nutrition::FoodSnapshot;

/// The last analysis shown to a user, tied to the message that displays it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub food: FoodSnapshot,
    /// Unrounded result as recognized; portion changes are computed from it.
    pub base: FoodSnapshot,
    /// Result message carrying the action buttons.
    pub message_id: Option<i64>,
    pub cached_at: DateTime<Utc>,
}

impl CachedAnalysis {
    pub fn new(food: FoodSnapshot, message_id: Option<i64>, cached_at: DateTime<Utc>) -> Self {
        Self {
            base: food.clone(),
            food,
            message_id,
            cached_at,
        }
    }

    /// The same dish at `grams`, scaled from the recognized base.
    pub fn with_portion(&self, grams: u32) -> FoodSnapshot {
        rescale(&self.base, grams)
    }

    /// Replaces the displayed portion while keeping the recognized base.
    pub fn reshown(
        &self,
        food: FoodSnapshot,
        message_id: Option<i64>,
        cached_at: DateTime<Utc>,
    ) -> Self {
        Self {
            food,
            base: self.base.clone(),
            message_id,
            cached_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub last_activity: DateTime<Utc>,
    pub dialog_state: DialogState,
    pub profile_draft: ProfileDraft,
    pub last_food_analysis: Option<CachedAnalysis>,
    /// Message edited in place by multi-step replies.
    pub pending_message_id: Option<i64>,
    /// Result message ids already added to statistics.
    pub committed_analysis_keys: HashSet<String>,
}

impl SessionRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_activity: now,
            dialog_state: DialogState::Idle,
            profile_draft: ProfileDraft::default(),
            last_food_analysis: None,
            pending_message_id: None,
            committed_analysis_keys: HashSet::new(),
        }
    }

    /// Returns the dialog to idle and forgets the pending prompt message.
    pub fn reset_dialog(&mut self) {
        self.dialog_state = DialogState::Idle;
        self.pending_message_id = None;
    }

    fn clear_transient(&mut self) {
        self.last_food_analysis = None;
        self.committed_analysis_keys.clear();
    }

    /// Drops scratch data that no longer serves a purpose. Returns whether
    /// anything was removed.
    fn strip_stale(&mut self, now: DateTime<Utc>, food_max_age: Duration) -> bool {
        let mut stripped = false;
        if self
            .last_food_analysis
            .as_ref()
            .is_some_and(|cached| now - cached.cached_at > food_max_age)
        {
            self.clear_transient();
            stripped = true;
        }
        if self.pending_message_id.is_some() && !self.dialog_state.uses_pending_message() {
            self.pending_message_id = None;
            stripped = true;
        }
        stripped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active_last_hour: usize,
    pub active_last_day: usize,
    pub with_food_data: usize,
    pub in_dialog: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    records: Arc<DashMap<i64, SessionRecord>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the user's record, registering an empty one if absent.
    pub fn get(&self, user_id: i64, now: DateTime<Utc>) -> SessionRecord {
        self.records
            .entry(user_id)
            .or_insert_with(|| SessionRecord::new(now))
            .clone()
    }

    /// Returns a copy of the record without creating one.
    pub fn peek(&self, user_id: i64) -> Option<SessionRecord> {
        self.records.get(&user_id).map(|record| record.clone())
    }

    /// Mutates the user's record in place, creating it if absent.
    pub fn update<R>(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> R {
        let mut record = self
            .records
            .entry(user_id)
            .or_insert_with(|| SessionRecord::new(now));
        f(&mut *record)
    }

    pub fn touch(&self, user_id: i64, now: DateTime<Utc>) {
        self.update(user_id, now, |record| {
            if now > record.last_activity {
                record.last_activity = now;
            }
        });
    }

    /// Forgets the cached analysis and its committed keys, keeping dialog
    /// state and the profile draft.
    pub fn clear_transient(&self, user_id: i64) {
        if let Some(mut record) = self.records.get_mut(&user_id) {
            record.clear_transient();
        }
    }

    pub fn delete(&self, user_id: i64) -> bool {
        self.records.remove(&user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        let mut stats = SessionStats::default();
        for record in self.records.iter() {
            stats.total += 1;
            let idle = now - record.last_activity;
            if idle <= Duration::hours(1) {
                stats.active_last_hour += 1;
            }
            if idle <= Duration::hours(24) {
                stats.active_last_day += 1;
            }
            if record.last_food_analysis.is_some() {
                stats.with_food_data += 1;
            }
            if record.dialog_state != DialogState::Idle {
                stats.in_dialog += 1;
            }
        }
        stats
    }

    /// Removes records idle for longer than `max_age`.
    pub fn evict_idle(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now - record.last_activity <= max_age);
        before.saturating_sub(self.records.len())
    }

    /// Strips stale scratch data from every record; returns how many changed.
    pub fn strip_stale(&self, now: DateTime<Utc>, food_max_age: Duration) -> usize {
        let mut changed = 0;
        for mut record in self.records.iter_mut() {
            if record.strip_stale(now, food_max_age) {
                changed += 1;
            }
        }
        changed
    }

    /// Evicts the `percent` least recently active records (at least one when
    /// the store is not empty). Records touched after the ranking was taken
    /// are spared.
    pub fn evict_coldest(&self, percent: usize) -> usize {
        let mut ranking: Vec<(i64, DateTime<Utc>)> = self
            .records
            .iter()
            .map(|record| (*record.key(), record.last_activity))
            .collect();
        if ranking.is_empty() {
            return 0;
        }
        ranking.sort_by_key(|(_, last_activity)| *last_activity);
        let count = (ranking.len() * percent / 100).max(1);

        ranking
            .into_iter()
            .take(count)
            .filter(|(user_id, seen)| {
                self.records
                    .remove_if(user_id, |_, record| record.last_activity <= *seen)
                    .is_some()
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apple() -> FoodSnapshot {
        FoodSnapshot {
            name: "Apple".into(),
            calories: 95.0,
            proteins: 0.5,
            fats: 0.3,
            carbs: 25.0,
            portion_weight_grams: 100.0,
            source_image_path: None,
            is_estimated: false,
        }
    }

    #[test]
    fn get_registers_empty_record() {
        let store = SessionStore::new();
        let now = Utc::now();
        assert!(store.peek(1).is_none());
        let record = store.get(1, now);
        assert_eq!(record.dialog_state, DialogState::Idle);
        assert_eq!(record.last_activity, now);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_transient_keeps_dialog_and_draft() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.update(1, now, |record| {
            record.dialog_state = DialogState::AwaitingAge;
            record.profile_draft.age = Some(33);
            record.last_food_analysis = Some(CachedAnalysis::new(apple(), Some(10), now));
            record.committed_analysis_keys.insert("10".into());
        });

        store.clear_transient(1);
        let record = store.peek(1).unwrap();
        assert!(record.last_food_analysis.is_none());
        assert!(record.committed_analysis_keys.is_empty());
        assert_eq!(record.dialog_state, DialogState::AwaitingAge);
        assert_eq!(record.profile_draft.age, Some(33));
    }

    #[test]
    fn portion_changes_are_computed_from_the_recognized_base() {
        let now = Utc::now();
        let original = CachedAnalysis::new(apple(), Some(10), now);

        let small = original.with_portion(3);
        assert_eq!(small.portion_weight_grams, 3.0);
        let shown_small = original.reshown(small, Some(11), now);

        let back = shown_small.with_portion(100);
        for (actual, expected) in [
            (back.calories, 95.0),
            (back.proteins, 0.5),
            (back.fats, 0.3),
            (back.carbs, 25.0),
        ] {
            assert!((actual - expected).abs() <= 0.1, "{actual} vs {expected}");
        }
        assert_eq!(shown_small.base, apple());
    }

    #[test]
    fn touch_never_moves_activity_backwards() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.touch(1, now);
        store.touch(1, now - Duration::minutes(5));
        assert_eq!(store.peek(1).unwrap().last_activity, now);
    }

    #[test]
    fn evict_idle_respects_threshold() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.touch(1, now - Duration::hours(3));
        store.touch(2, now - Duration::minutes(10));
        assert_eq!(store.evict_idle(now, Duration::hours(2)), 1);
        assert!(store.peek(1).is_none());
        assert!(store.peek(2).is_some());
    }

    #[test]
    fn strip_stale_drops_old_food_with_its_keys_only() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.update(1, now, |record| {
            record.dialog_state = DialogState::AwaitingPortionSize;
            record.pending_message_id = Some(5);
            record.last_food_analysis = Some(CachedAnalysis::new(
                apple(),
                Some(5),
                now - Duration::minutes(90),
            ));
            record.committed_analysis_keys.insert("5".into());
        });
        store.update(2, now, |record| {
            record.pending_message_id = Some(8);
            record.last_food_analysis = Some(CachedAnalysis::new(
                apple(),
                Some(8),
                now - Duration::minutes(10),
            ));
            record.committed_analysis_keys.insert("8".into());
        });

        assert_eq!(store.strip_stale(now, Duration::hours(1)), 2);

        let first = store.peek(1).unwrap();
        assert!(first.last_food_analysis.is_none());
        assert!(first.committed_analysis_keys.is_empty());
        assert_eq!(first.pending_message_id, Some(5));
        assert_eq!(first.dialog_state, DialogState::AwaitingPortionSize);

        let second = store.peek(2).unwrap();
        assert!(second.last_food_analysis.is_some());
        assert!(second.committed_analysis_keys.contains("8"));
        assert_eq!(second.pending_message_id, None);
    }

    #[test]
    fn evict_coldest_removes_least_recent_fifth() {
        let store = SessionStore::new();
        let now = Utc::now();
        for user_id in 0..10 {
            store.touch(user_id, now - Duration::minutes(100 - user_id));
        }
        assert_eq!(store.evict_coldest(20), 2);
        assert!(store.peek(0).is_none());
        assert!(store.peek(1).is_none());
        assert!(store.peek(2).is_some());
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = SessionStore::new();
        let now = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.update(1, now, |record| {
                            record
                                .committed_analysis_keys
                                .insert(format!("{}-{}", worker, i));
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.peek(1).unwrap().committed_analysis_keys.len(), 800);
    }
}
