//! Renewal-reminder dedupe: at most one notification per user per window,
//! plus the users whose reminder could not be delivered yet.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 23 * 60 * 60;
pub const DEFAULT_RETENTION_SECS: i64 = 48 * 60 * 60;

#[derive(Debug, Default)]
struct Entries {
    sent_at: HashMap<i64, DateTime<Utc>>,
    /// First failed delivery per user still owed a reminder.
    undelivered: HashMap<i64, DateTime<Utc>>,
}

#[derive(Debug)]
pub struct NotificationDedupeCache {
    entries: Mutex<Entries>,
    min_interval: Duration,
    retention: Duration,
}

impl Default for NotificationDedupeCache {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_MIN_INTERVAL_SECS),
            Duration::seconds(DEFAULT_RETENTION_SECS),
        )
    }
}

impl NotificationDedupeCache {
    pub fn new(min_interval: Duration, retention: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            min_interval,
            retention,
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves the notification slot for `user_id` if the last one is older
    /// than the minimum interval. Check and insert happen under one lock.
    pub fn try_reserve(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        match entries.sent_at.get(&user_id) {
            Some(last) if now - *last < self.min_interval => false,
            _ => {
                entries.sent_at.insert(user_id, now);
                true
            }
        }
    }

    /// Marks the user's reminder as delivered.
    pub fn confirm(&self, user_id: i64) {
        self.entries().undelivered.remove(&user_id);
    }

    /// Gives back a reservation taken at `reserved_at` after a failed send
    /// and queues the user for another attempt.
    pub fn release(&self, user_id: i64, reserved_at: DateTime<Utc>) {
        let mut entries = self.entries();
        if entries.sent_at.get(&user_id) == Some(&reserved_at) {
            entries.sent_at.remove(&user_id);
            entries.undelivered.entry(user_id).or_insert(reserved_at);
        }
    }

    /// Users still owed a reminder. They stay queued until [`confirm`] or
    /// [`forget`] is called, or the retention horizon passes.
    ///
    /// [`confirm`]: Self::confirm
    /// [`forget`]: Self::forget
    pub fn undelivered(&self) -> BTreeSet<i64> {
        self.entries().undelivered.keys().copied().collect()
    }

    /// Drops a queued reminder that is no longer wanted.
    pub fn forget(&self, user_id: i64) {
        self.entries().undelivered.remove(&user_id);
    }

    /// Drops entries older than the retention horizon; returns how many.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.sent_at.len() + entries.undelivered.len();
        let retention = self.retention;
        entries.sent_at.retain(|_, sent| now - *sent <= retention);
        entries
            .undelivered
            .retain(|_, failed| now - *failed <= retention);
        before - (entries.sent_at.len() + entries.undelivered.len())
    }

    pub fn len(&self) -> usize {
        self.entries().sent_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().sent_at.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_reservation_inside_window_is_refused() {
        let cache = NotificationDedupeCache::default();
        let now = Utc::now();
        assert!(cache.try_reserve(1, now));
        assert!(!cache.try_reserve(1, now + Duration::hours(1)));
        assert!(!cache.try_reserve(1, now + Duration::hours(22)));
        assert!(cache.try_reserve(1, now + Duration::hours(23)));
        assert!(cache.try_reserve(2, now));
    }

    #[test]
    fn release_reopens_the_slot() {
        let cache = NotificationDedupeCache::default();
        let now = Utc::now();
        assert!(cache.try_reserve(1, now));
        cache.release(1, now);
        assert!(cache.try_reserve(1, now + Duration::minutes(1)));
    }

    #[test]
    fn release_ignores_newer_reservations() {
        let cache = NotificationDedupeCache::default();
        let now = Utc::now();
        assert!(cache.try_reserve(1, now));
        cache.release(1, now - Duration::days(3));
        assert!(!cache.try_reserve(1, now + Duration::minutes(1)));
    }

    #[test]
    fn failed_delivery_stays_queued_until_confirmed() {
        let cache = NotificationDedupeCache::default();
        let now = Utc::now();
        assert!(cache.try_reserve(1, now));
        cache.release(1, now);
        assert_eq!(cache.undelivered(), BTreeSet::from([1]));

        let later = now + Duration::minutes(10);
        assert!(cache.try_reserve(1, later));
        cache.release(1, later);
        assert_eq!(cache.undelivered(), BTreeSet::from([1]));
        assert_eq!(cache.purge(now + Duration::hours(49)), 1);
        assert!(cache.undelivered().is_empty());

        assert!(cache.try_reserve(2, now));
        cache.release(2, now);
        cache.confirm(2);
        assert!(cache.undelivered().is_empty());
    }

    #[test]
    fn purge_drops_entries_past_retention() {
        let cache = NotificationDedupeCache::default();
        let now = Utc::now();
        cache.try_reserve(1, now - Duration::hours(49));
        cache.try_reserve(2, now - Duration::hours(2));
        assert_eq!(cache.purge(now), 1);
        assert_eq!(cache.len(), 1);
    }
}
