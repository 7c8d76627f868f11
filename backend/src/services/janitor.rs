//! Periodic eviction of idle and excess sessions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::session_store::SessionStore;
use crate::{config::Config, telegram::Messenger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JanitorSettings {
    pub max_age: Duration,
    pub food_max_age: Duration,
    pub max_entries: usize,
    pub pressure_evict_percent: usize,
    pub alert_threshold: usize,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            max_age: Duration::hours(2),
            food_max_age: Duration::hours(1),
            max_entries: 10_000,
            pressure_evict_percent: 20,
            alert_threshold: 100,
        }
    }
}

impl JanitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_age: Duration::seconds(config.session_max_age_secs as i64),
            food_max_age: Duration::seconds(config.food_cache_max_age_secs as i64),
            max_entries: config.session_max_entries,
            alert_threshold: config.janitor_alert_threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    pub before: usize,
    pub after: usize,
    pub evicted_idle: usize,
    pub evicted_pressure: usize,
    pub stripped: usize,
}

impl JanitorReport {
    pub fn evicted(&self) -> usize {
        self.evicted_idle + self.evicted_pressure
    }
}

pub struct SessionJanitor {
    sessions: SessionStore,
    messenger: Arc<dyn Messenger>,
    admin_ids: Vec<i64>,
    settings: JanitorSettings,
}

impl SessionJanitor {
    pub fn new(
        sessions: SessionStore,
        messenger: Arc<dyn Messenger>,
        admin_ids: Vec<i64>,
        settings: JanitorSettings,
    ) -> Self {
        Self {
            sessions,
            messenger,
            admin_ids,
            settings,
        }
    }

    pub fn settings(&self) -> &JanitorSettings {
        &self.settings
    }

    /// Evicts by age, strips stale scratch data from survivors, then sheds
    /// the coldest sessions if the store is still over capacity.
    pub fn sweep(&self, now: DateTime<Utc>) -> JanitorReport {
        let before = self.sessions.len();
        let evicted_idle = self.sessions.evict_idle(now, self.settings.max_age);
        let stripped = self.sessions.strip_stale(now, self.settings.food_max_age);
        let evicted_pressure = if self.sessions.len() > self.settings.max_entries {
            self.sessions
                .evict_coldest(self.settings.pressure_evict_percent)
        } else {
            0
        };

        JanitorReport {
            before,
            after: self.sessions.len(),
            evicted_idle,
            evicted_pressure,
            stripped,
        }
    }

    /// One full cycle: sweep, log, and alert operators on large evictions.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> JanitorReport {
        let report = self.sweep(now);
        tracing::info!(
            before = report.before,
            after = report.after,
            evicted_idle = report.evicted_idle,
            evicted_pressure = report.evicted_pressure,
            stripped = report.stripped,
            "session cleanup finished"
        );

        if report.evicted() > self.settings.alert_threshold {
            tracing::warn!(evicted = report.evicted(), "large session eviction");
            let text = format!(
                "Session cleanup evicted {} sessions ({} idle, {} over capacity). {} remain.",
                report.evicted(),
                report.evicted_idle,
                report.evicted_pressure,
                report.after
            );
            for admin_id in &self.admin_ids {
                if let Err(err) = self.messenger.send_message(*admin_id, &text, None).await {
                    tracing::warn!(admin_id, error = %err, "failed to deliver cleanup alert");
                }
            }
        }
        report
    }

    pub async fn tick(&self) {
        self.run_cycle(Utc::now()).await;
    }

    /// Operator-triggered eviction of every session idle for `max_idle`.
    pub fn force_cleanup(&self, now: DateTime<Utc>, max_idle: Duration) -> JanitorReport {
        let before = self.sessions.len();
        let evicted_idle = self.sessions.evict_idle(now, max_idle);
        JanitorReport {
            before,
            after: self.sessions.len(),
            evicted_idle,
            ..JanitorReport::default()
        }
    }
}
