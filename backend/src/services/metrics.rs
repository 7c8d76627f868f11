//! Usage metrics with durable snapshots.
//!
//! The collector keeps every counter behind one mutex so that compound
//! updates (increment plus ring-buffer rotation) are atomic. Snapshots are
//! written to a temp file and renamed into place.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response-time samples kept per API.
pub const SAMPLE_WINDOW: usize = 100;
const TOP_N: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metrics snapshot is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Photo,
    Voice,
    Text,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Photo => "photo",
            AnalysisKind::Voice => "voice",
            AnalysisKind::Text => "text",
        }
    }

    /// Name under which recognition calls of this kind are timed.
    pub fn api_name(&self) -> &'static str {
        match self {
            AnalysisKind::Photo => "recognition_image",
            AnalysisKind::Voice => "recognition_voice",
            AnalysisKind::Text => "recognition_text",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStats {
    pub calls: u64,
    pub errors: u64,
    #[serde(default)]
    pub samples_ms: VecDeque<u64>,
}

impl ApiStats {
    fn push_sample(&mut self, millis: u64) {
        if self.samples_ms.len() == SAMPLE_WINDOW {
            self.samples_ms.pop_front();
        }
        self.samples_ms.push_back(millis);
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples_ms.is_empty() {
            return 0.0;
        }
        self.samples_ms.iter().sum::<u64>() as f64 / self.samples_ms.len() as f64
    }
}

/// Point-in-time copy of every counter; also the on-disk format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub api_calls: BTreeMap<String, ApiStats>,
    pub analyses: BTreeMap<String, u64>,
    pub commands: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, u64>,
    pub unique_users: BTreeSet<i64>,
    pub subscription_purchases: u64,
    pub restart_count: u64,
    pub start_times: Vec<DateTime<Utc>>,
    pub saved_at: Option<DateTime<Utc>>,
}

fn sum_into(target: &mut BTreeMap<String, u64>, source: BTreeMap<String, u64>) {
    for (key, value) in source {
        *target.entry(key).or_default() += value;
    }
}

impl MetricsSnapshot {
    /// Folds a previously persisted snapshot into this one by summing.
    fn absorb(&mut self, previous: MetricsSnapshot) {
        for (name, stats) in previous.api_calls {
            let entry = self.api_calls.entry(name).or_default();
            entry.calls += stats.calls;
            entry.errors += stats.errors;
            let mut samples = stats.samples_ms;
            samples.extend(entry.samples_ms.drain(..));
            while samples.len() > SAMPLE_WINDOW {
                samples.pop_front();
            }
            entry.samples_ms = samples;
        }
        sum_into(&mut self.analyses, previous.analyses);
        sum_into(&mut self.commands, previous.commands);
        sum_into(&mut self.errors, previous.errors);
        self.unique_users.extend(previous.unique_users);
        self.subscription_purchases += previous.subscription_purchases;
        self.restart_count += previous.restart_count;
        let mut start_times = previous.start_times;
        start_times.append(&mut self.start_times);
        self.start_times = start_times;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiSummary {
    pub name: String,
    pub calls: u64,
    pub errors: u64,
    pub average_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub uptime_secs: i64,
    pub restart_count: u64,
    pub total_calls: u64,
    pub total_errors: u64,
    /// Percentage of failed API calls.
    pub error_rate: f64,
    pub apis: Vec<ApiSummary>,
    pub top_commands: Vec<(String, u64)>,
    pub top_errors: Vec<(String, u64)>,
    pub unique_users: usize,
    pub analyses: BTreeMap<String, u64>,
    pub subscription_purchases: u64,
}

fn top(counts: &BTreeMap<String, u64>) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts
        .iter()
        .map(|(name, count)| (name.clone(), *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_N);
    ranked
}

impl MetricsSummary {
    pub fn render(&self) -> String {
        let mut lines = vec![
            "📊 Bot metrics".to_string(),
            format!(
                "Uptime: {}h {}m, restarts: {}",
                self.uptime_secs / 3600,
                (self.uptime_secs % 3600) / 60,
                self.restart_count
            ),
            format!(
                "API calls: {} ({} errors, {:.1}%)",
                self.total_calls, self.total_errors, self.error_rate
            ),
        ];
        for api in &self.apis {
            lines.push(format!(
                "  {}: {} calls, {} errors, avg {:.0} ms",
                api.name, api.calls, api.errors, api.average_ms
            ));
        }
        lines.push(format!("Unique users: {}", self.unique_users));
        let analyses = self
            .analyses
            .iter()
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "Analyses: {}",
            if analyses.is_empty() { "none".to_string() } else { analyses }
        ));
        lines.push(format!(
            "Subscription purchases: {}",
            self.subscription_purchases
        ));
        if !self.top_commands.is_empty() {
            lines.push("Top commands:".to_string());
            for (name, count) in &self.top_commands {
                lines.push(format!("  {name}: {count}"));
            }
        }
        if !self.top_errors.is_empty() {
            lines.push("Top errors:".to_string());
            for (name, count) in &self.top_errors {
                lines.push(format!("  {name}: {count}"));
            }
        }
        lines.join("\n")
    }
}

/// Port through which the bot reports usage.
pub trait MetricsRecorder: Send + Sync {
    fn record_call(&self, api: &str, elapsed: Duration, failed: bool);
    fn record_analysis(&self, kind: AnalysisKind, user_id: i64);
    fn record_command(&self, command: &str, user_id: i64);
    fn record_error(&self, kind: &str);
    fn record_subscription_purchase(&self, user_id: i64);
    fn snapshot(&self) -> MetricsSnapshot;
    fn summary(&self, now: DateTime<Utc>) -> MetricsSummary;
    fn reset(&self, now: DateTime<Utc>);
    fn flush(&self) -> Result<(), MetricsError>;
}

#[derive(Debug)]
pub struct MetricsCollector {
    path: PathBuf,
    started_at: DateTime<Utc>,
    state: Mutex<MetricsSnapshot>,
}

impl MetricsCollector {
    /// Opens the collector, merging any snapshot already stored at `path`.
    /// An unreadable snapshot is logged and replaced.
    pub fn open(path: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        let path = path.into();
        let mut state = MetricsSnapshot {
            start_times: vec![now],
            ..MetricsSnapshot::default()
        };
        match load_snapshot(&path) {
            Ok(Some(previous)) => {
                state.absorb(previous);
                state.restart_count += 1;
                tracing::info!(
                    path = %path.display(),
                    restarts = state.restart_count,
                    "loaded persisted metrics"
                );
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable metrics snapshot")
            }
        }

        Self {
            path,
            started_at: now,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Flush entry point for the periodic loop.
    pub fn flush_logged(&self) {
        if let Err(err) = self.flush() {
            tracing::error!(path = %self.path.display(), error = %err, "failed to persist metrics");
        }
    }
}

fn load_snapshot(path: &Path) -> Result<Option<MetricsSnapshot>, MetricsError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl MetricsRecorder for MetricsCollector {
    fn record_call(&self, api: &str, elapsed: Duration, failed: bool) {
        let mut state = self.state();
        let stats = state.api_calls.entry(api.to_string()).or_default();
        stats.calls += 1;
        if failed {
            stats.errors += 1;
        }
        stats.push_sample(elapsed.as_millis() as u64);
    }

    fn record_analysis(&self, kind: AnalysisKind, user_id: i64) {
        let mut state = self.state();
        *state.analyses.entry(kind.as_str().to_string()).or_default() += 1;
        state.unique_users.insert(user_id);
    }

    fn record_command(&self, command: &str, user_id: i64) {
        let mut state = self.state();
        *state.commands.entry(command.to_string()).or_default() += 1;
        state.unique_users.insert(user_id);
    }

    fn record_error(&self, kind: &str) {
        *self.state().errors.entry(kind.to_string()).or_default() += 1;
    }

    fn record_subscription_purchase(&self, user_id: i64) {
        let mut state = self.state();
        state.subscription_purchases += 1;
        state.unique_users.insert(user_id);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.state().clone()
    }

    fn summary(&self, now: DateTime<Utc>) -> MetricsSummary {
        let state = self.state();
        let apis: Vec<ApiSummary> = state
            .api_calls
            .iter()
            .map(|(name, stats)| ApiSummary {
                name: name.clone(),
                calls: stats.calls,
                errors: stats.errors,
                average_ms: stats.average_ms(),
            })
            .collect();
        let total_calls: u64 = apis.iter().map(|api| api.calls).sum();
        let total_errors: u64 = apis.iter().map(|api| api.errors).sum();
        let error_rate = if total_calls == 0 {
            0.0
        } else {
            total_errors as f64 * 100.0 / total_calls as f64
        };

        MetricsSummary {
            uptime_secs: (now - self.started_at).num_seconds().max(0),
            restart_count: state.restart_count,
            total_calls,
            total_errors,
            error_rate,
            apis,
            top_commands: top(&state.commands),
            top_errors: top(&state.errors),
            unique_users: state.unique_users.len(),
            analyses: state.analyses.clone(),
            subscription_purchases: state.subscription_purchases,
        }
    }

    fn reset(&self, now: DateTime<Utc>) {
        *self.state() = MetricsSnapshot {
            start_times: vec![now],
            ..MetricsSnapshot::default()
        };
    }

    fn flush(&self) -> Result<(), MetricsError> {
        let mut snapshot = self.snapshot();
        snapshot.saved_at = Some(Utc::now());
        let body = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "metrics persisted");
        Ok(())
    }
}
