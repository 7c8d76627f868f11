use anyhow::anyhow;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Webhook,
    Polling,
}

impl FromStr for TransportMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(TransportMode::Webhook),
            "polling" => Ok(TransportMode::Polling),
            other => Err(anyhow!("Invalid TRANSPORT_MODE value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub transport_mode: TransportMode,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub recognition_api_url: String,
    pub recognition_api_key: Option<String>,
    pub recognition_timeout_secs: u64,
    pub payment_provider_token: String,
    pub subscription_cost: f64,
    pub payment_currency: String,
    pub free_requests_limit: u32,
    pub admin_ids: Vec<i64>,
    pub time_zone: Tz,
    pub metrics_file: PathBuf,
    pub metrics_flush_interval_secs: u64,
    pub download_dir: PathBuf,
    pub reconcile_interval_secs: u64,
    pub janitor_interval_secs: u64,
    pub session_max_age_secs: u64,
    pub food_cache_max_age_secs: u64,
    pub session_max_entries: usize,
    pub janitor_alert_threshold: usize,
    pub worker_concurrency: usize,
    pub update_queue_capacity: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses a comma separated list of user ids, skipping malformed entries.
pub fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let telegram_bot_token = env_optional("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;

        let transport_mode: TransportMode = env_or("TRANSPORT_MODE", "webhook").parse()?;

        let bind_addr_raw = env_or("BIND_ADDR", "0.0.0.0:3000");
        let bind_addr: SocketAddr = bind_addr_raw
            .parse()
            .map_err(|_| anyhow!("Invalid BIND_ADDR value: {}", bind_addr_raw))?;

        let time_zone_name = env_or("APP_TIMEZONE", "Europe/Moscow");
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", time_zone_name))?;

        Ok(Config {
            telegram_bot_token,
            telegram_api_base: env_or("TELEGRAM_API_BASE", "https://api.telegram.org"),
            transport_mode,
            webhook_url: env_optional("WEBHOOK_URL"),
            webhook_secret: env_optional("WEBHOOK_SECRET"),
            bind_addr,
            database_url: env_optional("DATABASE_URL"),
            recognition_api_url: env_or("RECOGNITION_API_URL", "http://localhost:8000"),
            recognition_api_key: env_optional("RECOGNITION_API_KEY"),
            recognition_timeout_secs: env_parse("RECOGNITION_TIMEOUT_SECS", 60),
            payment_provider_token: env_or("PAYMENT_PROVIDER_TOKEN", ""),
            subscription_cost: env_parse("SUBSCRIPTION_COST", 199.0),
            payment_currency: env_or("PAYMENT_CURRENCY", "RUB"),
            free_requests_limit: env_parse("FREE_REQUESTS_LIMIT", 5),
            admin_ids: parse_admin_ids(&env_or("ADMIN_IDS", "")),
            time_zone,
            metrics_file: PathBuf::from(env_or("METRICS_FILE", "data/metrics.json")),
            metrics_flush_interval_secs: env_parse("METRICS_FLUSH_INTERVAL_SECS", 3600),
            download_dir: PathBuf::from(env_or("DOWNLOAD_DIR", "data/uploads")),
            reconcile_interval_secs: env_parse("RECONCILE_INTERVAL_SECS", 600),
            janitor_interval_secs: env_parse("JANITOR_INTERVAL_SECS", 1800),
            session_max_age_secs: env_parse("SESSION_MAX_AGE_SECS", 7200),
            food_cache_max_age_secs: env_parse("FOOD_CACHE_MAX_AGE_SECS", 3600),
            session_max_entries: env_parse("SESSION_MAX_ENTRIES", 10_000),
            janitor_alert_threshold: env_parse("JANITOR_ALERT_THRESHOLD", 100),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 32),
            update_queue_capacity: env_parse("UPDATE_QUEUE_CAPACITY", 1024),
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_admin_ids_skips_garbage() {
        assert_eq!(parse_admin_ids("1, 2,abc,,3"), vec![1, 2, 3]);
        assert!(parse_admin_ids("").is_empty());
    }

    #[test]
    fn transport_mode_parses_case_insensitively() {
        assert_eq!(
            "Polling".parse::<TransportMode>().unwrap(),
            TransportMode::Polling
        );
        assert_eq!(
            " webhook ".parse::<TransportMode>().unwrap(),
            TransportMode::Webhook
        );
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }
}
