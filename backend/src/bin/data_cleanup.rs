use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snapeat_backend::{
    db::connection::create_pool,
    repositories::{NutritionStore, PgStore},
};

const DEFAULT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CleanupOptions {
    retention_days: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_cleanup=info,snapeat_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = parse_options(std::env::args().skip(1))?;
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url).await?;
    let store = PgStore::new(pool.clone());

    let cutoff = Utc::now() - Duration::days(options.retention_days);
    let report = store.purge_before(cutoff).await?;
    tracing::info!(
        retention_days = options.retention_days,
        %cutoff,
        food_analyses = report.food_analyses,
        subscriptions = report.subscriptions,
        "Deleted expired rows"
    );

    sqlx::query("VACUUM (ANALYZE) food_analyses")
        .execute(pool.as_ref())
        .await?;
    sqlx::query("VACUUM (ANALYZE) user_subscriptions")
        .execute(pool.as_ref())
        .await?;

    println!(
        "cleanup completed: cutoff={} food_analyses={} subscriptions={}",
        cutoff, report.food_analyses, report.subscriptions
    );
    Ok(())
}

fn parse_options<I>(args: I) -> anyhow::Result<CleanupOptions>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut retention_days = DEFAULT_RETENTION_DAYS;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        let value = if arg == "--days" {
            args.next()
                .map(|value| value.as_ref().to_string())
                .ok_or_else(|| anyhow::anyhow!("--days needs a value"))?
        } else if let Some(value) = arg.strip_prefix("--days=") {
            value.to_string()
        } else {
            anyhow::bail!("unknown argument: {}", arg);
        };
        retention_days = value
            .parse()
            .ok()
            .filter(|days: &i64| *days > 0)
            .ok_or_else(|| anyhow::anyhow!("--days must be a positive integer, got {}", value))?;
    }
    Ok(CleanupOptions { retention_days })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ninety_days() {
        let options = parse_options(Vec::<String>::new()).unwrap();
        assert_eq!(options.retention_days, 90);
    }

    #[test]
    fn accepts_both_days_forms() {
        assert_eq!(parse_options(["--days", "30"]).unwrap().retention_days, 30);
        assert_eq!(parse_options(["--days=7"]).unwrap().retention_days, 7);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_options(["--days", "0"]).is_err());
        assert!(parse_options(["--days"]).is_err());
        assert!(parse_options(["--verbose"]).is_err());
    }
}
