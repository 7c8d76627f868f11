use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::models::subscription::{ExpiredSubscription, UserSubscription};

/// Days granted per purchased month.
pub const DAYS_PER_MONTH: i64 = 30;

/// Finds every flagged-active subscription whose end date has passed,
/// optionally restricted to one user, and deactivates them in a single
/// committed transaction.
pub async fn deactivate_expired(
    pool: &PgPool,
    telegram_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Vec<ExpiredSubscription>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let expired = sqlx::query_as::<_, ExpiredSubscription>(
        r#"
        SELECT s.id AS subscription_id, u.telegram_id, s.end_date
        FROM user_subscriptions s
        JOIN users u ON u.id = s.user_id
        WHERE s.is_active = TRUE
          AND s.end_date <= $1
          AND ($2::BIGINT IS NULL OR u.telegram_id = $2)
        ORDER BY s.id
        FOR UPDATE OF s
        "#,
    )
    .bind(now)
    .bind(telegram_id)
    .fetch_all(&mut *tx)
    .await?;

    if !expired.is_empty() {
        let ids: Vec<i64> = expired.iter().map(|row| row.subscription_id).collect();
        sqlx::query("UPDATE user_subscriptions SET is_active = FALSE WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(expired)
}

pub async fn find_active(
    pool: &PgPool,
    telegram_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<UserSubscription>, sqlx::Error> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT s.id, s.user_id, s.start_date, s.end_date, s.is_active, s.payment_id
        FROM user_subscriptions s
        JOIN users u ON u.id = s.user_id
        WHERE u.telegram_id = $1
          AND s.is_active = TRUE
          AND s.end_date > $2
        ORDER BY s.end_date DESC
        LIMIT 1
        "#,
    )
    .bind(telegram_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Creates a subscription of `months`. A still-running subscription is
/// folded into the new one: it is deactivated and the new period starts at
/// its end date, so at most one current row exists per user.
pub async fn add_subscription(
    pool: &PgPool,
    telegram_id: i64,
    months: u32,
    payment_id: &str,
    now: DateTime<Utc>,
) -> Result<UserSubscription, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE telegram_id = $1 FOR UPDATE")
        .bind(telegram_id)
        .fetch_one(&mut *tx)
        .await?;

    let current = sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT id, user_id, start_date, end_date, is_active, payment_id
        FROM user_subscriptions
        WHERE user_id = $1 AND is_active = TRUE
        ORDER BY end_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    // Expired rows still flagged active are closed too; only a running
    // period pushes the new start date.
    let start_date = current
        .iter()
        .map(|sub| sub.end_date)
        .filter(|end| *end > now)
        .max()
        .unwrap_or(now);
    let end_date = start_date + Duration::days(DAYS_PER_MONTH * i64::from(months));

    if !current.is_empty() {
        let ids: Vec<i64> = current.iter().map(|sub| sub.id).collect();
        sqlx::query("UPDATE user_subscriptions SET is_active = FALSE WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
    }

    let created = sqlx::query_as::<_, UserSubscription>(
        r#"
        INSERT INTO user_subscriptions (user_id, start_date, end_date, is_active, payment_id)
        VALUES ($1, $2, $3, TRUE, $4)
        RETURNING id, user_id, start_date, end_date, is_active, payment_id
        "#,
    )
    .bind(user_id)
    .bind(start_date)
    .bind(end_date)
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(created)
}

pub async fn count_active(pool: &PgPool, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_subscriptions WHERE is_active = TRUE AND end_date > $1",
    )
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn delete_inactive_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM user_subscriptions WHERE is_active = FALSE AND end_date < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
