use sqlx::PgPool;

use crate::models::{
    nutrition::{DailyNorms, Profile},
    user::{User, UserIdentity},
};

const USER_COLUMNS: &str = "id, telegram_id, username, first_name, last_name, created_at, \
     gender, age, weight, height, activity_level, goal, \
     daily_calories, daily_proteins, daily_fats, daily_carbs";

/// Inserts the user or refreshes the identity fields of an existing row.
pub async fn upsert_user(pool: &PgPool, identity: &UserIdentity) -> Result<User, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO users (telegram_id, username, first_name, last_name)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (telegram_id) DO UPDATE
        SET username = COALESCE(EXCLUDED.username, users.username),
            first_name = COALESCE(EXCLUDED.first_name, users.first_name),
            last_name = COALESCE(EXCLUDED.last_name, users.last_name)
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, User>(&query)
        .bind(identity.telegram_id)
        .bind(identity.username.as_deref())
        .bind(identity.first_name.as_deref())
        .bind(identity.last_name.as_deref())
        .fetch_one(pool)
        .await
}

pub async fn find_by_telegram_id(
    pool: &PgPool,
    telegram_id: i64,
) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = $1");
    sqlx::query_as::<_, User>(&query)
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
}

pub async fn save_profile(
    pool: &PgPool,
    telegram_id: i64,
    profile: &Profile,
    norms: &DailyNorms,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET gender = $2, age = $3, weight = $4, height = $5, activity_level = $6, goal = $7,
            daily_calories = $8, daily_proteins = $9, daily_fats = $10, daily_carbs = $11
        WHERE telegram_id = $1
        "#,
    )
    .bind(telegram_id)
    .bind(profile.gender.as_str())
    .bind(profile.age)
    .bind(profile.weight)
    .bind(profile.height)
    .bind(profile.activity.factor())
    .bind(profile.goal.as_str())
    .bind(norms.calories)
    .bind(norms.proteins)
    .bind(norms.fats)
    .bind(norms.carbs)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn save_norms(
    pool: &PgPool,
    telegram_id: i64,
    norms: &DailyNorms,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET daily_calories = $2, daily_proteins = $3, daily_fats = $4, daily_carbs = $5
        WHERE telegram_id = $1
        "#,
    )
    .bind(telegram_id)
    .bind(norms.calories)
    .bind(norms.proteins)
    .bind(norms.fats)
    .bind(norms.carbs)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_users(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}
