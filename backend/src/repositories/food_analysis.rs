use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    food_analysis::{FoodAnalysis, NewFoodAnalysis},
    nutrition::NutritionResult,
};

pub async fn insert_food_analysis(
    pool: &PgPool,
    entry: &NewFoodAnalysis,
) -> Result<FoodAnalysis, sqlx::Error> {
    sqlx::query_as::<_, FoodAnalysis>(
        r#"
        INSERT INTO food_analyses
            (user_id, analysis_date, food_name, calories, proteins, fats, carbs,
             image_path, portion_weight, meal_type)
        SELECT u.id, $2, $3, $4, $5, $6, $7, $8, $9, $10
        FROM users u
        WHERE u.telegram_id = $1
        RETURNING id, user_id, analysis_date, food_name, calories, proteins, fats, carbs,
                  image_path, portion_weight, meal_type
        "#,
    )
    .bind(entry.telegram_id)
    .bind(entry.analysis_date)
    .bind(&entry.food_name)
    .bind(entry.calories)
    .bind(entry.proteins)
    .bind(entry.fats)
    .bind(entry.carbs)
    .bind(entry.image_path.as_deref())
    .bind(entry.portion_weight)
    .bind(entry.meal_type.as_str())
    .fetch_one(pool)
    .await
}

pub async fn count_for_user(pool: &PgPool, telegram_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM food_analyses fa
        JOIN users u ON u.id = fa.user_id
        WHERE u.telegram_id = $1
        "#,
    )
    .bind(telegram_id)
    .fetch_one(pool)
    .await
}

pub async fn list_between(
    pool: &PgPool,
    telegram_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<FoodAnalysis>, sqlx::Error> {
    sqlx::query_as::<_, FoodAnalysis>(
        r#"
        SELECT fa.id, fa.user_id, fa.analysis_date, fa.food_name, fa.calories, fa.proteins,
               fa.fats, fa.carbs, fa.image_path, fa.portion_weight, fa.meal_type
        FROM food_analyses fa
        JOIN users u ON u.id = fa.user_id
        WHERE u.telegram_id = $1
          AND fa.analysis_date >= $2
          AND fa.analysis_date < $3
        ORDER BY fa.analysis_date ASC, fa.id ASC
        "#,
    )
    .bind(telegram_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Rewrites the most recent log row of the user with a refined lookup result.
pub async fn overwrite_latest(
    pool: &PgPool,
    telegram_id: i64,
    food_name: &str,
    result: &NutritionResult,
) -> Result<Option<FoodAnalysis>, sqlx::Error> {
    sqlx::query_as::<_, FoodAnalysis>(
        r#"
        UPDATE food_analyses
        SET food_name = $2, calories = $3, proteins = $4, fats = $5, carbs = $6,
            portion_weight = $7
        WHERE id = (
            SELECT fa.id
            FROM food_analyses fa
            JOIN users u ON u.id = fa.user_id
            WHERE u.telegram_id = $1
            ORDER BY fa.analysis_date DESC, fa.id DESC
            LIMIT 1
        )
        RETURNING id, user_id, analysis_date, food_name, calories, proteins, fats, carbs,
                  image_path, portion_weight, meal_type
        "#,
    )
    .bind(telegram_id)
    .bind(food_name)
    .bind(result.calories)
    .bind(result.proteins)
    .bind(result.fats)
    .bind(result.carbs)
    .bind(result.portion_weight_grams)
    .fetch_optional(pool)
    .await
}

pub async fn count_all(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM food_analyses")
        .fetch_one(pool)
        .await
}

pub async fn count_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM food_analyses WHERE analysis_date >= $1")
        .bind(since)
        .fetch_one(pool)
        .await
}

pub async fn delete_older_than(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM food_analyses WHERE analysis_date < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
