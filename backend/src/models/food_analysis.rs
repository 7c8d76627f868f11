//! Persisted food log entries and the daily aggregation built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::nutrition::{round1, FoodSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Meal slot derived from the local time of day.
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub const ALL: [MealType; 4] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
    ];

    /// 05-10 breakfast, 11-15 lunch, 16-20 dinner, everything else snack.
    pub fn from_local_hour(hour: u32) -> Self {
        match hour {
            5..=10 => MealType::Breakfast,
            11..=15 => MealType::Lunch,
            16..=20 => MealType::Dinner,
            _ => MealType::Snack,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "breakfast" => MealType::Breakfast,
            "lunch" => MealType::Lunch,
            "dinner" => MealType::Dinner,
            _ => MealType::Snack,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MealType::Breakfast => "Breakfast",
            MealType::Lunch => "Lunch",
            MealType::Dinner => "Dinner",
            MealType::Snack => "Snacks",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Append-only log row for a dish the user added to statistics.
pub struct FoodAnalysis {
    pub id: i64,
    /// Owning `users.id`.
    pub user_id: i64,
    pub analysis_date: DateTime<Utc>,
    pub food_name: String,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
    pub image_path: Option<String>,
    pub portion_weight: Option<f64>,
    /// One of `breakfast`, `lunch`, `dinner`, `snack`.
    pub meal_type: String,
}

/// Insert payload for [`FoodAnalysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewFoodAnalysis {
    pub telegram_id: i64,
    pub analysis_date: DateTime<Utc>,
    pub food_name: String,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
    pub image_path: Option<String>,
    pub portion_weight: Option<f64>,
    pub meal_type: MealType,
}

impl NewFoodAnalysis {
    pub fn from_snapshot(
        telegram_id: i64,
        food: &FoodSnapshot,
        analysis_date: DateTime<Utc>,
        meal_type: MealType,
    ) -> Self {
        Self {
            telegram_id,
            analysis_date,
            food_name: food.name.clone(),
            calories: food.calories,
            proteins: food.proteins,
            fats: food.fats,
            carbs: food.carbs,
            image_path: food.source_image_path.clone(),
            portion_weight: Some(food.portion_weight_grams),
            meal_type,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroTotals {
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
}

impl MacroTotals {
    fn add(&mut self, row: &FoodAnalysis) {
        self.calories += row.calories;
        self.proteins += row.proteins;
        self.fats += row.fats;
        self.carbs += row.carbs;
    }

    pub fn rounded(&self) -> Self {
        Self {
            calories: round1(self.calories),
            proteins: round1(self.proteins),
            fats: round1(self.fats),
            carbs: round1(self.carbs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MealBreakdown {
    pub totals: MacroTotals,
    pub items: Vec<FoodAnalysis>,
}

/// One local day of log rows grouped by meal slot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyStats {
    pub totals: MacroTotals,
    pub meals: Vec<(MealType, MealBreakdown)>,
}

impl DailyStats {
    pub fn from_rows(rows: Vec<FoodAnalysis>) -> Self {
        let mut totals = MacroTotals::default();
        let mut meals: Vec<(MealType, MealBreakdown)> = MealType::ALL
            .into_iter()
            .map(|meal| (meal, MealBreakdown::default()))
            .collect();

        for row in rows {
            totals.add(&row);
            let meal = MealType::parse(&row.meal_type);
            if let Some((_, breakdown)) = meals.iter_mut().find(|(m, _)| *m == meal) {
                breakdown.totals.add(&row);
                breakdown.items.push(row);
            }
        }

        meals.retain(|(_, breakdown)| !breakdown.items.is_empty());
        Self { totals, meals }
    }

    pub fn is_empty(&self) -> bool {
        self.meals.is_empty()
    }
}
