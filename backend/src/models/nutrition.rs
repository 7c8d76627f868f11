//! Nutrition value types shared by the dialog, recognition and storage layers.

use serde::{Deserialize, Serialize};

/// Rounds to one decimal place, the precision used for every displayed macro.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Physical activity multiplier applied to the basal metabolic rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    High,
    Extreme,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 5] = [
        ActivityLevel::Sedentary,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::High,
        ActivityLevel::Extreme,
    ];

    pub fn factor(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::High => 1.725,
            ActivityLevel::Extreme => 1.9,
        }
    }

    /// Callback token, e.g. `"1.375"`.
    pub fn token(&self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "1.2",
            ActivityLevel::Light => "1.375",
            ActivityLevel::Moderate => "1.55",
            ActivityLevel::High => "1.725",
            ActivityLevel::Extreme => "1.9",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "Sedentary",
            ActivityLevel::Light => "Light activity (1-3 workouts a week)",
            ActivityLevel::Moderate => "Moderate activity (3-5 workouts a week)",
            ActivityLevel::High => "High activity (6-7 workouts a week)",
            ActivityLevel::Extreme => "Very high activity (physical job or twice-daily training)",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.token() == token)
    }

    /// Matches a persisted factor back to its level.
    pub fn from_factor(factor: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| (level.factor() - factor).abs() < 1e-6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    WeightLoss,
    Maintenance,
    WeightGain,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::WeightLoss => "weight_loss",
            Goal::Maintenance => "maintenance",
            Goal::WeightGain => "weight_gain",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Goal::WeightLoss => "Weight loss",
            Goal::Maintenance => "Weight maintenance",
            Goal::WeightGain => "Weight gain",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "weight_loss" => Some(Goal::WeightLoss),
            "maintenance" => Some(Goal::Maintenance),
            "weight_gain" => Some(Goal::WeightGain),
            _ => None,
        }
    }
}

/// A fully validated anthropometric profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub gender: Gender,
    pub age: i32,
    pub weight: f64,
    pub height: f64,
    pub activity: ActivityLevel,
    pub goal: Goal,
}

/// Daily calorie and macro targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyNorms {
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
}

/// Result returned by the recognition and lookup collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionResult {
    pub name: String,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
    pub portion_weight_grams: f64,
    #[serde(default)]
    pub is_estimated: bool,
    #[serde(default)]
    pub no_food_detected: bool,
}

/// Placeholder name some recognizers return when they cannot identify a dish.
pub const UNKNOWN_DISH: &str = "Unknown dish";

impl NutritionResult {
    pub fn is_nothing_to_log(&self) -> bool {
        self.no_food_detected || self.name.trim().is_empty() || self.name == UNKNOWN_DISH
    }
}

/// The food data a user is currently looking at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodSnapshot {
    pub name: String,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
    pub portion_weight_grams: f64,
    pub source_image_path: Option<String>,
    pub is_estimated: bool,
}

impl FoodSnapshot {
    pub fn from_result(result: &NutritionResult, source_image_path: Option<String>) -> Self {
        Self {
            name: result.name.clone(),
            calories: result.calories,
            proteins: result.proteins,
            fats: result.fats,
            carbs: result.carbs,
            portion_weight_grams: result.portion_weight_grams,
            source_image_path,
            is_estimated: result.is_estimated,
        }
    }
}
