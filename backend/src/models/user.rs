//! Bot users and their nutrition profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::nutrition::{ActivityLevel, DailyNorms, Gender, Goal, Profile};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a messenger user.
pub struct User {
    /// Surrogate key.
    pub id: i64,
    /// Messenger-side user id.
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `male` or `female` once the wizard has run.
    pub gender: Option<String>,
    pub age: Option<i32>,
    /// Body weight in kilograms.
    pub weight: Option<f64>,
    /// Height in centimeters.
    pub height: Option<f64>,
    /// Activity multiplier.
    pub activity_level: Option<f64>,
    pub goal: Option<String>,
    pub daily_calories: Option<f64>,
    pub daily_proteins: Option<f64>,
    pub daily_fats: Option<f64>,
    pub daily_carbs: Option<f64>,
}

/// Identity fields captured from an inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn new(identity: &UserIdentity, id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            telegram_id: identity.telegram_id,
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            created_at,
            gender: None,
            age: None,
            weight: None,
            height: None,
            activity_level: None,
            goal: None,
            daily_calories: None,
            daily_proteins: None,
            daily_fats: None,
            daily_carbs: None,
        }
    }

    /// Returns the profile when every wizard field is present and recognised.
    pub fn profile(&self) -> Option<Profile> {
        Some(Profile {
            gender: Gender::parse(self.gender.as_deref()?)?,
            age: self.age?,
            weight: self.weight?,
            height: self.height?,
            activity: ActivityLevel::from_factor(self.activity_level?)?,
            goal: Goal::parse(self.goal.as_deref()?)?,
        })
    }

    pub fn norms(&self) -> Option<DailyNorms> {
        Some(DailyNorms {
            calories: self.daily_calories?,
            proteins: self.daily_proteins?,
            fats: self.daily_fats?,
            carbs: self.daily_carbs?,
        })
    }

    pub fn apply_profile(&mut self, profile: &Profile, norms: &DailyNorms) {
        self.gender = Some(profile.gender.as_str().to_string());
        self.age = Some(profile.age);
        self.weight = Some(profile.weight);
        self.height = Some(profile.height);
        self.activity_level = Some(profile.activity.factor());
        self.goal = Some(profile.goal.as_str().to_string());
        self.apply_norms(norms);
    }

    pub fn apply_norms(&mut self, norms: &DailyNorms) {
        self.daily_calories = Some(norms.calories);
        self.daily_proteins = Some(norms.proteins);
        self.daily_fats = Some(norms.fats);
        self.daily_carbs = Some(norms.carbs);
    }
}
