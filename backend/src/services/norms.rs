//! Daily calorie and macro targets (Mifflin-St Jeor).

use crate::models::nutrition::{round1, DailyNorms, Gender, Goal, Profile};

/// Basal metabolic rate in kcal/day.
pub fn basal_metabolic_rate(profile: &Profile) -> f64 {
    let base = 10.0 * profile.weight + 6.25 * profile.height - 5.0 * f64::from(profile.age);
    match profile.gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    }
}

fn goal_multiplier(goal: Goal) -> f64 {
    match goal {
        Goal::WeightLoss => 0.8,
        Goal::Maintenance => 1.0,
        Goal::WeightGain => 1.15,
    }
}

/// Protein, fat and carbohydrate shares of daily calories.
fn macro_split(goal: Goal) -> (f64, f64, f64) {
    match goal {
        Goal::WeightLoss => (0.35, 0.30, 0.35),
        Goal::WeightGain => (0.30, 0.25, 0.45),
        Goal::Maintenance => (0.30, 0.30, 0.40),
    }
}

pub fn calculate_daily_norms(profile: &Profile) -> DailyNorms {
    let calories =
        basal_metabolic_rate(profile) * profile.activity.factor() * goal_multiplier(profile.goal);
    let (protein_share, fat_share, carb_share) = macro_split(profile.goal);

    DailyNorms {
        calories: round1(calories),
        proteins: round1(calories * protein_share / 4.0),
        fats: round1(calories * fat_share / 9.0),
        carbs: round1(calories * carb_share / 4.0),
    }
}
