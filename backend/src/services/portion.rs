//! Proportional macro recalculation for a new portion size.

use crate::models::nutrition::{round1, FoodSnapshot};

/// Portion assumed when a result carries no usable weight.
pub const DEFAULT_PORTION_GRAMS: f64 = 100.0;

/// Scales every macro from the snapshot's portion to `new_grams`, rounding
/// to one decimal. Pass the recognized snapshot, not an already rescaled one.
pub fn rescale(food: &FoodSnapshot, new_grams: u32) -> FoodSnapshot {
    let old_grams = if food.portion_weight_grams > 0.0 {
        food.portion_weight_grams
    } else {
        DEFAULT_PORTION_GRAMS
    };
    let new_grams = f64::from(new_grams);
    let ratio = new_grams / old_grams;

    FoodSnapshot {
        name: food.name.clone(),
        calories: round1(food.calories * ratio),
        proteins: round1(food.proteins * ratio),
        fats: round1(food.fats * ratio),
        carbs: round1(food.carbs * ratio),
        portion_weight_grams: new_grams,
        source_image_path: food.source_image_path.clone(),
        is_estimated: food.is_estimated,
    }
}
