//! Text rendering of an analysed dish, and the best-effort reverse parse
//! used when the structured session copy is gone.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::nutrition::FoodSnapshot;

pub const DISH_MARKER: &str = "🍽️";
pub const CALORIES_LABEL: &str = "Calories:";
pub const MACROS_LABEL: &str = "P/F/C:";
pub const ESTIMATED_NOTE: &str = "Values are approximate: the dish was estimated from similar ones.";

/// Formats an amount with at most one decimal, dropping a trailing `.0`.
pub fn format_amount(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

pub fn render(food: &FoodSnapshot) -> String {
    let mut text = format!(
        "{} {} ({} g)\n\n{} {} kcal\n{} {} g | {} g | {} g",
        DISH_MARKER,
        food.name,
        format_amount(food.portion_weight_grams),
        CALORIES_LABEL,
        format_amount(food.calories),
        MACROS_LABEL,
        format_amount(food.proteins),
        format_amount(food.fats),
        format_amount(food.carbs),
    );
    if food.is_estimated {
        text.push_str("\n\n");
        text.push_str(ESTIMATED_NOTE);
    }
    text
}

struct CardPatterns {
    header: Regex,
    calories: Regex,
    macros: Regex,
}

fn patterns() -> &'static CardPatterns {
    static PATTERNS: OnceLock<CardPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let number = r"(\d+(?:[.,]\d+)?)";
        CardPatterns {
            header: Regex::new(&format!(
                r"(?m)^{}\s*(.+?)\s+\({}\s*g\)\s*$",
                regex::escape(DISH_MARKER),
                number
            ))
            .expect("valid header pattern"),
            calories: Regex::new(&format!(r"{}\s*{}", regex::escape(CALORIES_LABEL), number))
                .expect("valid calories pattern"),
            macros: Regex::new(&format!(
                r"{}\s*{n}\s*g\s*\|\s*{n}\s*g\s*\|\s*{n}",
                regex::escape(MACROS_LABEL),
                n = number
            ))
            .expect("valid macros pattern"),
        }
    })
}

fn number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse().ok()
}

/// Recovers a dish from text produced by [`render`]. Returns `None` when
/// any field is missing.
pub fn parse(text: &str) -> Option<FoodSnapshot> {
    let patterns = patterns();
    let header = patterns.header.captures(text)?;
    let calories = patterns.calories.captures(text)?;
    let macros = patterns.macros.captures(text)?;

    Some(FoodSnapshot {
        name: header.get(1)?.as_str().trim().to_string(),
        portion_weight_grams: number(header.get(2)?.as_str())?,
        calories: number(calories.get(1)?.as_str())?,
        proteins: number(macros.get(1)?.as_str())?,
        fats: number(macros.get(2)?.as_str())?,
        carbs: number(macros.get(3)?.as_str())?,
        source_image_path: None,
        is_estimated: text.contains(ESTIMATED_NOTE),
    })
}
