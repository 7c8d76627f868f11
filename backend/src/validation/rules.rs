//! Validation rules for wizard answers and one-shot numeric inputs.

use crate::models::nutrition::DailyNorms;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("{field}: please enter a number")]
    Format { field: &'static str },
    #[error("{field} must be between {min} and {max}")]
    Range {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("expected {expected} numbers, got {actual}")]
    Arity { expected: usize, actual: usize },
}

pub const AGE_RANGE: (i32, i32) = (12, 100);
pub const WEIGHT_RANGE: (f64, f64) = (30.0, 300.0);
pub const HEIGHT_RANGE: (f64, f64) = (100.0, 250.0);
pub const CALORIES_RANGE: (f64, f64) = (500.0, 10_000.0);
pub const PROTEINS_RANGE: (f64, f64) = (10.0, 500.0);
pub const FATS_RANGE: (f64, f64) = (10.0, 500.0);
pub const CARBS_RANGE: (f64, f64) = (10.0, 1_000.0);

const CANCEL_WORDS: [&str; 3] = ["cancel", "/cancel", "отмена"];

/// True when the text asks to abandon the current sub-flow.
pub fn is_cancel(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    CANCEL_WORDS.contains(&normalized.as_str())
}

/// Parses a decimal number, accepting a comma as the decimal separator.
fn parse_decimal(raw: &str, field: &'static str) -> Result<f64, InputError> {
    let value: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| InputError::Format { field })?;
    if !value.is_finite() {
        return Err(InputError::Format { field });
    }
    Ok(value)
}

fn check_range(value: f64, field: &'static str, (min, max): (f64, f64)) -> Result<f64, InputError> {
    if !(min..=max).contains(&value) {
        return Err(InputError::Range { field, min, max });
    }
    Ok(value)
}

/// Age in whole years, 12..=100.
pub fn parse_age(raw: &str) -> Result<i32, InputError> {
    let field = "Age";
    let age: i32 = raw
        .trim()
        .parse()
        .map_err(|_| InputError::Format { field })?;
    let (min, max) = AGE_RANGE;
    if !(min..=max).contains(&age) {
        return Err(InputError::Range {
            field,
            min: f64::from(min),
            max: f64::from(max),
        });
    }
    Ok(age)
}

/// Weight in kilograms, 30..=300.
pub fn parse_weight(raw: &str) -> Result<f64, InputError> {
    check_range(parse_decimal(raw, "Weight")?, "Weight", WEIGHT_RANGE)
}

/// Height in centimeters, 100..=250.
pub fn parse_height(raw: &str) -> Result<f64, InputError> {
    check_range(parse_decimal(raw, "Height")?, "Height", HEIGHT_RANGE)
}

/// Parses `"<calories> <proteins> <fats> <carbs>"`.
pub fn parse_manual_norms(raw: &str) -> Result<DailyNorms, InputError> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(InputError::Arity {
            expected: 4,
            actual: parts.len(),
        });
    }

    let calories = check_range(parse_decimal(parts[0], "Calories")?, "Calories", CALORIES_RANGE)?;
    let proteins = check_range(parse_decimal(parts[1], "Protein")?, "Protein", PROTEINS_RANGE)?;
    let fats = check_range(parse_decimal(parts[2], "Fat")?, "Fat", FATS_RANGE)?;
    let carbs = check_range(parse_decimal(parts[3], "Carbs")?, "Carbs", CARBS_RANGE)?;

    Ok(DailyNorms {
        calories,
        proteins,
        fats,
        carbs,
    })
}

/// Portion size in grams: digits only, strictly positive.
pub fn parse_portion_grams(raw: &str) -> Result<u32, InputError> {
    let field = "Portion";
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(InputError::Format { field });
    }
    let grams: u32 = trimmed.parse().map_err(|_| InputError::Format { field })?;
    if grams == 0 {
        return Err(InputError::Range {
            field,
            min: 1.0,
            max: f64::from(u32::MAX),
        });
    }
    Ok(grams)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_rejects_out_of_range_and_fractions() {
        assert_eq!(parse_age("12"), Ok(12));
        assert_eq!(parse_age(" 100 "), Ok(100));
        assert!(matches!(parse_age("11"), Err(InputError::Range { .. })));
        assert!(matches!(parse_age("101"), Err(InputError::Range { .. })));
        assert!(matches!(parse_age("30.5"), Err(InputError::Format { .. })));
        assert!(matches!(parse_age("abc"), Err(InputError::Format { .. })));
    }

    #[test]
    fn weight_accepts_comma_separator() {
        assert_eq!(parse_weight("72,5"), Ok(72.5));
        assert!(matches!(parse_weight("29.9"), Err(InputError::Range { .. })));
        assert!(matches!(parse_weight("301"), Err(InputError::Range { .. })));
        assert!(matches!(parse_weight("NaN"), Err(InputError::Format { .. })));
    }

    #[test]
    fn height_bounds_are_inclusive() {
        assert_eq!(parse_height("100"), Ok(100.0));
        assert_eq!(parse_height("250"), Ok(250.0));
        assert!(matches!(parse_height("99"), Err(InputError::Range { .. })));
        assert!(matches!(parse_height("inf"), Err(InputError::Format { .. })));
    }

    #[test]
    fn manual_norms_parse_exactly_four_numbers() {
        let norms = parse_manual_norms("2000 150 70 200").unwrap();
        assert_eq!(norms.calories, 2000.0);
        assert_eq!(norms.proteins, 150.0);
        assert_eq!(norms.fats, 70.0);
        assert_eq!(norms.carbs, 200.0);

        assert_eq!(
            parse_manual_norms("2000 150 70"),
            Err(InputError::Arity {
                expected: 4,
                actual: 3
            })
        );
        assert!(matches!(
            parse_manual_norms("2000 150 70 200 5"),
            Err(InputError::Arity { actual: 5, .. })
        ));
    }

    #[test]
    fn manual_norms_name_the_offending_field() {
        assert_eq!(
            parse_manual_norms("400 150 70 200"),
            Err(InputError::Range {
                field: "Calories",
                min: 500.0,
                max: 10_000.0
            })
        );
        assert!(matches!(
            parse_manual_norms("2000 150 5 200"),
            Err(InputError::Range { field: "Fat", .. })
        ));
        assert!(matches!(
            parse_manual_norms("2000 x 70 200"),
            Err(InputError::Format { field: "Protein" })
        ));
    }

    #[test]
    fn portion_requires_positive_digits() {
        assert_eq!(parse_portion_grams("250"), Ok(250));
        assert!(matches!(parse_portion_grams("0"), Err(InputError::Range { .. })));
        assert!(matches!(parse_portion_grams("-5"), Err(InputError::Format { .. })));
        assert!(matches!(parse_portion_grams("12.5"), Err(InputError::Format { .. })));
        assert!(matches!(parse_portion_grams("250 g"), Err(InputError::Format { .. })));
    }

    #[test]
    fn cancel_words_are_case_insensitive() {
        assert!(is_cancel("Cancel"));
        assert!(is_cancel(" /cancel "));
        assert!(is_cancel("ОТМЕНА"));
        assert!(!is_cancel("cancelled"));
    }
}
