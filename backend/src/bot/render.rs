//! User-facing texts and inline keyboards.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use super::callback::Callback;
use crate::{
    models::{
        food_analysis::DailyStats,
        nutrition::{ActivityLevel, DailyNorms, Gender, Goal, Profile},
    },
    services::{
        food_card::format_amount,
        payments::{Plan, PLANS},
        quota::Remaining,
        session_store::SessionStats,
        janitor::JanitorSettings,
    },
    telegram::{InlineButton, InlineKeyboard},
    validation::InputError,
};

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again in a moment.";
pub const PAYMENT_SUPPORT: &str =
    "We could not process your payment. Please contact support and quote your payment receipt.";
pub const ACCESS_DENIED: &str = "Access denied.";
pub const PROCESSING: &str = "⏳ Analysing, this can take up to a minute...";
pub const NOTHING_TO_LOG: &str =
    "I could not find any food here. Send a clear photo of the dish, or describe it in text or by voice.";
pub const RECOGNITION_UNAVAILABLE: &str =
    "The recognition service is unavailable right now. Please try again in a few minutes.";
pub const RESUBMIT_PHOTO: &str =
    "This result is no longer available. Please send the photo again.";
pub const RESULT_EXPIRED: &str = "This result is no longer available.";
pub const ALREADY_ADDED: &str = "Already added to statistics.";
pub const ADDED: &str = "Added to statistics ✅";
pub const NOT_YOUR_RESULT: &str = "This result belongs to another user.";
pub const START_SETUP_AGAIN: &str = "Please start setup again with /setup.";
pub const CANCELLED: &str = "Cancelled.";
pub const NOTHING_TO_CANCEL: &str = "There is nothing to cancel.";
pub const NOT_FOUND_BY_NAME: &str =
    "I could not find nutrition data for this dish. Try a different name.";

pub const HELP: &str = "📸 Send a photo of your meal, a voice note or a text description and I will estimate its calories and macros.\n\n\
/setup - profile and daily norms\n\
/stats - today's statistics\n\
/subscription - subscription status\n\
/cancel - abort the current step\n\
/help - this message";

pub fn welcome(first_name: &str, remaining: Remaining) -> String {
    let greeting = if first_name.is_empty() {
        "Hi!".to_string()
    } else {
        format!("Hi, {first_name}!")
    };
    format!(
        "{greeting} I am SnapEat. Send me a photo of your meal and I will count its calories and macros.\n\n{}",
        remaining_line(remaining)
    )
}

pub fn remaining_line(remaining: Remaining) -> String {
    match remaining {
        Remaining::Unlimited => "Your subscription is active: analyses are unlimited.".to_string(),
        Remaining::Limited(left) => format!("Free analyses left: {left}."),
    }
}

pub fn quota_exhausted(free_limit: u32) -> String {
    format!(
        "You have used all {free_limit} free analyses. Subscribe to keep analysing meals without limits."
    )
}

pub fn start_keyboard(subscribed: bool) -> InlineKeyboard {
    let keyboard = InlineKeyboard::new().button("⚙️ Set up profile", Callback::SetupProfile.data());
    if subscribed {
        keyboard
    } else {
        keyboard.button("⭐ Subscribe", Callback::Subscribe.data())
    }
}

pub fn subscribe_keyboard() -> InlineKeyboard {
    InlineKeyboard::new().button("⭐ Subscribe", Callback::Subscribe.data())
}

pub fn setup_keyboard() -> InlineKeyboard {
    InlineKeyboard::new()
        .button("📝 Fill in profile", Callback::SetupProfile.data())
        .button("✍️ Enter norms manually", Callback::SetupManualNorms.data())
}

pub fn setup_overview(profile: Option<&Profile>, norms: Option<&DailyNorms>) -> String {
    let mut lines = vec!["⚙️ Profile".to_string()];
    match profile {
        Some(profile) => lines.push(profile_summary(profile)),
        None => lines.push("Not filled in yet.".to_string()),
    }
    lines.push(String::new());
    match norms {
        Some(norms) => lines.push(norms_summary(norms)),
        None => lines.push("Daily norms are not set.".to_string()),
    }
    lines.join("\n")
}

pub fn profile_summary(profile: &Profile) -> String {
    format!(
        "Gender: {}\nAge: {}\nWeight: {} kg\nHeight: {} cm\nActivity: {}\nGoal: {}",
        match profile.gender {
            Gender::Male => "male",
            Gender::Female => "female",
        },
        profile.age,
        format_amount(profile.weight),
        format_amount(profile.height),
        profile.activity.label(),
        profile.goal.label()
    )
}

pub fn norms_summary(norms: &DailyNorms) -> String {
    format!(
        "Daily norms:\nCalories: {} kcal\nProtein: {} g\nFat: {} g\nCarbs: {} g",
        format_amount(norms.calories),
        format_amount(norms.proteins),
        format_amount(norms.fats),
        format_amount(norms.carbs)
    )
}

pub fn profile_saved(norms: &DailyNorms) -> String {
    format!("✅ Profile saved.\n\n{}", norms_summary(norms))
}

pub fn gender_prompt() -> (&'static str, InlineKeyboard) {
    (
        "Step 1/6. Choose your gender:",
        InlineKeyboard::new().row(vec![
            InlineButton::callback("Male", Callback::Gender(Gender::Male).data()),
            InlineButton::callback("Female", Callback::Gender(Gender::Female).data()),
        ]),
    )
}

pub const AGE_PROMPT: &str = "Step 2/6. Enter your age (12-100):";
pub const WEIGHT_PROMPT: &str = "Step 3/6. Enter your weight in kg (30-300):";
pub const HEIGHT_PROMPT: &str = "Step 4/6. Enter your height in cm (100-250):";

pub fn activity_prompt() -> (&'static str, InlineKeyboard) {
    let keyboard = ActivityLevel::ALL
        .into_iter()
        .fold(InlineKeyboard::new(), |keyboard, level| {
            keyboard.button(level.label(), Callback::Activity(level).data())
        });
    ("Step 5/6. Choose your activity level:", keyboard)
}

pub fn goal_prompt() -> (&'static str, InlineKeyboard) {
    let keyboard = [Goal::WeightLoss, Goal::Maintenance, Goal::WeightGain]
        .into_iter()
        .fold(InlineKeyboard::new(), |keyboard, goal| {
            keyboard.button(goal.label(), Callback::Goal(goal).data())
        });
    ("Step 6/6. Choose your goal:", keyboard)
}

pub const CHOOSE_WITH_BUTTONS: &str = "Please choose one of the buttons above.";

pub const MANUAL_NORMS_PROMPT: &str = "Enter your daily norms as four numbers separated by spaces:\n\
calories protein fat carbs\n\nFor example: 2000 150 70 200";

pub fn invalid_input(err: &InputError) -> String {
    format!("❌ {err}. Please try again.")
}

pub fn manual_norms_rejected(err: &InputError) -> String {
    format!(
        "❌ {err}. Norms were not changed. Press \"Enter norms manually\" in /setup to try again."
    )
}

pub fn manual_norms_saved(norms: &DailyNorms) -> String {
    format!("✅ Norms saved.\n\n{}", norms_summary(norms))
}

pub const FOOD_NAME_PROMPT: &str = "Enter the dish name:";

pub fn portion_prompt(current_grams: f64) -> String {
    format!(
        "Enter the portion weight in grams (current: {} g):",
        format_amount(current_grams)
    )
}

pub const ENTRY_UPDATED: &str = "Your latest statistics entry was updated.";

/// Buttons under an analysis result.
pub fn result_keyboard(owner_id: i64, addable: bool, subscribed: bool) -> InlineKeyboard {
    let mut keyboard = InlineKeyboard::new();
    if addable {
        keyboard = keyboard.button("➕ Add to statistics", Callback::AddStats(owner_id).data());
    }
    keyboard = keyboard.row(vec![
        InlineButton::callback("✏️ Specify dish", Callback::SpecifyFood.data()),
        InlineButton::callback("⚖️ Specify portion", Callback::SpecifyPortion.data()),
    ]);
    if !subscribed {
        keyboard = keyboard.button("⭐ Subscribe", Callback::Subscribe.data());
    }
    keyboard
}

fn progress(eaten: f64, norm: Option<f64>, unit: &str) -> String {
    match norm {
        Some(norm) if norm > 0.0 => format!(
            "{} / {} {unit} ({:.0}%)",
            format_amount(eaten),
            format_amount(norm),
            eaten * 100.0 / norm
        ),
        _ => format!("{} {unit}", format_amount(eaten)),
    }
}

pub fn daily_report(date: NaiveDate, stats: &DailyStats, norms: Option<&DailyNorms>) -> String {
    let mut lines = vec![format!("📊 Statistics for {}", date.format("%d.%m.%Y"))];
    if stats.is_empty() {
        lines.push(String::new());
        lines.push("Nothing was logged on this day.".to_string());
        return lines.join("\n");
    }

    let totals = stats.totals.rounded();
    lines.push(String::new());
    lines.push(format!(
        "Calories: {}",
        progress(totals.calories, norms.map(|n| n.calories), "kcal")
    ));
    lines.push(format!(
        "Protein: {}",
        progress(totals.proteins, norms.map(|n| n.proteins), "g")
    ));
    lines.push(format!(
        "Fat: {}",
        progress(totals.fats, norms.map(|n| n.fats), "g")
    ));
    lines.push(format!(
        "Carbs: {}",
        progress(totals.carbs, norms.map(|n| n.carbs), "g")
    ));

    for (meal, breakdown) in &stats.meals {
        let meal_totals = breakdown.totals.rounded();
        lines.push(String::new());
        lines.push(format!(
            "{} ({} kcal)",
            meal.label(),
            format_amount(meal_totals.calories)
        ));
        for item in &breakdown.items {
            lines.push(format!(
                "• {}: {} kcal, P/F/C {} | {} | {} g",
                item.food_name,
                format_amount(item.calories),
                format_amount(item.proteins),
                format_amount(item.fats),
                format_amount(item.carbs)
            ));
        }
    }
    if norms.is_none() {
        lines.push(String::new());
        lines.push("Set up your profile with /setup to track progress against daily norms.".to_string());
    }
    lines.join("\n")
}

pub fn stats_keyboard(date: NaiveDate, today: NaiveDate) -> InlineKeyboard {
    let mut navigation = vec![InlineButton::callback(
        "⬅️ Previous day",
        Callback::StatsPrev(date).data(),
    )];
    if date < today {
        navigation.push(InlineButton::callback(
            "Next day ➡️",
            Callback::StatsNext(date).data(),
        ));
    }
    let keyboard = InlineKeyboard::new().row(navigation);
    if date != today {
        keyboard.button("📅 Today", Callback::StatsToday.data())
    } else {
        keyboard
    }
}

pub fn plans_text(monthly_cost: f64, currency: &str) -> String {
    format!(
        "⭐ Subscription: unlimited meal analyses.\nBase price: {monthly_cost:.2} {currency} per month. Choose a plan:"
    )
}

pub fn plans_keyboard(monthly_cost: f64) -> InlineKeyboard {
    PLANS.iter().fold(InlineKeyboard::new(), |keyboard, plan: &Plan| {
        keyboard.button(
            plan.button_text(monthly_cost),
            Callback::SubscribePlan(plan.months).data(),
        )
    })
}

fn format_local(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant.with_timezone(tz).format("%d.%m.%Y %H:%M").to_string()
}

pub fn subscription_active(end: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String {
    let days_left = (end - now).num_days().max(0);
    format!(
        "⭐ Your subscription is active until {} ({days_left} days left).",
        format_local(end, tz)
    )
}

pub fn subscription_inactive(remaining: Remaining) -> String {
    format!(
        "You have no active subscription. {}",
        remaining_line(remaining)
    )
}

pub fn payment_confirmed(end: DateTime<Utc>, tz: &Tz) -> String {
    format!(
        "🎉 Thank you! Your subscription is active until {}.",
        format_local(end, tz)
    )
}

pub fn memory_report(stats: &SessionStats, settings: &JanitorSettings) -> String {
    format!(
        "🧠 Sessions\nTotal: {}\nActive in the last hour: {}\nActive in the last 24h: {}\nWith cached food: {}\nIn a dialog: {}\n\n\
Janitor: max age {} min, food cache {} min, cap {} sessions, alert above {} evictions",
        stats.total,
        stats.active_last_hour,
        stats.active_last_day,
        stats.with_food_data,
        stats.in_dialog,
        settings.max_age.num_minutes(),
        settings.food_max_age.num_minutes(),
        settings.max_entries,
        settings.alert_threshold
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_keyboard_hides_add_button_when_not_addable() {
        let with_add = result_keyboard(42, true, false);
        assert_eq!(
            with_add.callback_data(),
            vec!["add_stats_42", "specify_food", "specify_portion", "subscribe"]
        );
        let without = result_keyboard(42, false, true);
        assert_eq!(without.callback_data(), vec!["specify_food", "specify_portion"]);
    }

    #[test]
    fn stats_keyboard_has_no_next_button_for_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(
            stats_keyboard(today, today).callback_data(),
            vec!["stats_prev_2024-05-10"]
        );
        let earlier = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
        assert_eq!(
            stats_keyboard(earlier, today).callback_data(),
            vec!["stats_prev_2024-05-08", "stats_next_2024-05-08", "stats_today"]
        );
    }

    #[test]
    fn empty_day_report() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let text = daily_report(date, &DailyStats::default(), None);
        assert!(text.contains("02.01.2024"));
        assert!(text.contains("Nothing was logged"));
    }
}
