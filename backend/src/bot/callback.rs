//! Inline button payloads.

use chrono::NaiveDate;

use crate::models::nutrition::{ActivityLevel, Gender, Goal};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Callback {
    SetupProfile,
    SetupManualNorms,
    Gender(Gender),
    Activity(ActivityLevel),
    Goal(Goal),
    Subscribe,
    SubscribePlan(u32),
    /// Carries the user the analysis result belongs to.
    AddStats(i64),
    SpecifyFood,
    SpecifyPortion,
    /// Carries the date currently shown.
    StatsPrev(NaiveDate),
    StatsNext(NaiveDate),
    StatsToday,
}

impl Callback {
    pub fn data(&self) -> String {
        match self {
            Callback::SetupProfile => "setup_profile".to_string(),
            Callback::SetupManualNorms => "setup_manual_norms".to_string(),
            Callback::Gender(gender) => format!("gender_{}", gender.as_str()),
            Callback::Activity(level) => format!("activity_{}", level.token()),
            Callback::Goal(goal) => format!("goal_{}", goal.as_str()),
            Callback::Subscribe => "subscribe".to_string(),
            Callback::SubscribePlan(months) => format!("subscribe_{months}"),
            Callback::AddStats(user_id) => format!("add_stats_{user_id}"),
            Callback::SpecifyFood => "specify_food".to_string(),
            Callback::SpecifyPortion => "specify_portion".to_string(),
            Callback::StatsPrev(date) => format!("stats_prev_{}", date.format(DATE_FORMAT)),
            Callback::StatsNext(date) => format!("stats_next_{}", date.format(DATE_FORMAT)),
            Callback::StatsToday => "stats_today".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let parsed = match data {
            "setup_profile" => Callback::SetupProfile,
            "setup_manual_norms" => Callback::SetupManualNorms,
            "subscribe" => Callback::Subscribe,
            "specify_food" => Callback::SpecifyFood,
            "specify_portion" => Callback::SpecifyPortion,
            "stats_today" => Callback::StatsToday,
            _ => {
                let date = |raw: &str| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok();
                if let Some(rest) = data.strip_prefix("gender_") {
                    Callback::Gender(Gender::parse(rest)?)
                } else if let Some(rest) = data.strip_prefix("activity_") {
                    Callback::Activity(ActivityLevel::from_token(rest)?)
                } else if let Some(rest) = data.strip_prefix("goal_") {
                    Callback::Goal(Goal::parse(rest)?)
                } else if let Some(rest) = data.strip_prefix("subscribe_") {
                    Callback::SubscribePlan(rest.parse().ok()?)
                } else if let Some(rest) = data.strip_prefix("add_stats_") {
                    Callback::AddStats(rest.parse().ok()?)
                } else if let Some(rest) = data.strip_prefix("stats_prev_") {
                    Callback::StatsPrev(date(rest)?)
                } else if let Some(rest) = data.strip_prefix("stats_next_") {
                    Callback::StatsNext(date(rest)?)
                } else {
                    return None;
                }
            }
        };
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_button_family() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let all = [
            Callback::SetupProfile,
            Callback::SetupManualNorms,
            Callback::Gender(Gender::Female),
            Callback::Activity(ActivityLevel::Moderate),
            Callback::Goal(Goal::WeightGain),
            Callback::Subscribe,
            Callback::SubscribePlan(12),
            Callback::AddStats(-1001),
            Callback::SpecifyFood,
            Callback::SpecifyPortion,
            Callback::StatsPrev(date),
            Callback::StatsNext(date),
            Callback::StatsToday,
        ];
        for callback in all {
            assert_eq!(Callback::parse(&callback.data()), Some(callback));
        }
        assert_eq!(Callback::parse("activity_1.55"), Some(Callback::Activity(ActivityLevel::Moderate)));
    }

    #[test]
    fn rejects_unknown_payloads() {
        for raw in ["", "gender_other", "activity_2.0", "stats_prev_yesterday", "add_stats_x", "dance"] {
            assert_eq!(Callback::parse(raw), None, "{raw}");
        }
    }
}
