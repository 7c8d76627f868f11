use snapeat_backend::{
    bot::render,
    models::nutrition::{ActivityLevel, Gender, Goal},
    repositories::NutritionStore,
    services::{dialog::DialogState, norms::calculate_daily_norms},
};

mod support;

use support::{callback_update, text_update, Harness};

const USER: i64 = 42;

fn state(h: &Harness) -> DialogState {
    h.sessions.get(USER, h.now()).dialog_state
}

#[tokio::test]
async fn setup_wizard_saves_profile_and_computed_norms() {
    let h = Harness::new();

    h.process(text_update(USER, "/setup")).await;
    let overview = h.messenger.last_with_keyboard();
    assert!(overview.text.contains("Not filled in yet."));

    h.process(callback_update(USER, Some(&overview), "setup_profile")).await;
    assert_eq!(state(&h), DialogState::AwaitingGender);
    let gender_prompt = h.messenger.last_with_keyboard();
    assert!(gender_prompt.text.starts_with("Step 1/6"));

    h.process(callback_update(USER, Some(&gender_prompt), "gender_male")).await;
    assert_eq!(state(&h), DialogState::AwaitingAge);
    assert_eq!(h.messenger.last_text(), render::AGE_PROMPT);

    h.process(text_update(USER, "30")).await;
    assert_eq!(h.messenger.last_text(), render::WEIGHT_PROMPT);
    h.process(text_update(USER, "80,5")).await;
    assert_eq!(h.messenger.last_text(), render::HEIGHT_PROMPT);
    h.process(text_update(USER, "180")).await;
    assert_eq!(state(&h), DialogState::AwaitingActivity);

    let activity_prompt = h.messenger.last_with_keyboard();
    h.process(callback_update(USER, Some(&activity_prompt), "activity_1.55")).await;
    assert_eq!(state(&h), DialogState::AwaitingGoal);

    let goal_prompt = h.messenger.last_with_keyboard();
    h.process(callback_update(USER, Some(&goal_prompt), "goal_maintenance")).await;
    assert_eq!(state(&h), DialogState::Idle);
    assert!(h.messenger.last_text().starts_with("✅ Profile saved."));

    let user = h.store.find_user(USER).await.unwrap().expect("user exists");
    let profile = user.profile().expect("profile stored");
    assert_eq!(profile.gender, Gender::Male);
    assert_eq!(profile.age, 30);
    assert_eq!(profile.weight, 80.5);
    assert_eq!(profile.height, 180.0);
    assert_eq!(profile.activity, ActivityLevel::Moderate);
    assert_eq!(profile.goal, Goal::Maintenance);
    assert_eq!(user.norms(), Some(calculate_daily_norms(&profile)));
}

#[tokio::test]
async fn invalid_answer_reprompts_without_advancing() {
    let h = Harness::new();
    h.process(text_update(USER, "/setup")).await;
    h.process(callback_update(USER, None, "setup_profile")).await;
    h.process(callback_update(USER, None, "gender_female")).await;

    h.process(text_update(USER, "abc")).await;
    let reply = h.messenger.last_text();
    assert!(reply.contains("Age: please enter a number"), "{reply}");
    assert!(reply.ends_with(render::AGE_PROMPT));
    assert_eq!(state(&h), DialogState::AwaitingAge);

    h.process(text_update(USER, "7")).await;
    assert!(h.messenger.last_text().contains("Age must be between 12 and 100"));
    assert_eq!(state(&h), DialogState::AwaitingAge);

    h.process(text_update(USER, "25")).await;
    assert_eq!(state(&h), DialogState::AwaitingWeight);
}

#[tokio::test]
async fn stale_buttons_and_text_for_button_steps_are_refused() {
    let h = Harness::new();

    h.process(callback_update(USER, None, "goal_weight_loss")).await;
    assert_eq!(
        h.messenger.callback_answers().last().cloned().flatten().as_deref(),
        Some(render::START_SETUP_AGAIN)
    );
    assert_eq!(state(&h), DialogState::Idle);

    h.process(callback_update(USER, None, "setup_profile")).await;
    h.process(text_update(USER, "male")).await;
    assert_eq!(h.messenger.last_text(), render::CHOOSE_WITH_BUTTONS);
    assert_eq!(state(&h), DialogState::AwaitingGender);
}

#[tokio::test]
async fn cancel_and_other_commands_abandon_the_wizard() {
    let h = Harness::new();
    h.process(callback_update(USER, None, "setup_profile")).await;
    h.process(text_update(USER, "/cancel")).await;
    assert_eq!(h.messenger.last_text(), render::CANCELLED);
    assert_eq!(state(&h), DialogState::Idle);

    h.process(text_update(USER, "отмена")).await;
    assert_eq!(h.messenger.last_text(), render::NOTHING_TO_CANCEL);

    h.process(callback_update(USER, None, "setup_profile")).await;
    h.process(callback_update(USER, None, "gender_male")).await;
    h.process(text_update(USER, "/help")).await;
    assert_eq!(h.messenger.last_text(), render::HELP);
    assert_eq!(state(&h), DialogState::Idle);
    assert!(h.store.find_user(USER).await.unwrap().and_then(|u| u.profile()).is_none());
}

#[tokio::test]
async fn setup_overview_shows_saved_profile() {
    let h = Harness::new();
    h.process(callback_update(USER, None, "setup_profile")).await;
    h.process(callback_update(USER, None, "gender_female")).await;
    for answer in ["28", "60", "165"] {
        h.process(text_update(USER, answer)).await;
    }
    h.process(callback_update(USER, None, "activity_1.2")).await;
    h.process(callback_update(USER, None, "goal_weight_loss")).await;

    h.process(text_update(USER, "/setup")).await;
    let overview = h.messenger.last_with_keyboard();
    assert!(overview.text.contains("Gender: female"));
    assert!(overview.text.contains("Age: 28"));
    assert!(overview.text.contains("Goal: Weight loss"));
    assert!(overview.text.contains("Daily norms:"));
    assert_eq!(
        overview.keyboard.unwrap().callback_data(),
        vec!["setup_profile", "setup_manual_norms"]
    );
}
