use snapeat_backend::{bot::render, services::dialog::DialogState};

mod support;

use support::{apple, callback_update, nutrition, photo_update, text_update, Harness};

const USER: i64 = 42;

#[tokio::test]
async fn portion_size_rescales_the_cached_result() {
    let h = Harness::new();
    h.recognition.returns(Some(apple()));
    h.process(photo_update(USER, "photo-1")).await;
    let card = h.messenger.last_with_keyboard();

    h.process(callback_update(USER, Some(&card), "specify_portion")).await;
    assert_eq!(h.messenger.last_text(), render::portion_prompt(100.0));

    h.process(text_update(USER, "12.5")).await;
    assert!(h.messenger.last_text().contains("Portion: please enter a number"));
    assert_eq!(
        h.sessions.get(USER, h.now()).dialog_state,
        DialogState::AwaitingPortionSize
    );

    h.process(text_update(USER, "250")).await;
    let scaled = h.messenger.last_with_keyboard();
    assert!(scaled.text.contains("Apple (250 g)"), "{}", scaled.text);
    assert!(scaled.text.contains("237.5 kcal"));
    assert!(scaled.text.contains("| 62.5 g"));
    assert_ne!(scaled.message_id, card.message_id);
    assert_eq!(h.sessions.get(USER, h.now()).dialog_state, DialogState::Idle);

    h.process(callback_update(USER, Some(&scaled), "add_stats_42")).await;
    let rows = h.store.analyses_of(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].calories, 237.5);
    assert_eq!(rows[0].portion_weight, Some(250.0));
}

#[tokio::test]
async fn portion_falls_back_to_the_pressed_message_text() {
    let h = Harness::new();
    h.recognition.returns(Some(apple()));
    h.process(photo_update(USER, "photo-1")).await;
    let card = h.messenger.last_with_keyboard();

    assert!(h.sessions.delete(USER));
    h.process(callback_update(USER, Some(&card), "specify_portion")).await;
    assert_eq!(h.messenger.last_text(), render::portion_prompt(100.0));

    h.process(text_update(USER, "200")).await;
    let scaled = h.messenger.last_with_keyboard();
    assert!(scaled.text.contains("Apple (200 g)"));
    assert!(scaled.text.contains("190 kcal"));
}

#[tokio::test]
async fn portion_without_any_result_asks_for_a_new_photo() {
    let h = Harness::new();
    h.process(callback_update(USER, None, "specify_portion")).await;
    assert_eq!(h.messenger.last_text(), render::RESUBMIT_PHOTO);
    assert_eq!(h.sessions.get(USER, h.now()).dialog_state, DialogState::Idle);
}

#[tokio::test]
async fn dish_name_overwrites_the_latest_entry() {
    let h = Harness::new();
    h.recognition.returns(Some(apple()));
    h.process(photo_update(USER, "photo-1")).await;
    let card = h.messenger.last_with_keyboard();
    h.process(callback_update(USER, Some(&card), "add_stats_42")).await;

    h.process(callback_update(USER, Some(&card), "specify_food")).await;
    assert_eq!(h.messenger.last_text(), render::FOOD_NAME_PROMPT);
    assert_eq!(
        h.sessions.get(USER, h.now()).dialog_state,
        DialogState::AwaitingFoodName
    );

    h.lookup
        .returns(Some(nutrition("Banana", 105.0, 1.3, 0.4, 27.0, 118.0)));
    h.process(text_update(USER, "banana")).await;
    assert_eq!(h.lookup.queries.lock().unwrap().as_slice(), ["banana"]);

    let updated = h.messenger.last_with_keyboard();
    assert!(updated.text.contains("Banana (118 g)"));
    assert!(updated.text.ends_with(render::ENTRY_UPDATED));
    assert_eq!(
        updated.keyboard.unwrap().callback_data(),
        vec!["specify_food", "specify_portion", "subscribe"]
    );

    let rows = h.store.analyses_of(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].food_name, "Banana");
    assert_eq!(rows[0].calories, 105.0);
    assert_eq!(rows[0].portion_weight, Some(118.0));
    assert_eq!(h.sessions.get(USER, h.now()).dialog_state, DialogState::Idle);
}

#[tokio::test]
async fn dish_name_without_entries_offers_a_fresh_result() {
    let h = Harness::new();
    h.process(callback_update(USER, None, "specify_food")).await;
    h.lookup
        .returns(Some(nutrition("Pancakes", 227.0, 6.4, 9.7, 28.3, 100.0)));
    h.process(text_update(USER, "pancakes")).await;

    let card = h.messenger.last_with_keyboard();
    assert!(!card.text.contains(render::ENTRY_UPDATED));
    assert_eq!(
        card.keyboard.as_ref().unwrap().callback_data()[0],
        "add_stats_42"
    );
    h.process(callback_update(USER, Some(&card), "add_stats_42")).await;
    assert_eq!(h.store.analyses_of(USER)[0].food_name, "Pancakes");
}

#[tokio::test]
async fn unknown_dish_name_ends_the_prompt() {
    let h = Harness::new();
    h.process(callback_update(USER, None, "specify_food")).await;
    h.process(text_update(USER, "zzzz")).await;

    assert_eq!(h.messenger.last_text(), render::NOT_FOUND_BY_NAME);
    assert_eq!(h.sessions.get(USER, h.now()).dialog_state, DialogState::Idle);
    assert!(h.store.analyses_of(USER).is_empty());
}

#[tokio::test]
async fn shrinking_and_restoring_the_portion_recovers_the_original_values() {
    let h = Harness::new();
    h.recognition.returns(Some(apple()));
    h.process(photo_update(USER, "photo-1")).await;
    let card = h.messenger.last_with_keyboard();

    h.process(callback_update(USER, Some(&card), "specify_portion")).await;
    h.process(text_update(USER, "3")).await;
    let tiny = h.messenger.last_with_keyboard();
    assert!(tiny.text.contains("Apple (3 g)"), "{}", tiny.text);

    h.process(callback_update(USER, Some(&tiny), "specify_portion")).await;
    assert_eq!(h.messenger.last_text(), render::portion_prompt(3.0));
    h.process(text_update(USER, "100")).await;
    let restored = h.messenger.last_with_keyboard();
    assert!(restored.text.contains("Apple (100 g)"), "{}", restored.text);
    assert!(restored.text.contains("95 kcal"), "{}", restored.text);
    assert!(restored.text.contains("| 25 g"), "{}", restored.text);

    h.process(callback_update(USER, Some(&restored), "add_stats_42")).await;
    let rows = h.store.analyses_of(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].calories, 95.0);
    assert_eq!(rows[0].carbs, 25.0);
}
