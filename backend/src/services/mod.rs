pub mod background;
pub mod dialog;
pub mod food_card;
pub mod janitor;
pub mod metrics;
pub mod norms;
pub mod notification_cache;
pub mod payments;
pub mod portion;
pub mod quota;
pub mod reconciler;
pub mod session_store;
