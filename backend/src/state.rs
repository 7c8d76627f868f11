use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::Config, repositories::NutritionStore, services::session_store::SessionStore,
    telegram::Update,
};

#[derive(Clone)]
pub struct AppState {
    /// Inbound queue consumed by the dispatcher.
    pub update_tx: mpsc::Sender<Update>,
    pub store: Arc<dyn NutritionStore>,
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        update_tx: mpsc::Sender<Update>,
        store: Arc<dyn NutritionStore>,
        sessions: SessionStore,
        config: Arc<Config>,
    ) -> Self {
        Self {
            update_tx,
            store,
            sessions,
            config,
        }
    }
}
