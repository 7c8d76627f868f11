use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snapeat_backend::{
    bot::{dispatcher::Dispatcher, BotService},
    config::{Config, TransportMode},
    db::connection::create_pool,
    handlers,
    recognition::http::HttpRecognitionClient,
    repositories::{InMemoryStore, NutritionStore, PgStore},
    services::{
        background::BackgroundTasks,
        janitor::{JanitorSettings, SessionJanitor},
        metrics::MetricsCollector,
        notification_cache::NotificationDedupeCache,
        reconciler::SubscriptionReconciler,
        session_store::SessionStore,
    },
    state::AppState,
    telegram::{polling::run_polling, Messenger, TelegramClient},
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn NutritionStore>> {
    match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            sqlx::migrate!("./migrations").run(pool.as_ref()).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store (data is lost on restart)");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapeat_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::load()?);
    tracing::info!(
        transport = ?config.transport_mode,
        bind_addr = %config.bind_addr,
        database = config.database_url.is_some(),
        bot_token = %mask_secret(&config.telegram_bot_token),
        payment_token = %mask_secret(&config.payment_provider_token),
        recognition_api_url = %config.recognition_api_url,
        recognition_api_key = %mask_secret(config.recognition_api_key.as_deref().unwrap_or_default()),
        free_requests_limit = config.free_requests_limit,
        admins = config.admin_ids.len(),
        time_zone = %config.time_zone,
        "Loaded configuration from environment/.env"
    );

    let store = open_store(&config).await?;
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("creating {}", config.download_dir.display()))?;

    let client = TelegramClient::new(&config.telegram_api_base, &config.telegram_bot_token)?;
    let messenger: Arc<dyn Messenger> = Arc::new(client.clone());
    let recognition = Arc::new(HttpRecognitionClient::new(
        &config.recognition_api_url,
        config.recognition_api_key.clone(),
        Duration::from_secs(config.recognition_timeout_secs),
    )?);
    let metrics = Arc::new(MetricsCollector::open(&config.metrics_file, Utc::now()));

    let sessions = SessionStore::new();
    let janitor = Arc::new(SessionJanitor::new(
        sessions.clone(),
        messenger.clone(),
        config.admin_ids.clone(),
        JanitorSettings::from_config(&config),
    ));
    let reconciler = Arc::new(SubscriptionReconciler::new(
        store.clone(),
        messenger.clone(),
        Arc::new(NotificationDedupeCache::default()),
    ));
    let bot = Arc::new(BotService::new(
        config.clone(),
        store.clone(),
        sessions.clone(),
        messenger.clone(),
        recognition.clone(),
        recognition,
        metrics.clone(),
        janitor.clone(),
    ));

    let (update_tx, update_rx) = mpsc::channel(config.update_queue_capacity.max(1));
    let dispatcher = Dispatcher::new(
        bot,
        config.worker_concurrency,
        config.update_queue_capacity,
    );
    tokio::spawn(dispatcher.run(update_rx));

    // Background loops
    let background = BackgroundTasks::new();
    background.spawn_periodic(
        "subscription_reconciler",
        Duration::from_secs(config.reconcile_interval_secs),
        move || {
            let reconciler = reconciler.clone();
            async move { reconciler.tick().await }
        },
    );
    background.spawn_periodic(
        "session_janitor",
        Duration::from_secs(config.janitor_interval_secs),
        move || {
            let janitor = janitor.clone();
            async move { janitor.tick().await }
        },
    );
    let flushing = metrics.clone();
    background.spawn_periodic(
        "metrics_flush",
        Duration::from_secs(config.metrics_flush_interval_secs),
        move || {
            let metrics = flushing.clone();
            async move { metrics.flush_logged() }
        },
    );

    // Inbound transport
    match config.transport_mode {
        TransportMode::Polling => {
            tokio::spawn(run_polling(client.clone(), update_tx.clone()));
            tracing::info!("Receiving updates by long polling");
        }
        TransportMode::Webhook => match &config.webhook_url {
            Some(raw) => {
                let webhook_url = url::Url::parse(raw)
                    .with_context(|| format!("Invalid WEBHOOK_URL value: {}", raw))?;
                client
                    .set_webhook(webhook_url.as_str(), config.webhook_secret.as_deref())
                    .await?;
                tracing::info!(url = %webhook_url, "Webhook registered");
            }
            None => tracing::warn!(
                "WEBHOOK_URL is not set, expecting the webhook to be registered externally"
            ),
        },
    }

    let state = AppState::new(update_tx, store, sessions, config.clone());
    let app = handlers::router(state);

    // Start server
    let addr = config.bind_addr;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    background.shutdown().await;
    metrics.flush_logged();
    tracing::info!("Shutdown complete");

    Ok(())
}
