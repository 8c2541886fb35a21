pub mod aggregate;
pub mod chart;
pub mod config;
pub mod db;
pub mod errors;
pub mod kv;
pub mod models;
pub mod notifications;
pub mod reminders;
pub mod session;
pub mod settings;
pub mod store;
pub mod submission;
pub mod tracker;
pub mod trend;

use crate::config::{AppConfig, NotificationMode};
use crate::db::Database;
use crate::errors::AppResult;
use crate::kv::{FileKeyValueStore, KeyValueStore};
use crate::notifications::{
    DeliveredNotification, Dispatcher, LocalNotificationCenter, NotificationBackend, UnavailableNotifications,
};
use crate::reminders::{ReminderController, ReminderScheduler};
use crate::session::SessionManager;
use crate::store::{LocalCache, TieredStore};
use crate::tracker::TrackerCore;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Everything the application wires together at startup.
pub struct App {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub tracker: TrackerCore,
    pub reminders: ReminderController<NotificationBackend>,
}

impl App {
    pub fn open(config: AppConfig) -> AppResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db = Arc::new(Database::new(&config.database_path())?);
        let local_storage: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(&config.local_storage_path())?);

        let store = TieredStore::new(db.clone(), LocalCache::new(local_storage.clone()));
        let tracker = TrackerCore::new(store, SessionManager::new());

        let backend = match config.notifications {
            NotificationMode::Native => NotificationBackend::Native(Arc::new(LocalNotificationCenter::new(
                db.clone(),
                config.permission_answer,
            ))),
            NotificationMode::Off => NotificationBackend::Unavailable(UnavailableNotifications),
        };
        let reminders = ReminderController::new(ReminderScheduler::new(backend), local_storage);

        Ok(Self {
            config,
            db,
            tracker,
            reminders,
        })
    }
}

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    init_tracing(&config.log_dir()).map_err(anyhow::Error::msg)?;

    let app = App::open(config).context("failed to open application state")?;
    tracing::info!(db = %app.db.path().display(), "bodytrack started");

    let session = app.tracker.sessions().sign_in(&app.config.user_id).await?;
    match app.tracker.dashboard(&session.token, None).await {
        Ok(dashboard) => {
            if let Some(notice) = &dashboard.notice {
                tracing::warn!(notice = %notice, "running in degraded mode");
            }
            for card in &dashboard.cards {
                tracing::info!(
                    kind = %card.kind,
                    value = card.value,
                    unit = card.unit.as_str(),
                    change = ?card.change_label,
                    "latest measurement"
                );
            }
            tracing::info!(entries = dashboard.entry_count, kinds = dashboard.available_kinds.len(), "dashboard loaded");
        }
        Err(error) => tracing::warn!(error = %error, "failed to load dashboard"),
    }

    let settings = app.reminders.load_settings()?;
    tracing::info!(enabled = settings.enabled, time = %settings.time, "reminder settings");

    let (sender, mut receiver) = mpsc::channel::<DeliveredNotification>(64);
    let dispatcher = app
        .reminders
        .scheduler()
        .port()
        .native_center()
        .map(|center| Dispatcher::new(center, sender.clone()).start());

    loop {
        tokio::select! {
            delivered = receiver.recv() => {
                let Some(delivered) = delivered else {
                    break;
                };
                tracing::info!(
                    id = delivered.notification.id,
                    title = %delivered.notification.title,
                    route = ?delivered.route,
                    "reminder delivered"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    tracing::warn!(error = %error, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    if let Some(handle) = dispatcher {
        handle.abort();
    }
    app.tracker.sessions().sign_out(&session.token).await;
    tracing::info!("bodytrack stopped");
    Ok(())
}

fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "bodytrack.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
