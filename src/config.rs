use crate::errors::{AppError, AppResult};
use crate::models::PermissionState;
use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "BODYTRACK_DATA_DIR";
pub const NOTIFICATIONS_ENV: &str = "BODYTRACK_NOTIFICATIONS";
pub const PERMISSION_ENV: &str = "BODYTRACK_NOTIFICATION_PERMISSION";
pub const USER_ENV: &str = "BODYTRACK_USER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMode {
    Native,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub notifications: NotificationMode,
    pub permission_answer: PermissionState,
    pub user_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./bodytrack-data"),
            notifications: NotificationMode::Native,
            permission_answer: PermissionState::Granted,
            user_id: "local-user".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|value| !value.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(mode) = lookup(NOTIFICATIONS_ENV) {
            config.notifications = match mode.trim().to_ascii_lowercase().as_str() {
                "native" | "on" => NotificationMode::Native,
                "off" | "none" => NotificationMode::Off,
                other => {
                    return Err(AppError::Validation(format!(
                        "{NOTIFICATIONS_ENV} must be native or off, got {other:?}"
                    )))
                }
            };
        }

        if let Some(answer) = lookup(PERMISSION_ENV) {
            config.permission_answer = match PermissionState::parse(answer.trim()) {
                Some(PermissionState::Prompt) | None => {
                    return Err(AppError::Validation(format!(
                        "{PERMISSION_ENV} must be granted or denied, got {answer:?}"
                    )))
                }
                Some(state) => state,
            };
        }

        if let Some(user) = lookup(USER_ENV).filter(|value| !value.trim().is_empty()) {
            config.user_id = user.trim().to_string();
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bodytrack.sqlite")
    }

    pub fn local_storage_path(&self) -> PathBuf {
        self.data_dir.join("local-storage.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
