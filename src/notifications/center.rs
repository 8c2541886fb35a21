use super::NotificationPort;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::kv::KeyValueStore;
use crate::models::{NotificationRequest, PermissionState};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Notify;

pub const PERMISSION_KEY: &str = "notification-permission";

/// In-process notification platform. Pending notifications live in the
/// database so they survive restarts; the dispatcher delivers them.
pub struct LocalNotificationCenter {
    db: Arc<Database>,
    prompt_answer: PermissionState,
    changed: Arc<Notify>,
}

impl LocalNotificationCenter {
    /// `prompt_answer` is what the user answers the first time permission
    /// is requested.
    pub fn new(db: Arc<Database>, prompt_answer: PermissionState) -> Self {
        Self {
            db,
            prompt_answer,
            changed: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn changed(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    pub fn next_fire_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.db.next_notification_at()?)
    }

    pub fn take_due(&self, now: DateTime<Utc>) -> AppResult<Vec<NotificationRequest>> {
        Ok(self.db.take_due_notifications(now)?)
    }

    fn stored_permission(&self) -> AppResult<PermissionState> {
        Ok(self
            .db
            .get(PERMISSION_KEY)?
            .as_deref()
            .and_then(PermissionState::parse)
            .unwrap_or(PermissionState::Prompt))
    }
}

impl NotificationPort for LocalNotificationCenter {
    fn is_available(&self) -> bool {
        true
    }

    async fn check_permission(&self) -> AppResult<PermissionState> {
        self.stored_permission()
    }

    async fn request_permission(&self) -> AppResult<PermissionState> {
        let current = self.stored_permission()?;
        if current != PermissionState::Prompt {
            return Ok(current);
        }
        let answer = match self.prompt_answer {
            PermissionState::Prompt => PermissionState::Denied,
            answer => answer,
        };
        self.db.set(PERMISSION_KEY, answer.as_str())?;
        tracing::info!(permission = answer.as_str(), "notification permission answered");
        Ok(answer)
    }

    async fn pending(&self) -> AppResult<Vec<NotificationRequest>> {
        Ok(self.db.pending_notifications()?)
    }

    async fn schedule(&self, batch: Vec<NotificationRequest>) -> AppResult<()> {
        if self.stored_permission()? != PermissionState::Granted {
            return Err(AppError::PermissionDenied(
                "notification permission has not been granted".to_string(),
            ));
        }
        self.db
            .insert_notifications(&batch)
            .map_err(|error| AppError::Scheduling(error.to_string()))?;
        self.changed.notify_one();
        Ok(())
    }

    async fn cancel(&self, ids: Vec<i32>) -> AppResult<()> {
        let removed = self.db.delete_notifications(&ids)?;
        tracing::debug!(requested = ids.len(), removed, "cancelled pending notifications");
        self.changed.notify_one();
        Ok(())
    }
}
