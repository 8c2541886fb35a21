pub mod center;
pub mod dispatcher;

use crate::errors::{AppError, AppResult};
use crate::models::{NotificationRequest, PermissionState};
use std::future::Future;
use std::sync::Arc;

pub use center::LocalNotificationCenter;
pub use dispatcher::{route_for, DeliveredNotification, Dispatcher, NotificationRoute};

/// Local notification platform.
///
/// Implementations decide whether they can show notifications at all; the
/// reminder scheduler only talks to this port.
pub trait NotificationPort: Send + Sync {
    fn is_available(&self) -> bool;

    /// Current permission without prompting.
    fn check_permission(&self) -> impl Future<Output = AppResult<PermissionState>> + Send;

    /// Prompts for permission when the platform supports it.
    fn request_permission(&self) -> impl Future<Output = AppResult<PermissionState>> + Send;

    fn pending(&self) -> impl Future<Output = AppResult<Vec<NotificationRequest>>> + Send;

    /// Submits a batch in one platform call.
    fn schedule(&self, batch: Vec<NotificationRequest>) -> impl Future<Output = AppResult<()>> + Send;

    fn cancel(&self, ids: Vec<i32>) -> impl Future<Output = AppResult<()>> + Send;
}

impl<T: NotificationPort> NotificationPort for Arc<T> {
    fn is_available(&self) -> bool {
        self.as_ref().is_available()
    }

    fn check_permission(&self) -> impl Future<Output = AppResult<PermissionState>> + Send {
        self.as_ref().check_permission()
    }

    fn request_permission(&self) -> impl Future<Output = AppResult<PermissionState>> + Send {
        self.as_ref().request_permission()
    }

    fn pending(&self) -> impl Future<Output = AppResult<Vec<NotificationRequest>>> + Send {
        self.as_ref().pending()
    }

    fn schedule(&self, batch: Vec<NotificationRequest>) -> impl Future<Output = AppResult<()>> + Send {
        self.as_ref().schedule(batch)
    }

    fn cancel(&self, ids: Vec<i32>) -> impl Future<Output = AppResult<()>> + Send {
        self.as_ref().cancel(ids)
    }
}

/// Port for hosts with no notification support. Never prompts, never
/// schedules.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableNotifications;

impl NotificationPort for UnavailableNotifications {
    fn is_available(&self) -> bool {
        false
    }

    async fn check_permission(&self) -> AppResult<PermissionState> {
        Ok(PermissionState::Denied)
    }

    async fn request_permission(&self) -> AppResult<PermissionState> {
        Ok(PermissionState::Denied)
    }

    async fn pending(&self) -> AppResult<Vec<NotificationRequest>> {
        Ok(Vec::new())
    }

    async fn schedule(&self, _batch: Vec<NotificationRequest>) -> AppResult<()> {
        Err(AppError::Scheduling(
            "notifications are not available on this platform".to_string(),
        ))
    }

    async fn cancel(&self, _ids: Vec<i32>) -> AppResult<()> {
        Ok(())
    }
}

/// Notification platform chosen once at startup.
#[derive(Clone)]
pub enum NotificationBackend {
    Native(Arc<LocalNotificationCenter>),
    Unavailable(UnavailableNotifications),
}

impl NotificationBackend {
    pub fn native_center(&self) -> Option<Arc<LocalNotificationCenter>> {
        match self {
            Self::Native(center) => Some(center.clone()),
            Self::Unavailable(_) => None,
        }
    }
}

impl NotificationPort for NotificationBackend {
    fn is_available(&self) -> bool {
        match self {
            Self::Native(center) => center.is_available(),
            Self::Unavailable(port) => port.is_available(),
        }
    }

    async fn check_permission(&self) -> AppResult<PermissionState> {
        match self {
            Self::Native(center) => center.check_permission().await,
            Self::Unavailable(port) => port.check_permission().await,
        }
    }

    async fn request_permission(&self) -> AppResult<PermissionState> {
        match self {
            Self::Native(center) => center.request_permission().await,
            Self::Unavailable(port) => port.request_permission().await,
        }
    }

    async fn pending(&self) -> AppResult<Vec<NotificationRequest>> {
        match self {
            Self::Native(center) => center.pending().await,
            Self::Unavailable(port) => port.pending().await,
        }
    }

    async fn schedule(&self, batch: Vec<NotificationRequest>) -> AppResult<()> {
        match self {
            Self::Native(center) => center.schedule(batch).await,
            Self::Unavailable(port) => port.schedule(batch).await,
        }
    }

    async fn cancel(&self, ids: Vec<i32>) -> AppResult<()> {
        match self {
            Self::Native(center) => center.cancel(ids).await,
            Self::Unavailable(port) => port.cancel(ids).await,
        }
    }
}
