use super::LocalNotificationCenter;
use crate::errors::AppResult;
use crate::models::NotificationRequest;
use crate::reminders::REMINDER_EXTRA_TYPE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const MAX_IDLE: Duration = Duration::from_secs(60 * 60);
const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Screen a tapped notification should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationRoute {
    MeasurementEntry,
    Home,
}

pub fn route_for(notification: &NotificationRequest) -> NotificationRoute {
    if notification.extra.kind == REMINDER_EXTRA_TYPE {
        NotificationRoute::MeasurementEntry
    } else {
        NotificationRoute::Home
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredNotification {
    pub notification: NotificationRequest,
    pub delivered_at: DateTime<Utc>,
    pub route: NotificationRoute,
}

/// Fires due notifications of a [`LocalNotificationCenter`] and publishes
/// them on a channel.
pub struct Dispatcher {
    center: Arc<LocalNotificationCenter>,
    sender: mpsc::Sender<DeliveredNotification>,
}

impl Dispatcher {
    pub fn new(center: Arc<LocalNotificationCenter>, sender: mpsc::Sender<DeliveredNotification>) -> Self {
        Self { center, sender }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let changed = self.center.changed();
        loop {
            let wait = match self.deliver_due(Utc::now()).await {
                Ok(_) => self.next_wait(Utc::now()),
                Err(error) => {
                    tracing::warn!(error = %error, "notification delivery failed");
                    RETRY_DELAY
                }
            };
            if self.sender.is_closed() {
                tracing::debug!("notification receiver dropped; stopping dispatcher");
                break;
            }

            tokio::select! {
                _ = changed.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn next_wait(&self, now: DateTime<Utc>) -> Duration {
        match self.center.next_fire_at() {
            Ok(Some(at)) => {
                let millis = at.signed_duration_since(now).num_milliseconds();
                if millis <= 0 {
                    Duration::from_millis(0)
                } else {
                    Duration::from_millis(millis as u64).min(MAX_IDLE)
                }
            }
            Ok(None) => MAX_IDLE,
            Err(error) => {
                tracing::warn!(error = %error, "failed to read next notification time");
                RETRY_DELAY
            }
        }
    }

    /// Delivers everything due at `now`. Returns how many were delivered.
    pub async fn deliver_due(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let due = self.center.take_due(now)?;
        let count = due.len();
        for notification in due {
            let route = route_for(&notification);
            tracing::info!(
                id = notification.id,
                fire_at = %notification.fire_at,
                route = ?route,
                "delivering notification"
            );
            let delivered = DeliveredNotification {
                notification,
                delivered_at: now,
                route,
            };
            if self.sender.send(delivered).await.is_err() {
                tracing::debug!("notification receiver dropped");
            }
        }
        Ok(count)
    }
}
