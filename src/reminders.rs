use crate::errors::AppResult;
use crate::kv::KeyValueStore;
use crate::models::{NotificationExtra, NotificationRequest, PermissionState};
use crate::notifications::NotificationPort;
use crate::settings::{ReminderSettings, ReminderTime};
use chrono::{DateTime, Days, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// First id of the block reserved for daily reminders.
pub const REMINDER_ID_START: i32 = 1000;
/// Size of the reserved block, and the number of days scheduled ahead.
pub const REMINDER_WINDOW: i32 = 30;
pub const REMINDER_EXTRA_TYPE: &str = "weight_reminder";

const REMINDER_TITLE: &str = "Weight Check-in";
const REMINDER_BODY: &str = "Time to record your weight for today! 📊";
const REMINDER_SOUND: &str = "default";
const REMINDER_ACTION: &str = "WEIGHT_REMINDER";

pub fn is_reminder_id(id: i32) -> bool {
    (REMINDER_ID_START..REMINDER_ID_START + REMINDER_WINDOW).contains(&id)
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    // Wall-clock times skipped by a DST jump fire an hour later.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest())
}

/// Keeps at most one rolling window of daily reminders pending.
pub struct ReminderScheduler<P, C = SystemClock> {
    port: P,
    clock: C,
}

impl<P: NotificationPort> ReminderScheduler<P, SystemClock> {
    pub fn new(port: P) -> Self {
        Self::with_clock(port, SystemClock)
    }
}

impl<P: NotificationPort, C: Clock> ReminderScheduler<P, C> {
    pub fn with_clock(port: P, clock: C) -> Self {
        Self { port, clock }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn is_available(&self) -> bool {
        self.port.is_available()
    }

    /// Notifications for today through day 29 at `time`. Today is dropped
    /// when `time` is not strictly in the future.
    pub fn build_batch(&self, time: ReminderTime) -> Vec<NotificationRequest> {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut batch = Vec::with_capacity(REMINDER_WINDOW as usize);

        for offset in 0..REMINDER_WINDOW {
            let Some(day) = today.checked_add_days(Days::new(offset as u64)) else {
                break;
            };
            let Some(fire_at) = resolve_local(day.and_time(time.as_naive_time())) else {
                continue;
            };
            if offset == 0 && fire_at <= now {
                continue;
            }

            batch.push(NotificationRequest {
                id: REMINDER_ID_START + offset,
                title: REMINDER_TITLE.to_string(),
                body: REMINDER_BODY.to_string(),
                fire_at: fire_at.with_timezone(&Utc),
                sound: REMINDER_SOUND.to_string(),
                action_type: REMINDER_ACTION.to_string(),
                extra: NotificationExtra {
                    kind: REMINDER_EXTRA_TYPE.to_string(),
                },
            });
        }
        batch
    }

    /// Replaces any pending reminders with a fresh window at `time`.
    ///
    /// Returns false when the platform is unavailable, permission is not
    /// granted, or the platform rejects the batch.
    pub async fn schedule(&self, time: ReminderTime) -> bool {
        if !self.port.is_available() {
            tracing::debug!("notifications unavailable; not scheduling reminders");
            return false;
        }

        self.cancel().await;

        match self.port.check_permission().await {
            Ok(PermissionState::Granted) => {}
            Ok(state) => {
                tracing::warn!(permission = state.as_str(), "reminder scheduling without permission");
                return false;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to check notification permission");
                return false;
            }
        }

        let batch = self.build_batch(time);
        if batch.is_empty() {
            return false;
        }
        let count = batch.len();
        match self.port.schedule(batch).await {
            Ok(()) => {
                tracing::info!(count, time = %time, "scheduled daily reminders");
                true
            }
            Err(error) => {
                tracing::warn!(count, error = %error, "platform rejected reminder batch");
                false
            }
        }
    }

    /// Cancels pending reminders in the reserved id range. Failures are
    /// logged and swallowed.
    pub async fn cancel(&self) {
        let pending = match self.port.pending().await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!(error = %error, "failed to list pending notifications");
                return;
            }
        };

        let ids = pending
            .iter()
            .map(|notification| notification.id)
            .filter(|id| is_reminder_id(*id))
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return;
        }

        let count = ids.len();
        match self.port.cancel(ids).await {
            Ok(()) => tracing::info!(count, "cleared daily reminders"),
            Err(error) => tracing::warn!(count, error = %error, "failed to clear daily reminders"),
        }
    }

    pub async fn request_permission(&self) -> bool {
        if !self.port.is_available() {
            return false;
        }
        match self.port.request_permission().await {
            Ok(state) => state == PermissionState::Granted,
            Err(error) => {
                tracing::warn!(error = %error, "notification permission request failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum ReminderOutcome {
    Enabled { time: ReminderTime },
    Disabled,
    TimeUpdated { time: ReminderTime, rescheduled: bool },
    PermissionDenied,
    SchedulingFailed,
    Unavailable,
}

impl ReminderOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Enabled { time } => format!("Daily weight reminders set for {time}"),
            Self::Disabled => "Weight reminders have been turned off.".to_string(),
            Self::TimeUpdated { time, .. } => format!("Weight reminders updated to {time}"),
            Self::PermissionDenied => {
                "Please enable notifications in your device settings to receive weight reminders.".to_string()
            }
            Self::SchedulingFailed => "Failed to schedule notifications. Please try again.".to_string(),
            Self::Unavailable => "Notifications are only available on supported devices.".to_string(),
        }
    }
}

/// Settings toggles for reminders. The caller owns the settings record; this
/// type applies a change and persists it.
pub struct ReminderController<P, C = SystemClock> {
    scheduler: ReminderScheduler<P, C>,
    settings_store: Arc<dyn KeyValueStore>,
}

impl<P: NotificationPort, C: Clock> ReminderController<P, C> {
    pub fn new(scheduler: ReminderScheduler<P, C>, settings_store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            scheduler,
            settings_store,
        }
    }

    pub fn scheduler(&self) -> &ReminderScheduler<P, C> {
        &self.scheduler
    }

    pub fn load_settings(&self) -> AppResult<ReminderSettings> {
        ReminderSettings::load(self.settings_store.as_ref())
    }

    pub async fn enable(&self, settings: &mut ReminderSettings) -> AppResult<ReminderOutcome> {
        if !self.scheduler.is_available() {
            return Ok(ReminderOutcome::Unavailable);
        }
        if !self.scheduler.request_permission().await {
            return Ok(ReminderOutcome::PermissionDenied);
        }
        if !self.scheduler.schedule(settings.time).await {
            return Ok(ReminderOutcome::SchedulingFailed);
        }

        settings.enabled = true;
        settings.save(self.settings_store.as_ref())?;
        Ok(ReminderOutcome::Enabled { time: settings.time })
    }

    pub async fn disable(&self, settings: &mut ReminderSettings) -> AppResult<ReminderOutcome> {
        self.scheduler.cancel().await;
        settings.enabled = false;
        settings.save(self.settings_store.as_ref())?;
        Ok(ReminderOutcome::Disabled)
    }

    /// Stores the new time; reschedules only while reminders are enabled.
    /// A failed reschedule leaves nothing pending, so reminders are switched off.
    pub async fn change_time(&self, settings: &mut ReminderSettings, time: ReminderTime) -> AppResult<ReminderOutcome> {
        settings.time = time;
        settings.save(self.settings_store.as_ref())?;

        if !settings.enabled {
            return Ok(ReminderOutcome::TimeUpdated {
                time,
                rescheduled: false,
            });
        }
        if !self.scheduler.schedule(time).await {
            settings.enabled = false;
            settings.save(self.settings_store.as_ref())?;
            tracing::warn!(time = %time, "reschedule failed; reminders turned off");
            return Ok(ReminderOutcome::SchedulingFailed);
        }
        Ok(ReminderOutcome::TimeUpdated {
            time,
            rescheduled: true,
        })
    }
}
