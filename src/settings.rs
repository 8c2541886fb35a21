use crate::errors::{AppError, AppResult};
use crate::kv::KeyValueStore;
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENABLED_KEY: &str = "notifications-enabled";
pub const TIME_KEY: &str = "reminder-time";

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):([0-5][0-9])$").expect("valid reminder time regex"));

/// Wall-clock reminder time, `HH:MM` in 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime {
    hour: u32,
    minute: u32,
}

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> AppResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(AppError::Validation(format!("invalid reminder time {hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(self) -> u32 {
        self.hour
    }

    pub fn minute(self) -> u32 {
        self.minute
    }

    pub fn as_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self { hour: 8, minute: 0 }
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let caps = TIME_RE
            .captures(raw.trim())
            .ok_or_else(|| AppError::Validation(format!("reminder time must be HH:MM, got {raw:?}")))?;
        let hour = caps[1]
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid hour in {raw:?}")))?;
        let minute = caps[2]
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid minute in {raw:?}")))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    pub enabled: bool,
    pub time: ReminderTime,
}

impl ReminderSettings {
    /// Missing or unreadable values fall back to disabled at 08:00.
    pub fn load(store: &dyn KeyValueStore) -> AppResult<Self> {
        let enabled = store.get(ENABLED_KEY)?.as_deref() == Some("true");
        let time = match store.get(TIME_KEY)? {
            Some(raw) => raw.parse().unwrap_or_else(|error| {
                tracing::warn!(error = %error, "ignoring stored reminder time");
                ReminderTime::default()
            }),
            None => ReminderTime::default(),
        };
        Ok(Self { enabled, time })
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> AppResult<()> {
        store.set(ENABLED_KEY, if self.enabled { "true" } else { "false" })?;
        store.set(TIME_KEY, &self.time.to_string())?;
        Ok(())
    }
}
