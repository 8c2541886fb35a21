use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const WEIGHT_KIND: &str = "weight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unit {
    Centimeters,
    Kilograms,
}

impl Unit {
    pub fn for_kind(kind: &str) -> Self {
        if kind == WEIGHT_KIND {
            Self::Kilograms
        } else {
            Self::Centimeters
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Centimeters => "cm",
            Self::Kilograms => "kg",
        }
    }
}

/// One persisted row: a single kind/value pair recorded by one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl MeasurementRecord {
    pub fn new(owner_id: &str, kind: &str, value: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            kind: kind.to_string(),
            value,
            recorded_at,
        }
    }
}

/// All values recorded at one instant. Derived on every load, never stored
/// as such except in the local fallback cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEntry {
    pub id: String,
    #[serde(rename = "date")]
    pub recorded_at: DateTime<Utc>,
    #[serde(rename = "measurements")]
    pub values: BTreeMap<String, f64>,
}

impl MeasurementEntry {
    pub fn new(recorded_at: DateTime<Utc>, values: BTreeMap<String, f64>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recorded_at,
            values,
        }
    }

    pub fn to_records(&self, owner_id: &str) -> Vec<MeasurementRecord> {
        self.values
            .iter()
            .map(|(kind, value)| MeasurementRecord::new(owner_id, kind, *value, self.recorded_at))
            .collect()
    }
}

/// Submission timestamp, truncated so its text form round-trips exactly.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn timestamp_key(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn display_label(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementCard {
    pub kind: String,
    pub label: String,
    pub value: f64,
    pub unit: Unit,
    pub change: Option<f64>,
    pub change_label: Option<String>,
    pub trend: TrendDirection,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub recorded_at: DateTime<Utc>,
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub kind: String,
    pub label: String,
    pub color: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub cards: Vec<MeasurementCard>,
    pub available_kinds: Vec<String>,
    pub series: Vec<ChartSeries>,
    pub entry_count: usize,
    pub degraded: bool,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub entry: MeasurementEntry,
    pub degraded: bool,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationExtra {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub sound: String,
    pub action_type: String,
    pub extra: NotificationExtra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    Prompt,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "prompt" => Some(Self::Prompt),
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}
