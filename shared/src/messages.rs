use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::WeatherReading;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorMessage {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An hour missing from the history and why.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SkippedHourReport {
    pub hour: u8,
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    #[serde(with = "ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
    pub hours: Vec<u8>,
    pub total_points: usize,
    #[serde(default)]
    pub skipped: Vec<SkippedHourReport>,
}

/// Popup payload for a marker. `reading` is absent when the lookup failed.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WeatherReport {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<WeatherReading>,
    pub summary: String,
}
