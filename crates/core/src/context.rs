//! Slot-fill request context.

use crate::types::DeviceType;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Everything the caller knows about the page view asking for an ad.
/// Missing fields never fail a request; they simply match nothing on the
/// corresponding targeting dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionContext {
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub user_role: Option<String>,
    /// ISO 3166 country code.
    #[serde(default)]
    pub geo_country: Option<String>,
    /// Evaluation instant; the engine uses the current time when unset.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl SelectionContext {
    pub fn at(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// Day number with `0 = Sunday`.
pub fn day_number(ts: DateTime<Utc>) -> u8 {
    ts.weekday().num_days_from_sunday() as u8
}

/// Zero-padded `HH:MM` for time-of-day comparison.
pub fn hhmm(ts: DateTime<Utc>) -> String {
    format!("{:02}:{:02}", ts.hour(), ts.minute())
}
