//! Analytics events recorded against candidates.

use crate::types::{CandidateId, DeviceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Conversion,
    View,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Impression,
        EventType::Click,
        EventType::Conversion,
        EventType::View,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Impression => "impression",
            EventType::Click => "click",
            EventType::Conversion => "conversion",
            EventType::View => "view",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(EventType::Impression),
            "click" => Ok(EventType::Click),
            "conversion" => Ok(EventType::Conversion),
            "view" => Ok(EventType::View),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngagementMetrics {
    #[serde(default)]
    pub time_on_screen_ms: Option<u64>,
    #[serde(default)]
    pub scroll_depth: Option<f64>,
    #[serde(default)]
    pub viewport_percentage: Option<f64>,
}

/// Immutable event row. `is_unique` is fixed at write time and is
/// approximate: two concurrent first events for the same session may both
/// be marked unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdEvent {
    pub id: Uuid,
    pub candidate_id: CandidateId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub placement: String,
    pub page_id: Option<String>,
    pub session_id: Option<String>,
    pub is_unique: bool,
    pub device_type: Option<DeviceType>,
    pub engagement: Option<EngagementMetrics>,
    pub conversion_value: Option<f64>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub geo_country: Option<String>,
}

/// Caller-supplied context for an event, as received from the rendering
/// surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    pub placement: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub engagement: Option<EngagementMetrics>,
    #[serde(default)]
    pub conversion_value: Option<f64>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub geo_country: Option<String>,
    /// Event time; defaults to the moment the event is written. Times in the
    /// future are clamped to the write time.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl AdEvent {
    pub fn new(
        candidate_id: CandidateId,
        event_type: EventType,
        ctx: EventContext,
        is_unique: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            event_type,
            timestamp: ctx.occurred_at.map_or(now, |at| at.min(now)),
            placement: ctx.placement,
            page_id: ctx.page_id,
            session_id: ctx.session_id,
            is_unique,
            device_type: ctx.device_type,
            engagement: ctx.engagement,
            conversion_value: ctx.conversion_value,
            referrer: ctx.referrer,
            user_agent: ctx.user_agent,
            geo_country: ctx.geo_country,
        }
    }
}

/// Downstream consumer of written events (e.g. a warehouse exporter).
/// `submit` must not block.
pub trait EventSink: Send + Sync {
    fn submit(&self, event: &AdEvent);
}

/// Half-open `[from, to)` time range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| ts >= f) && self.to.is_none_or(|t| ts < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_event_type_parse() {
        assert_eq!("click".parse::<EventType>(), Ok(EventType::Click));
        assert!("bounce".parse::<EventType>().is_err());
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>(), Ok(t));
        }
    }

    #[test]
    fn test_date_range_is_half_open() {
        let now = Utc::now();
        let range = DateRange::between(now - Duration::hours(1), now);
        assert!(range.contains(now - Duration::hours(1)));
        assert!(range.contains(now - Duration::minutes(1)));
        assert!(!range.contains(now));
        assert!(DateRange::default().contains(now));
    }

    #[test]
    fn test_event_defaults_timestamp() {
        let before = Utc::now();
        let event = AdEvent::new(
            Uuid::new_v4(),
            EventType::View,
            EventContext {
                placement: "footer".into(),
                ..Default::default()
            },
            true,
        );
        assert!(event.timestamp >= before);
        assert_eq!(event.placement, "footer");
    }

    #[test]
    fn test_future_event_time_is_clamped() {
        let event = AdEvent::new(
            Uuid::new_v4(),
            EventType::Click,
            EventContext {
                occurred_at: Some(Utc::now() + Duration::days(365 * 75)),
                ..Default::default()
            },
            false,
        );
        assert!(event.timestamp <= Utc::now());

        let past = Utc::now() - Duration::days(3);
        let event = AdEvent::new(
            Uuid::new_v4(),
            EventType::Click,
            EventContext {
                occurred_at: Some(past),
                ..Default::default()
            },
            false,
        );
        assert_eq!(event.timestamp, past);
    }
}
