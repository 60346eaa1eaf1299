//! Candidate (advertisement unit) model: creative, targeting, placement
//! assignments, schedule, budget and live performance.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CandidateId = Uuid;

/// Lowest and highest priority a placement assignment may declare.
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl CandidateStatus {
    /// Completed and archived candidates never return to selection.
    pub fn is_terminal(self) -> bool {
        matches!(self, CandidateStatus::Completed | CandidateStatus::Archived)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Creative {
    pub headline: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub call_to_action: Option<String>,
}

/// Campaign tracking parameters appended to the destination link.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackingParams {
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
}

impl TrackingParams {
    fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("utm_source", self.utm_source.as_deref()),
            ("utm_medium", self.utm_medium.as_deref()),
            ("utm_campaign", self.utm_campaign.as_deref()),
            ("utm_term", self.utm_term.as_deref()),
            ("utm_content", self.utm_content.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.filter(|s| !s.is_empty()).map(|v| (k, v)))
    }

    /// Append the parameters to `link`. Links that do not parse as absolute
    /// URLs are returned unchanged.
    pub fn apply(&self, link: &str) -> String {
        let mut url = match url::Url::parse(link) {
            Ok(u) => u,
            Err(_) => return link.to_string(),
        };
        let pairs: Vec<_> = self.pairs().collect();
        if pairs.is_empty() {
            return link.to_string();
        }
        url.query_pairs_mut().extend_pairs(pairs);
        url.to_string()
    }
}

/// Inclusive time-of-day window as zero-padded `HH:MM` strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    /// Whether `hhmm` falls inside the window. A window whose start is after
    /// its end wraps past midnight.
    pub fn contains(&self, hhmm: &str) -> bool {
        if self.start <= self.end {
            hhmm >= self.start.as_str() && hhmm <= self.end.as_str()
        } else {
            hhmm >= self.start.as_str() || hhmm <= self.end.as_str()
        }
    }
}

/// `true` for a zero-padded 24h `HH:MM` string.
pub fn is_valid_hhmm(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = |a: u8, b: u8| -> Option<u32> {
        if a.is_ascii_digit() && b.is_ascii_digit() {
            Some(u32::from(a - b'0') * 10 + u32::from(b - b'0'))
        } else {
            None
        }
    };
    matches!(
        (digits(bytes[0], bytes[1]), digits(bytes[3], bytes[4])),
        (Some(h), Some(m)) if h < 24 && m < 60
    )
}

/// Targeting dimensions. An empty set (or `None` window) leaves that
/// dimension unrestricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TargetingRules {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    #[serde(default)]
    pub device_types: Vec<DeviceType>,
    #[serde(default)]
    pub user_roles: Vec<String>,
    #[serde(default)]
    pub geo_countries: Vec<String>,
    /// Day numbers, `0 = Sunday` through `6 = Saturday`.
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub time_of_day: Option<TimeWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementAssignment {
    pub position: String,
    pub priority: u8,
    #[serde(default)]
    pub frequency_cap: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && self.end.is_none_or(|end| now <= end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Impressions,
    Clicks,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    #[serde(default)]
    pub kind: BudgetKind,
    #[serde(default)]
    pub max_impressions: Option<u64>,
    #[serde(default)]
    pub max_clicks: Option<u64>,
    /// Reserved. Stored for the admin surface, never enforced.
    #[serde(default)]
    pub daily_budget: Option<f64>,
    /// Reserved. Stored for the admin surface, never enforced.
    #[serde(default)]
    pub total_budget: Option<f64>,
}

/// Lifetime counters. `ctr` is always derived from `clicks` and
/// `impressions` by [`Performance::from_counters`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Performance {
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub conversions: u64,
    pub revenue: f64,
    #[serde(default)]
    pub last_impression_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_click_at: Option<DateTime<Utc>>,
}

impl Performance {
    pub fn from_counters(
        impressions: u64,
        clicks: u64,
        conversions: u64,
        revenue: f64,
        last_impression_at: Option<DateTime<Utc>>,
        last_click_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            impressions,
            clicks,
            ctr: click_through_rate(clicks, impressions),
            conversions,
            revenue,
            last_impression_at,
            last_click_at,
        }
    }
}

/// Click-through rate as a percentage, `0` when there are no impressions.
pub fn click_through_rate(clicks: u64, impressions: u64) -> f64 {
    if impressions > 0 {
        clicks as f64 / impressions as f64 * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    /// Admin-only notes. Never leaves the engine.
    #[serde(default)]
    pub internal_notes: Option<String>,
    pub creative: Creative,
    pub link_url: String,
    #[serde(default)]
    pub tracking: Option<TrackingParams>,
    #[serde(default)]
    pub open_in_new_tab: bool,
    #[serde(default)]
    pub targeting: TargetingRules,
    pub placements: Vec<PlacementAssignment>,
    pub schedule: Schedule,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub status: CandidateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    /// The placement assignment for `position`, if this candidate declares one.
    pub fn assignment_for(&self, position: &str) -> Option<&PlacementAssignment> {
        self.placements.iter().find(|p| p.position == position)
    }

    pub fn priority_for(&self, position: &str, default_priority: u8) -> u8 {
        self.assignment_for(position)
            .map(|p| p.priority)
            .unwrap_or(default_priority)
    }

    /// Creation-time validation performed by the store on every write.
    pub fn validate(&self) -> EngineResult<()> {
        if self.link_url.trim().is_empty() {
            return Err(invalid(self.id, "link_url must not be empty"));
        }
        if self.placements.is_empty() {
            return Err(invalid(self.id, "at least one placement assignment is required"));
        }
        for p in &self.placements {
            if p.position.trim().is_empty() {
                return Err(invalid(self.id, "placement position must not be empty"));
            }
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&p.priority) {
                return Err(invalid(
                    self.id,
                    &format!("priority {} for '{}' outside 1..=10", p.priority, p.position),
                ));
            }
            if p.frequency_cap == Some(0) {
                return Err(invalid(
                    self.id,
                    &format!("frequency cap for '{}' must be at least 1", p.position),
                ));
            }
        }
        if let Some(end) = self.schedule.end {
            if end < self.schedule.start {
                return Err(invalid(self.id, "schedule end precedes start"));
            }
        }
        if let Some(window) = &self.targeting.time_of_day {
            if !is_valid_hhmm(&window.start) || !is_valid_hhmm(&window.end) {
                return Err(invalid(self.id, "time_of_day bounds must be HH:MM"));
            }
        }
        if self.targeting.days_of_week.iter().any(|d| *d > 6) {
            return Err(invalid(self.id, "days_of_week entries must be 0..=6"));
        }
        Ok(())
    }
}

fn invalid(id: CandidateId, msg: &str) -> EngineError {
    EngineError::Validation(format!("candidate {id}: {msg}"))
}

/// The caller-safe projection of a selected candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServedAd {
    pub id: CandidateId,
    pub position: String,
    pub creative: Creative,
    /// Destination link with tracking parameters applied.
    pub link_url: String,
    pub open_in_new_tab: bool,
}

impl ServedAd {
    pub fn from_candidate(candidate: &Candidate, position: &str) -> Self {
        let link_url = match &candidate.tracking {
            Some(t) => t.apply(&candidate.link_url),
            None => candidate.link_url.clone(),
        };
        Self {
            id: candidate.id,
            position: position.to_string(),
            creative: candidate.creative.clone(),
            link_url,
            open_in_new_tab: candidate.open_in_new_tab,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_candidate() -> Candidate {
        let now = Utc::now();
        Candidate {
            id: Uuid::new_v4(),
            name: "Spring banner".into(),
            internal_notes: Some("renegotiate in May".into()),
            creative: Creative {
                headline: "Spring sale".into(),
                ..Default::default()
            },
            link_url: "https://shop.example.com/spring".into(),
            tracking: None,
            open_in_new_tab: true,
            targeting: TargetingRules::default(),
            placements: vec![PlacementAssignment {
                position: "sidebar".into(),
                priority: 7,
                frequency_cap: Some(3),
            }],
            schedule: Schedule {
                start: now - Duration::days(1),
                end: Some(now + Duration::days(1)),
            },
            budget: Budget::default(),
            performance: Performance::default(),
            status: CandidateStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ctr_zero_without_impressions() {
        assert_eq!(click_through_rate(0, 0), 0.0);
        assert_eq!(click_through_rate(5, 0), 0.0);
        assert!((click_through_rate(1, 4) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_performance_derives_ctr() {
        let perf = Performance::from_counters(200, 10, 1, 4.5, None, None);
        assert!((perf.ctr - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(make_candidate().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_priority() {
        let mut c = make_candidate();
        c.placements[0].priority = 0;
        assert!(matches!(c.validate(), Err(EngineError::Validation(_))));
        c.placements[0].priority = 11;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_placements_and_bad_window() {
        let mut c = make_candidate();
        c.placements.clear();
        assert!(c.validate().is_err());

        let mut c = make_candidate();
        c.targeting.time_of_day = Some(TimeWindow {
            start: "9:00".into(),
            end: "17:00".into(),
        });
        assert!(c.validate().is_err());

        let mut c = make_candidate();
        c.schedule.end = Some(c.schedule.start - Duration::hours(1));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let day = TimeWindow {
            start: "09:00".into(),
            end: "17:30".into(),
        };
        assert!(day.contains("09:00"));
        assert!(day.contains("17:30"));
        assert!(!day.contains("17:31"));

        let night = TimeWindow {
            start: "22:00".into(),
            end: "02:00".into(),
        };
        assert!(night.contains("23:15"));
        assert!(night.contains("01:59"));
        assert!(!night.contains("12:00"));
    }

    #[test]
    fn test_hhmm_validation() {
        assert!(is_valid_hhmm("00:00"));
        assert!(is_valid_hhmm("23:59"));
        assert!(!is_valid_hhmm("24:00"));
        assert!(!is_valid_hhmm("12:60"));
        assert!(!is_valid_hhmm("1200"));
    }

    #[test]
    fn test_served_ad_hides_internal_fields_and_applies_tracking() {
        let mut c = make_candidate();
        c.tracking = Some(TrackingParams {
            utm_source: Some("blog".into()),
            utm_campaign: Some("spring".into()),
            ..Default::default()
        });
        let served = ServedAd::from_candidate(&c, "sidebar");
        assert_eq!(served.id, c.id);
        assert!(served.link_url.contains("utm_source=blog"));
        assert!(served.link_url.contains("utm_campaign=spring"));

        let json = serde_json::to_string(&served).unwrap();
        assert!(!json.contains("renegotiate"));
        assert!(!json.contains("frequency_cap"));
    }

    #[test]
    fn test_priority_defaults_when_unassigned() {
        let c = make_candidate();
        assert_eq!(c.priority_for("sidebar", 5), 7);
        assert_eq!(c.priority_for("footer", 5), 5);
    }
}
