//! Per-day, per-candidate time series with structured and CSV renderings.

use adserve_core::events::{AdEvent, DateRange, EventType};
use adserve_core::types::{click_through_rate, CandidateId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub range: DateRange,
    #[serde(default)]
    pub candidate_ids: Vec<CandidateId>,
    #[serde(default)]
    pub placements: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Structured,
    /// Flat CSV export.
    Tabular,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub candidate_id: CandidateId,
    pub candidate_name: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub ctr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum ReportOutput {
    Structured(Vec<ReportRow>),
    Tabular(String),
}

pub const CSV_COLUMNS: [&str; 7] = [
    "date",
    "candidate_id",
    "candidate_name",
    "impressions",
    "clicks",
    "conversions",
    "ctr",
];

#[derive(Default)]
struct DayTally {
    impressions: u64,
    clicks: u64,
    conversions: u64,
}

/// Bucket events by UTC day and candidate. Rows come out ordered by date,
/// then candidate id. `name_of` supplies display names for known candidates.
pub fn build_rows<F>(events: &[AdEvent], name_of: F) -> Vec<ReportRow>
where
    F: Fn(&CandidateId) -> Option<String>,
{
    let mut buckets: BTreeMap<(NaiveDate, CandidateId), DayTally> = BTreeMap::new();
    for e in events {
        let tally = buckets
            .entry((e.timestamp.date_naive(), e.candidate_id))
            .or_default();
        match e.event_type {
            EventType::Impression => tally.impressions += 1,
            EventType::Click => tally.clicks += 1,
            EventType::Conversion => tally.conversions += 1,
            EventType::View => {}
        }
    }

    buckets
        .into_iter()
        .map(|((date, candidate_id), t)| ReportRow {
            date,
            candidate_id,
            candidate_name: name_of(&candidate_id),
            impressions: t.impressions,
            clicks: t.clicks,
            conversions: t.conversions,
            ctr: click_through_rate(t.clicks, t.impressions),
        })
        .collect()
}

pub fn export_csv(rows: &[ReportRow]) -> String {
    let mut csv = CSV_COLUMNS.join(",");
    csv.push('\n');
    for row in rows {
        let cells = [
            row.date.format("%Y-%m-%d").to_string(),
            row.candidate_id.to_string(),
            row.candidate_name
                .as_deref()
                .map(quote)
                .unwrap_or_default(),
            row.impressions.to_string(),
            row.clicks.to_string(),
            row.conversions.to_string(),
            format!("{:.2}", row.ctr),
        ];
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn render(rows: Vec<ReportRow>, format: ReportFormat) -> ReportOutput {
    match format {
        ReportFormat::Structured => ReportOutput::Structured(rows),
        ReportFormat::Tabular => ReportOutput::Tabular(export_csv(&rows)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::events::EventContext;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn event(id: CandidateId, t: EventType, day: u32, hour: u32) -> AdEvent {
        AdEvent::new(
            id,
            t,
            EventContext {
                placement: "header".into(),
                occurred_at: Some(Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()),
                ..Default::default()
            },
            false,
        )
    }

    #[test]
    fn test_rows_bucket_by_day_and_candidate() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let events = vec![
            event(b, EventType::Impression, 2, 9),
            event(a, EventType::Impression, 1, 8),
            event(a, EventType::Impression, 1, 23),
            event(a, EventType::Click, 1, 23),
            event(a, EventType::View, 1, 23),
            event(a, EventType::Conversion, 2, 0),
        ];
        let rows = build_rows(&events, |_| None);
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(rows[0].candidate_id, a);
        assert_eq!((rows[0].impressions, rows[0].clicks), (2, 1));
        assert!((rows[0].ctr - 50.0).abs() < 1e-9);

        assert_eq!(rows[1].candidate_id, a);
        assert_eq!(rows[1].conversions, 1);
        assert_eq!(rows[1].ctr, 0.0);
        assert_eq!(rows[2].candidate_id, b);
    }

    #[test]
    fn test_csv_export_quotes_names() {
        let a = Uuid::from_u128(1);
        let events = vec![event(a, EventType::Impression, 3, 12)];
        let rows = build_rows(&events, |_| Some("Spring \"Sale\"".to_string()));
        let csv = export_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("date,candidate_id,candidate_name,impressions,clicks,conversions,ctr"));
        let line = lines.next().unwrap();
        assert!(line.starts_with("2024-05-03,"));
        assert!(line.contains("\"Spring \"\"Sale\"\"\""));
        assert!(line.ends_with(",1,0,0,0.00"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_input_renders_header_only() {
        let rows = build_rows(&[], |_| None);
        assert!(rows.is_empty());
        match render(rows, ReportFormat::Tabular) {
            ReportOutput::Tabular(csv) => assert_eq!(csv.lines().count(), 1),
            other => panic!("unexpected output {other:?}"),
        }
    }
}
