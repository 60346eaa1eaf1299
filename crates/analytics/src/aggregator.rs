//! Read-only grouped queries over the event log. Empty inputs produce
//! zero-valued results, never errors.

use crate::report::{self, ReportFilters, ReportFormat, ReportOutput};
use adserve_core::events::{AdEvent, DateRange, EventType};
use adserve_core::types::{click_through_rate, CandidateId};
use adserve_core::EngineResult;
use adserve_store::{CandidateStore, EventQuery, EventStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Event counts keyed by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub views: u64,
}

impl EventCounts {
    fn add(&mut self, event_type: EventType) {
        match event_type {
            EventType::Impression => self.impressions += 1,
            EventType::Click => self.clicks += 1,
            EventType::Conversion => self.conversions += 1,
            EventType::View => self.views += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub candidate_id: CandidateId,
    pub range: DateRange,
    pub totals: EventCounts,
    pub unique: EventCounts,
    pub revenue: f64,
    pub ctr: f64,
    /// Conversions per click, as a percentage.
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementPerformance {
    pub placement: String,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopMetric {
    #[default]
    Impressions,
    Clicks,
    Ctr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformerRow {
    pub candidate_id: CandidateId,
    pub name: String,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
}

impl PerformerRow {
    fn metric(&self, metric: TopMetric) -> f64 {
        match metric {
            TopMetric::Impressions => self.impressions as f64,
            TopMetric::Clicks => self.clicks as f64,
            TopMetric::Ctr => self.ctr,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Day,
    /// ISO week, e.g. `2024-W09`.
    Week,
    Month,
}

impl GroupBy {
    pub fn bucket(self, ts: DateTime<Utc>) -> String {
        match self {
            GroupBy::Day => ts.format("%Y-%m-%d").to_string(),
            GroupBy::Week => ts.format("%G-W%V").to_string(),
            GroupBy::Month => ts.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBucket {
    pub period: String,
    pub revenue: f64,
    pub conversions: u64,
    pub average_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDrift {
    pub metric: String,
    pub logged: f64,
    pub live: f64,
    /// `live - logged`.
    pub drift: f64,
}

/// Event-log totals next to the candidate's live counters. The log only
/// holds the retention window, so a positive drift on long-running
/// candidates is expected once events start being purged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub candidate_id: CandidateId,
    pub metrics: Vec<MetricDrift>,
    pub consistent: bool,
}

const DRIFT_EPSILON: f64 = 1e-6;

pub struct Aggregator {
    events: Arc<dyn EventStore>,
    candidates: Arc<dyn CandidateStore>,
}

impl Aggregator {
    pub fn new(events: Arc<dyn EventStore>, candidates: Arc<dyn CandidateStore>) -> Self {
        Self { events, candidates }
    }

    pub fn summary(
        &self,
        candidate_id: CandidateId,
        range: Option<DateRange>,
    ) -> EngineResult<CandidateSummary> {
        let range = range.unwrap_or_default();
        let events = self
            .events
            .query(&EventQuery::for_candidate(candidate_id).with_range(range))?;

        let mut totals = EventCounts::default();
        let mut unique = EventCounts::default();
        for e in &events {
            totals.add(e.event_type);
            if e.is_unique {
                unique.add(e.event_type);
            }
        }

        Ok(CandidateSummary {
            candidate_id,
            range,
            totals,
            unique,
            revenue: revenue_of(&events),
            ctr: click_through_rate(totals.clicks, totals.impressions),
            conversion_rate: click_through_rate(totals.conversions, totals.clicks),
        })
    }

    /// Impressions, clicks and CTR per slot position, sorted by position.
    pub fn performance_by_placement(
        &self,
        candidate_id: CandidateId,
        range: Option<DateRange>,
    ) -> EngineResult<Vec<PlacementPerformance>> {
        let query = EventQuery::for_candidate(candidate_id)
            .with_range(range.unwrap_or_default())
            .with_types(&[EventType::Impression, EventType::Click]);
        let events = self.events.query(&query)?;

        let mut by_placement: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
        for e in &events {
            let slot = by_placement.entry(e.placement.as_str()).or_default();
            match e.event_type {
                EventType::Impression => slot.0 += 1,
                EventType::Click => slot.1 += 1,
                _ => {}
            }
        }

        Ok(by_placement
            .into_iter()
            .map(|(placement, (impressions, clicks))| PlacementPerformance {
                placement: placement.to_string(),
                impressions,
                clicks,
                ctr: click_through_rate(clicks, impressions),
            })
            .collect())
    }

    /// Every known candidate, including those without events, ranked by
    /// `metric` descending. Ties keep the store's listing order.
    pub fn top_performers(
        &self,
        limit: usize,
        metric: TopMetric,
        range: Option<DateRange>,
    ) -> EngineResult<Vec<PerformerRow>> {
        let query = EventQuery::default()
            .with_range(range.unwrap_or_default())
            .with_types(&[EventType::Impression, EventType::Click]);
        let events = self.events.query(&query)?;

        let mut counts: HashMap<CandidateId, EventCounts> = HashMap::new();
        for e in &events {
            counts.entry(e.candidate_id).or_default().add(e.event_type);
        }

        let mut rows: Vec<PerformerRow> = self
            .candidates
            .list()?
            .into_iter()
            .map(|c| {
                let n = counts.get(&c.id).copied().unwrap_or_default();
                PerformerRow {
                    candidate_id: c.id,
                    name: c.name,
                    impressions: n.impressions,
                    clicks: n.clicks,
                    ctr: click_through_rate(n.clicks, n.impressions),
                }
            })
            .collect();

        rows.sort_by(|a, b| b.metric(metric).total_cmp(&a.metric(metric)));
        rows.truncate(limit);
        Ok(rows)
    }

    pub fn report(&self, filters: &ReportFilters, format: ReportFormat) -> EngineResult<ReportOutput> {
        let query = EventQuery {
            candidate_ids: filters.candidate_ids.clone(),
            event_types: vec![EventType::Impression, EventType::Click, EventType::Conversion],
            placements: filters.placements.clone(),
            range: filters.range,
        };
        let events = self.events.query(&query)?;
        let names: HashMap<CandidateId, String> = self
            .candidates
            .list()?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let rows = report::build_rows(&events, |id| names.get(id).cloned());
        debug!(events = events.len(), rows = rows.len(), ?format, "Report built");
        Ok(report::render(rows, format))
    }

    /// Conversion revenue per period, ordered by period.
    pub fn revenue_by_period(
        &self,
        range: DateRange,
        group_by: GroupBy,
    ) -> EngineResult<Vec<RevenueBucket>> {
        let query = EventQuery::default()
            .with_range(range)
            .with_types(&[EventType::Conversion]);
        let events = self.events.query(&query)?;

        let mut buckets: BTreeMap<String, (f64, u64)> = BTreeMap::new();
        for e in &events {
            let slot = buckets.entry(group_by.bucket(e.timestamp)).or_default();
            slot.0 += conversion_value(e);
            slot.1 += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(period, (revenue, conversions))| RevenueBucket {
                period,
                revenue,
                conversions,
                average_value: if conversions > 0 {
                    revenue / conversions as f64
                } else {
                    0.0
                },
            })
            .collect())
    }

    /// Compare retained events against live counters. `None` for an unknown
    /// candidate.
    pub fn reconcile(&self, candidate_id: CandidateId) -> EngineResult<Option<Reconciliation>> {
        let Some(candidate) = self.candidates.get(&candidate_id)? else {
            return Ok(None);
        };
        let events = self.events.query(&EventQuery::for_candidate(candidate_id))?;
        let mut logged = EventCounts::default();
        for e in &events {
            logged.add(e.event_type);
        }
        let perf = &candidate.performance;

        let metrics = vec![
            drift("impressions", logged.impressions as f64, perf.impressions as f64),
            drift("clicks", logged.clicks as f64, perf.clicks as f64),
            drift("conversions", logged.conversions as f64, perf.conversions as f64),
            drift("revenue", revenue_of(&events), perf.revenue),
        ];
        let consistent = metrics.iter().all(|m| m.drift.abs() < DRIFT_EPSILON);
        Ok(Some(Reconciliation {
            candidate_id,
            metrics,
            consistent,
        }))
    }
}

fn drift(metric: &str, logged: f64, live: f64) -> MetricDrift {
    MetricDrift {
        metric: metric.to_string(),
        logged,
        live,
        drift: live - logged,
    }
}

fn conversion_value(e: &AdEvent) -> f64 {
    e.conversion_value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn revenue_of(events: &[AdEvent]) -> f64 {
    events
        .iter()
        .filter(|e| e.event_type == EventType::Conversion)
        .map(conversion_value)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::events::EventContext;
    use adserve_store::{Catalog, MemoryCandidateStore, MemoryEventLog, MemoryPlacementStore};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    struct Fixture {
        events: Arc<MemoryEventLog>,
        candidates: Arc<MemoryCandidateStore>,
        aggregator: Aggregator,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(MemoryEventLog::new());
        let candidates = Arc::new(MemoryCandidateStore::new());
        let aggregator = Aggregator::new(events.clone(), candidates.clone());
        Fixture {
            events,
            candidates,
            aggregator,
        }
    }

    fn push(
        f: &Fixture,
        id: CandidateId,
        t: EventType,
        placement: &str,
        at: DateTime<Utc>,
        unique: bool,
        value: Option<f64>,
    ) {
        let ctx = EventContext {
            placement: placement.into(),
            occurred_at: Some(at),
            conversion_value: value,
            ..Default::default()
        };
        f.events.append(AdEvent::new(id, t, ctx, unique)).unwrap();
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_of_empty_log_is_zeroed() {
        let f = fixture();
        let s = f.aggregator.summary(Uuid::new_v4(), None).unwrap();
        assert_eq!(s.totals, EventCounts::default());
        assert_eq!(s.unique, EventCounts::default());
        assert_eq!(s.ctr, 0.0);
        assert_eq!(s.conversion_rate, 0.0);
        assert_eq!(s.revenue, 0.0);
    }

    #[test]
    fn test_summary_counts_totals_unique_and_rates() {
        let f = fixture();
        let id = Uuid::new_v4();
        let day = ts(2024, 3, 1);
        for i in 0..4 {
            push(&f, id, EventType::Impression, "header", day, i < 2, None);
        }
        push(&f, id, EventType::Click, "header", day, true, None);
        push(&f, id, EventType::Click, "header", day, false, None);
        push(&f, id, EventType::Conversion, "header", day, true, Some(20.0));
        push(&f, id, EventType::View, "header", day, true, None);
        // Outside the range below.
        push(&f, id, EventType::Impression, "header", ts(2024, 4, 1), true, None);

        let range = DateRange::between(ts(2024, 3, 1) - Duration::hours(1), ts(2024, 3, 2));
        let s = f.aggregator.summary(id, Some(range)).unwrap();
        assert_eq!(s.totals.impressions, 4);
        assert_eq!(s.unique.impressions, 2);
        assert_eq!(s.totals.clicks, 2);
        assert_eq!(s.unique.clicks, 1);
        assert_eq!(s.totals.views, 1);
        assert!((s.ctr - 50.0).abs() < 1e-9);
        assert!((s.conversion_rate - 50.0).abs() < 1e-9);
        assert!((s.revenue - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_performance_by_placement_sorted() {
        let f = fixture();
        let id = Uuid::new_v4();
        let now = ts(2024, 3, 1);
        push(&f, id, EventType::Impression, "sidebar", now, false, None);
        push(&f, id, EventType::Impression, "header", now, false, None);
        push(&f, id, EventType::Impression, "header", now, false, None);
        push(&f, id, EventType::Click, "header", now, false, None);

        let rows = f.aggregator.performance_by_placement(id, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].placement, "header");
        assert!((rows[0].ctr - 50.0).abs() < 1e-9);
        assert_eq!(rows[1].placement, "sidebar");
        assert_eq!(rows[1].clicks, 0);
    }

    #[test]
    fn test_top_performers_include_idle_candidates() {
        let f = fixture();
        Catalog::demo()
            .load_into(f.candidates.as_ref(), &MemoryPlacementStore::new());
        let all = f.candidates.list().unwrap();
        assert_eq!(all.len(), 3);
        let busy = all[1].id;
        let now = ts(2024, 3, 1);
        for _ in 0..3 {
            push(&f, busy, EventType::Impression, "header", now, false, None);
        }
        push(&f, busy, EventType::Click, "header", now, false, None);

        let top = f.aggregator.top_performers(10, TopMetric::Impressions, None).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].candidate_id, busy);
        assert_eq!(top[1].impressions, 0);

        let top = f.aggregator.top_performers(1, TopMetric::Ctr, None).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].candidate_id, busy);
    }

    #[test]
    fn test_revenue_by_period_buckets() {
        let f = fixture();
        let id = Uuid::new_v4();
        push(&f, id, EventType::Conversion, "header", ts(2024, 2, 26), false, Some(10.0));
        push(&f, id, EventType::Conversion, "header", ts(2024, 2, 27), false, Some(30.0));
        push(&f, id, EventType::Conversion, "header", ts(2024, 3, 4), false, None);
        push(&f, id, EventType::Click, "header", ts(2024, 3, 4), false, Some(99.0));

        let range = DateRange::default();
        let months = f.aggregator.revenue_by_period(range, GroupBy::Month).unwrap();
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].period, "2024-02");
        assert!((months[0].revenue - 40.0).abs() < 1e-9);
        assert!((months[0].average_value - 20.0).abs() < 1e-9);
        assert_eq!(months[1].period, "2024-03");
        assert_eq!(months[1].conversions, 1);
        assert_eq!(months[1].revenue, 0.0);

        let weeks = f.aggregator.revenue_by_period(range, GroupBy::Week).unwrap();
        let periods: Vec<_> = weeks.iter().map(|w| w.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-W09", "2024-W10"]);

        let days = f.aggregator.revenue_by_period(range, GroupBy::Day).unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].period, "2024-02-26");

        let empty = f
            .aggregator
            .revenue_by_period(DateRange::between(ts(2020, 1, 1), ts(2020, 2, 1)), GroupBy::Day)
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_report_filters_and_formats() {
        let f = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = ts(2024, 3, 1);
        push(&f, a, EventType::Impression, "header", now, false, None);
        push(&f, a, EventType::Impression, "sidebar", now, false, None);
        push(&f, b, EventType::Impression, "header", now, false, None);

        let filters = ReportFilters {
            candidate_ids: vec![a],
            placements: vec!["header".into()],
            ..Default::default()
        };
        match f.aggregator.report(&filters, ReportFormat::Structured).unwrap() {
            ReportOutput::Structured(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].impressions, 1);
            }
            other => panic!("unexpected output {other:?}"),
        }
        match f.aggregator.report(&ReportFilters::default(), ReportFormat::Tabular).unwrap() {
            ReportOutput::Tabular(csv) => assert_eq!(csv.lines().count(), 3),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_reconcile_detects_drift() {
        let f = fixture();
        assert!(f.aggregator.reconcile(Uuid::new_v4()).unwrap().is_none());

        let mut catalog = Catalog::demo();
        let mut seeded = catalog.candidates.remove(0);
        seeded.performance.impressions = 5;
        let id = seeded.id;
        f.candidates.upsert(seeded).unwrap();
        push(&f, id, EventType::Impression, "header", ts(2024, 3, 1), false, None);

        let r = f.aggregator.reconcile(id).unwrap().unwrap();
        assert!(!r.consistent);
        let impressions = &r.metrics[0];
        assert_eq!(impressions.metric, "impressions");
        assert_eq!(impressions.logged, 1.0);
        assert_eq!(impressions.live, 5.0);
        assert_eq!(impressions.drift, 4.0);
    }
}
