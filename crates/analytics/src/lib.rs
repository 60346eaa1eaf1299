//! Event analytics: grouped queries over the event log and the optional
//! ClickHouse export sink.

#![warn(clippy::unwrap_used)]

pub mod aggregator;
pub mod report;
pub mod sink;

pub use aggregator::{
    Aggregator, CandidateSummary, EventCounts, GroupBy, PerformerRow, PlacementPerformance,
    Reconciliation, RevenueBucket, TopMetric,
};
pub use report::{ReportFilters, ReportFormat, ReportOutput, ReportRow};
pub use sink::ClickHouseSink;
