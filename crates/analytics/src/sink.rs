//! ClickHouse export sink. Recorded events are queued without blocking and
//! written in batches by a background task.

use adserve_core::config::ClickHouseConfig;
use adserve_core::events::{AdEvent, EventSink};
use clickhouse::Row;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS ad_events (
    event_id UUID,
    candidate_id UUID,
    event_type LowCardinality(String),
    timestamp DateTime64(3),
    placement String,
    page_id Nullable(String),
    session_id Nullable(String),
    is_unique UInt8,
    device_type Nullable(String),
    time_on_screen_ms Nullable(UInt64),
    scroll_depth Nullable(Float64),
    viewport_percentage Nullable(Float64),
    conversion_value Nullable(Float64),
    referrer Nullable(String),
    user_agent Nullable(String),
    geo_country Nullable(String),
    node_id String
) ENGINE = MergeTree()
ORDER BY (timestamp, candidate_id, event_type)
PARTITION BY toYYYYMM(timestamp)
TTL timestamp + INTERVAL 90 DAY";

/// One `ad_events` row, written as RowBinary through the typed insert API.
/// Field order follows the table's column order.
#[derive(Debug, Clone, Row, Serialize, PartialEq)]
pub struct ExportRow {
    #[serde(with = "clickhouse::serde::uuid")]
    pub event_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub candidate_id: Uuid,
    pub event_type: String,
    /// Milliseconds since epoch (`DateTime64(3)`).
    pub timestamp: i64,
    pub placement: String,
    pub page_id: Option<String>,
    pub session_id: Option<String>,
    pub is_unique: u8,
    pub device_type: Option<String>,
    pub time_on_screen_ms: Option<u64>,
    pub scroll_depth: Option<f64>,
    pub viewport_percentage: Option<f64>,
    pub conversion_value: Option<f64>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub geo_country: Option<String>,
    pub node_id: String,
}

impl ExportRow {
    pub fn from_event(e: &AdEvent, node_id: &str) -> Self {
        let engagement = e.engagement.as_ref();
        Self {
            event_id: e.id,
            candidate_id: e.candidate_id,
            event_type: e.event_type.as_str().to_string(),
            timestamp: e.timestamp.timestamp_millis(),
            placement: e.placement.clone(),
            page_id: e.page_id.clone(),
            session_id: e.session_id.clone(),
            is_unique: u8::from(e.is_unique),
            device_type: e
                .device_type
                .and_then(|d| serde_json::to_value(d).ok())
                .and_then(|v| v.as_str().map(str::to_string)),
            time_on_screen_ms: engagement.and_then(|m| m.time_on_screen_ms),
            scroll_depth: engagement.and_then(|m| m.scroll_depth),
            viewport_percentage: engagement.and_then(|m| m.viewport_percentage),
            conversion_value: e.conversion_value.filter(|v| v.is_finite()),
            referrer: e.referrer.clone(),
            user_agent: e.user_agent.clone(),
            geo_country: e.geo_country.clone(),
            node_id: node_id.to_string(),
        }
    }
}

/// Export sink with a background batch writer.
pub struct ClickHouseSink {
    sender: mpsc::Sender<ExportRow>,
    node_id: String,
}

impl ClickHouseSink {
    /// Connect, make sure the table exists and spawn the writer.
    pub async fn new(
        config: &ClickHouseConfig,
        node_id: String,
        queue_capacity: usize,
    ) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<ExportRow>(queue_capacity.max(1));

        let writer = BatchWriter::new(config).await?;
        let batch_size = config.batch_size.max(1);
        let flush_interval = std::time::Duration::from_millis(config.flush_interval_ms.max(1));

        tokio::spawn(async move {
            writer.run(receiver, batch_size, flush_interval).await;
        });

        info!(url = %config.url, database = %config.database, "ClickHouse event export enabled");

        Ok(Self { sender, node_id })
    }
}

impl EventSink for ClickHouseSink {
    fn submit(&self, event: &AdEvent) {
        let row = ExportRow::from_event(event, &self.node_id);
        if let Err(e) = self.sender.try_send(row) {
            metrics::counter!("events.export.dropped").increment(1);
            warn!("Export row dropped: {}", e);
        }
    }
}

struct BatchWriter {
    client: clickhouse::Client,
}

impl BatchWriter {
    async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        client.query(CREATE_TABLE).execute().await?;
        info!("ClickHouse schema verified");

        Ok(Self { client })
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<ExportRow>,
        batch_size: usize,
        flush_interval: std::time::Duration,
    ) {
        let mut buffer: Vec<ExportRow> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(row) => {
                        buffer.push(row);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            self.flush(&mut buffer).await;
                        }
                        debug!("Export channel closed, writer stopping");
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<ExportRow>) {
        let count = buffer.len();
        debug!(count, "Flushing event batch to ClickHouse");

        match self.write_batch(buffer).await {
            Ok(()) => {
                metrics::counter!("events.export.flushed").increment(count as u64);
                debug!(count, "Event batch flushed");
            }
            Err(e) => {
                metrics::counter!("events.export.flush_errors").increment(1);
                error!(error = %e, count, "Failed to flush event batch");
            }
        }

        buffer.clear();
    }

    async fn write_batch(&self, rows: &[ExportRow]) -> clickhouse::error::Result<()> {
        let mut insert = self.client.insert::<ExportRow>("ad_events")?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::events::{EngagementMetrics, EventContext, EventType};
    use adserve_core::types::DeviceType;
    use chrono::{TimeZone, Utc};

    fn event(referrer: Option<&str>) -> AdEvent {
        AdEvent::new(
            Uuid::new_v4(),
            EventType::Click,
            EventContext {
                placement: "header".into(),
                session_id: Some("s1".into()),
                device_type: Some(DeviceType::Mobile),
                engagement: Some(EngagementMetrics {
                    time_on_screen_ms: Some(1500),
                    ..Default::default()
                }),
                conversion_value: Some(f64::NAN),
                referrer: referrer.map(str::to_string),
                occurred_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 5).unwrap()),
                ..Default::default()
            },
            true,
        )
    }

    #[test]
    fn test_export_row_shape() {
        let e = event(None);
        let row = ExportRow::from_event(&e, "node-1");
        assert_eq!(row.event_id, e.id);
        assert_eq!(row.event_type, "click");
        assert_eq!(row.timestamp, 1_709_281_805_000);
        assert_eq!(row.is_unique, 1);
        assert_eq!(row.device_type.as_deref(), Some("mobile"));
        assert_eq!(row.time_on_screen_ms, Some(1500));
        assert_eq!(row.conversion_value, None);
        assert_eq!(row.node_id, "node-1");
    }

    #[tokio::test]
    async fn test_flush_with_query_string_referrer_reports_error() {
        let referrer = "https://blog.example.com/post?id=3&ref=?x";
        let row = ExportRow::from_event(&event(Some(referrer)), "n");
        assert_eq!(row.referrer.as_deref(), Some(referrer));

        // Nothing listens on port 1: the write fails and is counted, the
        // writer keeps running.
        let writer = BatchWriter {
            client: clickhouse::Client::default().with_url("http://127.0.0.1:1"),
        };
        let mut buffer = vec![row.clone(), row];
        writer.flush(&mut buffer).await;
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_schema_has_retention_ttl() {
        assert!(CREATE_TABLE.contains("TTL timestamp + INTERVAL 90 DAY"));
        assert!(CREATE_TABLE.contains("ENGINE = MergeTree()"));
    }
}
