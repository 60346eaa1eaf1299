//! Lock-free live performance counters.
//!
//! Every mutation is a single atomic operation, so concurrent recorders
//! never lose increments. Revenue is an `f64` kept as raw bits and updated
//! with a compare-and-swap loop.

use adserve_core::types::Performance;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const NO_TIMESTAMP: i64 = i64::MIN;

/// A single counter mutation requested by the event recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterDelta {
    Impression { at: DateTime<Utc> },
    Click { at: DateTime<Utc> },
    Conversion { value: Option<f64> },
}

pub struct LiveCounters {
    impressions: AtomicU64,
    clicks: AtomicU64,
    conversions: AtomicU64,
    revenue_bits: AtomicU64,
    last_impression_ms: AtomicI64,
    last_click_ms: AtomicI64,
}

impl LiveCounters {
    pub fn new() -> Self {
        Self::seeded(&Performance::default())
    }

    /// Counters starting from previously persisted lifetime values.
    pub fn seeded(perf: &Performance) -> Self {
        Self {
            impressions: AtomicU64::new(perf.impressions),
            clicks: AtomicU64::new(perf.clicks),
            conversions: AtomicU64::new(perf.conversions),
            revenue_bits: AtomicU64::new(perf.revenue.to_bits()),
            last_impression_ms: AtomicI64::new(to_millis(perf.last_impression_at)),
            last_click_ms: AtomicI64::new(to_millis(perf.last_click_at)),
        }
    }

    /// Apply `delta` and return the resulting performance. The incremented
    /// field comes from the atomic operation itself; `ctr` is computed from
    /// that post-increment value.
    pub fn apply(&self, delta: CounterDelta) -> Performance {
        match delta {
            CounterDelta::Impression { at } => {
                let impressions = self.impressions.fetch_add(1, Ordering::AcqRel) + 1;
                self.last_impression_ms
                    .fetch_max(at.timestamp_millis(), Ordering::AcqRel);
                let clicks = self.clicks.load(Ordering::Acquire);
                self.build(impressions, clicks)
            }
            CounterDelta::Click { at } => {
                let clicks = self.clicks.fetch_add(1, Ordering::AcqRel) + 1;
                self.last_click_ms
                    .fetch_max(at.timestamp_millis(), Ordering::AcqRel);
                let impressions = self.impressions.load(Ordering::Acquire);
                self.build(impressions, clicks)
            }
            CounterDelta::Conversion { value } => {
                self.conversions.fetch_add(1, Ordering::AcqRel);
                if let Some(v) = value.filter(|v| v.is_finite()) {
                    self.add_revenue(v);
                }
                self.snapshot()
            }
        }
    }

    pub fn snapshot(&self) -> Performance {
        let impressions = self.impressions.load(Ordering::Acquire);
        let clicks = self.clicks.load(Ordering::Acquire);
        self.build(impressions, clicks)
    }

    fn build(&self, impressions: u64, clicks: u64) -> Performance {
        Performance::from_counters(
            impressions,
            clicks,
            self.conversions.load(Ordering::Acquire),
            f64::from_bits(self.revenue_bits.load(Ordering::Acquire)),
            from_millis(self.last_impression_ms.load(Ordering::Acquire)),
            from_millis(self.last_click_ms.load(Ordering::Acquire)),
        )
    }

    fn add_revenue(&self, amount: f64) -> f64 {
        let mut current = self.revenue_bits.load(Ordering::Acquire);
        loop {
            let next = (f64::from_bits(current) + amount).to_bits();
            match self.revenue_bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return f64::from_bits(next),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for LiveCounters {
    fn default() -> Self {
        Self::new()
    }
}

fn to_millis(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map(|t| t.timestamp_millis()).unwrap_or(NO_TIMESTAMP)
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms == NO_TIMESTAMP {
        None
    } else {
        Utc.timestamp_millis_opt(ms).single()
    }
}
