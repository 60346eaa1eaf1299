//! In-memory analytics event log with a per-session index for uniqueness
//! and frequency-cap lookups.

use crate::EventStore;
use adserve_core::events::{AdEvent, DateRange, EventType};
use adserve_core::types::CandidateId;
use adserve_core::EngineResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Filter for [`EventStore::query`]. Empty lists mean "any".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub candidate_ids: Vec<CandidateId>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub placements: Vec<String>,
    #[serde(default)]
    pub range: DateRange,
}

impl EventQuery {
    pub fn for_candidate(id: CandidateId) -> Self {
        Self {
            candidate_ids: vec![id],
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_types(mut self, types: &[EventType]) -> Self {
        self.event_types = types.to_vec();
        self
    }

    pub fn matches(&self, e: &AdEvent) -> bool {
        (self.candidate_ids.is_empty() || self.candidate_ids.contains(&e.candidate_id))
            && (self.event_types.is_empty() || self.event_types.contains(&e.event_type))
            && (self.placements.is_empty() || self.placements.contains(&e.placement))
            && self.range.contains(e.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    candidate_id: CandidateId,
    session_id: String,
}

#[derive(Debug, Default)]
struct SessionTally {
    by_type: HashMap<EventType, u64>,
    impressions_by_placement: HashMap<String, u64>,
}

#[derive(Default)]
struct LogInner {
    events: Vec<AdEvent>,
    sessions: HashMap<SessionKey, SessionTally>,
}

impl LogInner {
    fn index(&mut self, e: &AdEvent) {
        let Some(session_id) = &e.session_id else {
            return;
        };
        let tally = self
            .sessions
            .entry(SessionKey {
                candidate_id: e.candidate_id,
                session_id: session_id.clone(),
            })
            .or_default();
        *tally.by_type.entry(e.event_type).or_insert(0) += 1;
        if e.event_type == EventType::Impression {
            *tally
                .impressions_by_placement
                .entry(e.placement.clone())
                .or_insert(0) += 1;
        }
    }

    fn tally(&self, candidate_id: &CandidateId, session_id: &str) -> Option<&SessionTally> {
        self.sessions.get(&SessionKey {
            candidate_id: *candidate_id,
            session_id: session_id.to_string(),
        })
    }
}

/// Append-only log guarded by a single reader/writer lock. The session index
/// lives under the same lock so lookups always agree with the rows.
pub struct MemoryEventLog {
    inner: RwLock<LogInner>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner::default()),
        }
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for MemoryEventLog {
    fn append(&self, event: AdEvent) -> EngineResult<()> {
        let mut inner = self.inner.write();
        inner.index(&event);
        inner.events.push(event);
        Ok(())
    }

    fn exists(
        &self,
        candidate_id: &CandidateId,
        session_id: &str,
        event_type: EventType,
    ) -> EngineResult<bool> {
        let inner = self.inner.read();
        Ok(inner
            .tally(candidate_id, session_id)
            .and_then(|t| t.by_type.get(&event_type))
            .is_some_and(|n| *n > 0))
    }

    fn count_impressions(
        &self,
        candidate_id: &CandidateId,
        session_id: &str,
        placement: &str,
    ) -> EngineResult<u64> {
        let inner = self.inner.read();
        Ok(inner
            .tally(candidate_id, session_id)
            .and_then(|t| t.impressions_by_placement.get(placement).copied())
            .unwrap_or(0))
    }

    fn query(&self, query: &EventQuery) -> EngineResult<Vec<AdEvent>> {
        let inner = self.inner.read();
        Ok(inner
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> EngineResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.events.len();
        inner.events.retain(|e| e.timestamp >= cutoff);
        let removed = before - inner.events.len();
        if removed > 0 {
            let events = std::mem::take(&mut inner.events);
            inner.sessions.clear();
            for e in &events {
                inner.index(e);
            }
            inner.events = events;
            metrics::counter!("events.purged").increment(removed as u64);
            info!(removed, cutoff = %cutoff, "Expired events purged");
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.inner.read().events.len()
    }
}
