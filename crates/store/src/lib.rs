//! Candidate, placement-configuration and event-log storage.
//!
//! The engine talks to storage only through the traits below. The in-memory
//! implementations back development, tests and single-node deployments;
//! a database-backed store provides the same surface.

#![warn(clippy::unwrap_used)]

pub mod candidates;
pub mod catalog;
pub mod counters;
pub mod events;
pub mod placements;

pub use candidates::MemoryCandidateStore;
pub use catalog::Catalog;
pub use counters::{CounterDelta, LiveCounters};
pub use events::{EventQuery, MemoryEventLog};
pub use placements::MemoryPlacementStore;

use adserve_core::events::{AdEvent, EventType};
use adserve_core::placement::{ConfigScope, PlacementConfig};
use adserve_core::types::{Candidate, CandidateId, Performance};
use adserve_core::EngineResult;
use chrono::{DateTime, Utc};

/// Read access to candidates plus exclusive write access to their live
/// performance counters.
pub trait CandidateStore: Send + Sync {
    fn get(&self, id: &CandidateId) -> EngineResult<Option<Candidate>>;

    /// Candidates for `ids`, in the given order. Unknown ids are skipped.
    fn get_many(&self, ids: &[CandidateId]) -> EngineResult<Vec<Candidate>>;

    /// Candidates that declare a placement assignment for `position`.
    fn list_for_position(&self, position: &str) -> EngineResult<Vec<Candidate>>;

    fn list(&self) -> EngineResult<Vec<Candidate>>;

    /// Insert or replace a candidate's definition. Live counters of an
    /// existing candidate are kept.
    fn upsert(&self, candidate: Candidate) -> EngineResult<()>;

    fn remove(&self, id: &CandidateId) -> EngineResult<bool>;

    /// Atomically apply a counter increment. Returns the post-increment
    /// performance, or `None` when the candidate no longer exists.
    fn apply_delta(
        &self,
        id: &CandidateId,
        delta: CounterDelta,
    ) -> EngineResult<Option<Performance>>;
}

pub trait PlacementStore: Send + Sync {
    fn config_for(&self, scope: &ConfigScope) -> EngineResult<Option<PlacementConfig>>;

    /// Store `config`, replacing any configuration with the same scope.
    /// Returns the replaced configuration.
    fn upsert(&self, config: PlacementConfig) -> EngineResult<Option<PlacementConfig>>;

    fn remove(&self, scope: &ConfigScope) -> EngineResult<bool>;

    fn list(&self) -> EngineResult<Vec<PlacementConfig>>;
}

/// Append-only analytics event log with a retention horizon.
pub trait EventStore: Send + Sync {
    fn append(&self, event: AdEvent) -> EngineResult<()>;

    /// Whether any event of `event_type` exists for the candidate/session pair.
    fn exists(
        &self,
        candidate_id: &CandidateId,
        session_id: &str,
        event_type: EventType,
    ) -> EngineResult<bool>;

    /// Impressions recorded for the candidate/session pair on one slot.
    fn count_impressions(
        &self,
        candidate_id: &CandidateId,
        session_id: &str,
        placement: &str,
    ) -> EngineResult<u64>;

    fn query(&self, query: &EventQuery) -> EngineResult<Vec<AdEvent>>;

    /// Delete events older than `cutoff`. Returns how many were removed.
    fn purge_before(&self, cutoff: DateTime<Utc>) -> EngineResult<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
