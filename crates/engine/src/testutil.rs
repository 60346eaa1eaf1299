use adserve_core::types::*;
use adserve_core::{EngineError, EngineResult};
use adserve_store::{CandidateStore, CounterDelta};
use chrono::{Duration, Utc};
use uuid::Uuid;

pub fn candidate(position: &str, priority: u8) -> Candidate {
    let now = Utc::now();
    Candidate {
        id: Uuid::new_v4(),
        name: format!("{position}-{priority}"),
        internal_notes: None,
        creative: Creative {
            headline: "headline".into(),
            ..Default::default()
        },
        link_url: "https://example.com/landing".into(),
        tracking: None,
        open_in_new_tab: false,
        targeting: TargetingRules::default(),
        placements: vec![PlacementAssignment {
            position: position.into(),
            priority,
            frequency_cap: None,
        }],
        schedule: Schedule {
            start: now - Duration::days(1),
            end: None,
        },
        budget: Budget::default(),
        performance: Performance::default(),
        status: CandidateStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

/// A store whose backend is down.
pub struct UnavailableStore;

fn down<T>() -> EngineResult<T> {
    Err(EngineError::Store("connection refused".into()))
}

impl CandidateStore for UnavailableStore {
    fn get(&self, _id: &CandidateId) -> EngineResult<Option<Candidate>> {
        down()
    }
    fn get_many(&self, _ids: &[CandidateId]) -> EngineResult<Vec<Candidate>> {
        down()
    }
    fn list_for_position(&self, _position: &str) -> EngineResult<Vec<Candidate>> {
        down()
    }
    fn list(&self) -> EngineResult<Vec<Candidate>> {
        down()
    }
    fn upsert(&self, _candidate: Candidate) -> EngineResult<()> {
        down()
    }
    fn remove(&self, _id: &CandidateId) -> EngineResult<bool> {
        down()
    }
    fn apply_delta(
        &self,
        _id: &CandidateId,
        _delta: CounterDelta,
    ) -> EngineResult<Option<Performance>> {
        down()
    }
}
