//! In-memory candidate store backed by DashMap.

use crate::counters::{CounterDelta, LiveCounters};
use crate::CandidateStore;
use adserve_core::types::{Candidate, CandidateId, Performance};
use adserve_core::EngineResult;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct Entry {
    candidate: Candidate,
    counters: Arc<LiveCounters>,
}

impl Entry {
    fn materialize(&self) -> Candidate {
        let mut c = self.candidate.clone();
        c.performance = self.counters.snapshot();
        c
    }
}

/// Thread-safe candidate store. Definitions are replaced wholesale by the
/// admin surface; counters live beside them and are only touched through
/// [`CandidateStore::apply_delta`].
pub struct MemoryCandidateStore {
    entries: DashMap<CandidateId, Entry>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        info!("Candidate store initialized (in-memory)");
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCandidateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateStore for MemoryCandidateStore {
    fn get(&self, id: &CandidateId) -> EngineResult<Option<Candidate>> {
        Ok(self.entries.get(id).map(|e| e.materialize()))
    }

    fn get_many(&self, ids: &[CandidateId]) -> EngineResult<Vec<Candidate>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.materialize()))
            .collect())
    }

    fn list_for_position(&self, position: &str) -> EngineResult<Vec<Candidate>> {
        let mut found: Vec<Candidate> = self
            .entries
            .iter()
            .filter(|e| e.candidate.assignment_for(position).is_some())
            .map(|e| e.materialize())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    fn list(&self) -> EngineResult<Vec<Candidate>> {
        let mut all: Vec<Candidate> = self.entries.iter().map(|e| e.materialize()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn upsert(&self, candidate: Candidate) -> EngineResult<()> {
        candidate.validate()?;
        let id = candidate.id;
        // One shard lock covers check and insert; live counters are never replaced.
        match self.entries.entry(id) {
            MapEntry::Occupied(mut existing) => {
                existing.get_mut().candidate = candidate;
                debug!(candidate_id = %id, "Candidate definition replaced");
            }
            MapEntry::Vacant(slot) => {
                let counters = Arc::new(LiveCounters::seeded(&candidate.performance));
                slot.insert(Entry { candidate, counters });
                debug!(candidate_id = %id, "Candidate inserted");
            }
        }
        Ok(())
    }

    fn remove(&self, id: &CandidateId) -> EngineResult<bool> {
        Ok(self.entries.remove(id).is_some())
    }

    fn apply_delta(
        &self,
        id: &CandidateId,
        delta: CounterDelta,
    ) -> EngineResult<Option<Performance>> {
        // Clone the Arc so the shard lock is released before touching atomics.
        let counters = match self.entries.get(id) {
            Some(e) => e.counters.clone(),
            None => return Ok(None),
        };
        Ok(Some(counters.apply(delta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::types::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn make_candidate(position: &str) -> Candidate {
        let now = Utc::now();
        Candidate {
            id: Uuid::new_v4(),
            name: format!("ad for {position}"),
            internal_notes: None,
            creative: Creative::default(),
            link_url: "https://example.com".into(),
            tracking: None,
            open_in_new_tab: false,
            targeting: TargetingRules::default(),
            placements: vec![PlacementAssignment {
                position: position.into(),
                priority: 5,
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

    #[test]
    fn test_upsert_rejects_invalid() {
        let store = MemoryCandidateStore::new();
        let mut c = make_candidate("header");
        c.placements[0].priority = 0;
        assert!(store.upsert(c).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_preserves_live_counters() {
        let store = MemoryCandidateStore::new();
        let c = make_candidate("header");
        let id = c.id;
        store.upsert(c.clone()).unwrap();
        store
            .apply_delta(&id, CounterDelta::Impression { at: Utc::now() })
            .unwrap();

        let mut edited = c;
        edited.name = "renamed".into();
        edited.performance = Performance::default();
        store.upsert(edited).unwrap();

        let got = store.get(&id).unwrap().unwrap();
        assert_eq!(got.name, "renamed");
        assert_eq!(got.performance.impressions, 1);
    }

    #[test]
    fn test_get_many_keeps_order_and_skips_unknown() {
        let store = MemoryCandidateStore::new();
        let a = make_candidate("header");
        let b = make_candidate("header");
        store.upsert(a.clone()).unwrap();
        store.upsert(b.clone()).unwrap();

        let got = store.get_many(&[b.id, Uuid::new_v4(), a.id]).unwrap();
        let ids: Vec<_> = got.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn test_list_for_position() {
        let store = MemoryCandidateStore::new();
        store.upsert(make_candidate("header")).unwrap();
        store.upsert(make_candidate("footer")).unwrap();
        assert_eq!(store.list_for_position("header").unwrap().len(), 1);
        assert!(store.list_for_position("sidebar").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_first_upserts_keep_every_increment() {
        use std::sync::Barrier;

        for _ in 0..500 {
            let store = MemoryCandidateStore::new();
            let c = make_candidate("header");
            let id = c.id;
            let barrier = Barrier::new(2);
            std::thread::scope(|scope| {
                for _ in 0..2 {
                    scope.spawn(|| {
                        barrier.wait();
                        store.upsert(c.clone()).unwrap();
                        store
                            .apply_delta(&id, CounterDelta::Impression { at: Utc::now() })
                            .unwrap();
                    });
                }
            });
            let stored = store.get(&id).unwrap().unwrap();
            assert_eq!(stored.performance.impressions, 2);
        }
    }

    #[test]
    fn test_apply_delta_on_removed_candidate() {
        let store = MemoryCandidateStore::new();
        let c = make_candidate("header");
        let id = c.id;
        store.upsert(c).unwrap();
        assert!(store.remove(&id).unwrap());
        let result = store
            .apply_delta(&id, CounterDelta::Click { at: Utc::now() })
            .unwrap();
        assert!(result.is_none());
    }
}
