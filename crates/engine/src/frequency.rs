//! Per-session frequency capping, keyed to the `(candidate, slot)` pair
//! being served.

use adserve_core::types::Candidate;
use adserve_core::EngineResult;
use adserve_store::EventStore;
use std::sync::Arc;
use tracing::debug;

pub struct FrequencyCapGuard {
    events: Arc<dyn EventStore>,
}

impl FrequencyCapGuard {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Drop candidates whose cap for `position` has been reached by this
    /// session. Without a session id nothing can be counted, so capped
    /// candidates pass.
    pub fn guard(
        &self,
        candidates: Vec<Candidate>,
        session_id: Option<&str>,
        position: &str,
    ) -> EngineResult<Vec<Candidate>> {
        let Some(session_id) = session_id else {
            return Ok(candidates);
        };

        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let cap = candidate
                .assignment_for(position)
                .and_then(|a| a.frequency_cap);
            if let Some(cap) = cap {
                let seen = self
                    .events
                    .count_impressions(&candidate.id, session_id, position)?;
                if seen >= u64::from(cap) {
                    debug!(candidate_id = %candidate.id, position, seen, cap, "Frequency capped");
                    metrics::counter!("selection.frequency_capped").increment(1);
                    continue;
                }
            }
            kept.push(candidate);
        }
        Ok(kept)
    }
}
