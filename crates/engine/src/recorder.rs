//! Event recording: append to the log, then bump the candidate's live
//! counters.

use adserve_core::events::{AdEvent, EventContext, EventType};
use adserve_core::types::{CandidateId, Performance};
use adserve_core::EngineResult;
use adserve_store::{CandidateStore, CounterDelta, EventStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a successful write produced.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub event: AdEvent,
    /// Post-increment counters, or `None` when the candidate is gone or the
    /// event type carries no counter.
    pub performance: Option<Performance>,
}

pub struct EventRecorder {
    candidates: Arc<dyn CandidateStore>,
    events: Arc<dyn EventStore>,
}

impl EventRecorder {
    pub fn new(candidates: Arc<dyn CandidateStore>, events: Arc<dyn EventStore>) -> Self {
        Self { candidates, events }
    }

    /// Write one event and apply its counter delta.
    ///
    /// The uniqueness check is a read before the write, so two concurrent
    /// first events for the same session may both be flagged unique.
    /// Sessionless events are never unique, and neither is an event whose
    /// uniqueness lookup failed.
    pub fn apply(
        &self,
        candidate_id: CandidateId,
        event_type: EventType,
        ctx: EventContext,
    ) -> EngineResult<RecordOutcome> {
        let is_unique = match ctx.session_id.as_deref() {
            Some(session) => match self.events.exists(&candidate_id, session, event_type) {
                Ok(seen) => !seen,
                Err(e) => {
                    warn!(candidate_id = %candidate_id, error = %e, "Uniqueness lookup failed, recording as repeat");
                    metrics::counter!("events.unique_lookup_errors").increment(1);
                    false
                }
            },
            None => false,
        };

        let event = AdEvent::new(candidate_id, event_type, ctx, is_unique);
        self.events.append(event.clone())?;

        let delta = match event_type {
            EventType::Impression => Some(CounterDelta::Impression { at: event.timestamp }),
            EventType::Click => Some(CounterDelta::Click { at: event.timestamp }),
            EventType::Conversion => Some(CounterDelta::Conversion {
                value: event.conversion_value,
            }),
            EventType::View => None,
        };

        let performance = match delta {
            Some(delta) => {
                let updated = self.candidates.apply_delta(&candidate_id, delta)?;
                if updated.is_none() {
                    debug!(candidate_id = %candidate_id, event_type = %event_type.as_str(), "Event for unknown candidate, counters skipped");
                    metrics::counter!("events.orphaned").increment(1);
                }
                updated
            }
            None => None,
        };

        metrics::counter!("events.recorded", "type" => event_type.as_str()).increment(1);
        Ok(RecordOutcome { event, performance })
    }

    /// Best-effort variant of [`apply`](Self::apply): failures are logged and
    /// counted, never returned.
    pub fn record(
        &self,
        candidate_id: CandidateId,
        event_type: EventType,
        ctx: EventContext,
    ) -> Option<AdEvent> {
        match self.apply(candidate_id, event_type, ctx) {
            Ok(outcome) => Some(outcome.event),
            Err(e) => {
                warn!(candidate_id = %candidate_id, event_type = %event_type.as_str(), error = %e, "Failed to record event");
                metrics::counter!("events.record_errors").increment(1);
                None
            }
        }
    }
}
