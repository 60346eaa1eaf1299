//! Non-blocking event intake. Callers hand events to a bounded channel and
//! return immediately; a background task records them and forwards the
//! written events to the export sink.

use crate::recorder::EventRecorder;
use adserve_core::events::{EventContext, EventSink, EventType};
use adserve_core::types::CandidateId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct QueuedEvent {
    candidate_id: CandidateId,
    event_type: EventType,
    ctx: EventContext,
}

pub struct EventDispatcher {
    sender: mpsc::Sender<QueuedEvent>,
    worker: JoinHandle<()>,
}

impl EventDispatcher {
    /// Spawn the background recorder task. Must be called inside a tokio
    /// runtime.
    pub fn spawn(
        recorder: Arc<EventRecorder>,
        sink: Option<Arc<dyn EventSink>>,
        queue_capacity: usize,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<QueuedEvent>(queue_capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let written = recorder.record(job.candidate_id, job.event_type, job.ctx);
                if let (Some(event), Some(sink)) = (written, sink.as_ref()) {
                    sink.submit(&event);
                }
            }
            debug!("Event dispatcher channel closed");
        });

        info!(queue_capacity, "Event dispatcher started");
        Self { sender, worker }
    }

    /// Queue an event. Returns `false` when the queue is full or closed and
    /// the event was dropped.
    pub fn dispatch(&self, candidate_id: CandidateId, event_type: EventType, ctx: EventContext) -> bool {
        let job = QueuedEvent {
            candidate_id,
            event_type,
            ctx,
        };
        match self.sender.try_send(job) {
            Ok(()) => {
                metrics::counter!("events.queued").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("events.dropped").increment(1);
                warn!(candidate_id = %candidate_id, event_type = %event_type.as_str(), "Event dropped: {}", e);
                false
            }
        }
    }

    pub fn record_impression(&self, candidate_id: CandidateId, ctx: EventContext) {
        self.dispatch(candidate_id, EventType::Impression, ctx);
    }

    pub fn record_click(&self, candidate_id: CandidateId, ctx: EventContext) {
        self.dispatch(candidate_id, EventType::Click, ctx);
    }

    /// The conversion value travels in `ctx.conversion_value`.
    pub fn record_conversion(&self, candidate_id: CandidateId, ctx: EventContext) {
        self.dispatch(candidate_id, EventType::Conversion, ctx);
    }

    pub fn record_view(&self, candidate_id: CandidateId, ctx: EventContext) {
        self.dispatch(candidate_id, EventType::View, ctx);
    }

    /// Close the queue and wait until every accepted event is recorded.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Event dispatcher task ended abnormally");
        }
    }
}
