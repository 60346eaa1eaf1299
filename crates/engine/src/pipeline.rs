//! Slot-fill pipeline: resolve the pool, filter it, guard it, pick one.

use crate::frequency::FrequencyCapGuard;
use crate::resolver::PlacementResolver;
use crate::rotation::RotationState;
use crate::{budget, targeting};
use adserve_core::config::SelectionConfig;
use adserve_core::context::SelectionContext;
use adserve_core::types::ServedAd;
use adserve_core::EngineResult;
use adserve_store::{CandidateStore, EventStore, PlacementStore};
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Decides which ad, if any, fills a slot.
pub struct AdSelector {
    candidates: Arc<dyn CandidateStore>,
    resolver: PlacementResolver,
    frequency: FrequencyCapGuard,
    rotation: RotationState,
    config: SelectionConfig,
}

impl AdSelector {
    pub fn new(
        candidates: Arc<dyn CandidateStore>,
        placements: Arc<dyn PlacementStore>,
        events: Arc<dyn EventStore>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            candidates,
            resolver: PlacementResolver::new(placements),
            frequency: FrequencyCapGuard::new(events),
            rotation: RotationState::new(),
            config,
        }
    }

    /// Choose the ad for `position`. `Ok(None)` means nothing is eligible;
    /// errors are reserved for storage failures.
    pub fn select_ad_for_placement(
        &self,
        position: &str,
        ctx: &SelectionContext,
    ) -> EngineResult<Option<ServedAd>> {
        self.select_with_rng(position, ctx, &mut rand::thread_rng())
    }

    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        position: &str,
        ctx: &SelectionContext,
        rng: &mut R,
    ) -> EngineResult<Option<ServedAd>> {
        let start = Instant::now();
        metrics::counter!("selection.requests").increment(1);

        let result = self.run(position, ctx, rng);

        metrics::histogram!("selection.latency_us").record(start.elapsed().as_micros() as f64);
        match &result {
            Ok(Some(_)) => metrics::counter!("selection.filled").increment(1),
            Ok(None) => metrics::counter!("selection.empty").increment(1),
            Err(e) => {
                warn!(position, error = %e, "Slot selection failed");
                metrics::counter!("selection.errors").increment(1);
            }
        }
        result
    }

    fn run<R: Rng + ?Sized>(
        &self,
        position: &str,
        ctx: &SelectionContext,
        rng: &mut R,
    ) -> EngineResult<Option<ServedAd>> {
        let now = ctx.at();
        let resolution = self
            .resolver
            .resolve(position, ctx.page_id.as_deref(), &ctx.category_ids)?;
        let pool = self
            .resolver
            .active_candidates(&resolution, self.candidates.as_ref())?;
        let pooled = pool.len();

        let targeted: Vec<_> = targeting::filter(pool, ctx, now)
            .into_iter()
            .filter(|c| targeting::is_eligible(c, now))
            .collect();
        let uncapped = self
            .frequency
            .guard(targeted, ctx.session_id.as_deref(), position)?;
        let eligible = budget::guard(uncapped);

        debug!(
            position,
            pool_key = %resolution.pool_key(),
            pooled,
            eligible = eligible.len(),
            "Candidates filtered"
        );

        let chosen = self.rotation.choose(
            resolution.rotation,
            &resolution.pool_key(),
            &eligible,
            position,
            ctx.session_id.as_deref(),
            self.config.default_priority,
            rng,
        );
        Ok(chosen.map(|c| ServedAd::from_candidate(c, position)))
    }
}
