//! Placement resolution: page config, then category configs, then the
//! global default, then the candidates' own slot assignments.

use adserve_core::placement::{ConfigScope, RotationPolicy};
use adserve_core::types::{Candidate, CandidateStatus, CandidateId};
use adserve_core::EngineResult;
use adserve_store::{CandidateStore, PlacementStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Where the candidate pool for a slot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Config(ConfigScope),
    /// No configuration covers the slot; every candidate assigned to it
    /// competes.
    Assignments,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub position: String,
    pub source: ResolutionSource,
    /// Ordered pool from a configuration; `None` for assignment-based pools.
    pub pool: Option<Vec<CandidateId>>,
    pub rotation: RotationPolicy,
}

impl Resolution {
    /// Stable key identifying the pool, used for rotation cursors.
    pub fn pool_key(&self) -> String {
        match &self.source {
            ResolutionSource::Config(scope) => format!("{scope}/{}", self.position),
            ResolutionSource::Assignments => format!("assignments/{}", self.position),
        }
    }
}

pub struct PlacementResolver {
    placements: Arc<dyn PlacementStore>,
}

impl PlacementResolver {
    pub fn new(placements: Arc<dyn PlacementStore>) -> Self {
        Self { placements }
    }

    /// Resolve the pool and rotation policy for `position`. The first scope
    /// with an enabled slot for the position wins.
    pub fn resolve(
        &self,
        position: &str,
        page_id: Option<&str>,
        category_ids: &[String],
    ) -> EngineResult<Resolution> {
        let scopes = page_id
            .map(|p| ConfigScope::Page(p.to_string()))
            .into_iter()
            .chain(category_ids.iter().map(|c| ConfigScope::Category(c.clone())))
            .chain(std::iter::once(ConfigScope::Global));

        for scope in scopes {
            let Some(config) = self.placements.config_for(&scope)? else {
                continue;
            };
            if let Some(slot) = config.enabled_slot(position) {
                debug!(position, scope = %scope, pool = slot.candidate_ids.len(), "Slot resolved from config");
                return Ok(Resolution {
                    position: position.to_string(),
                    source: ResolutionSource::Config(scope),
                    pool: Some(slot.candidate_ids.clone()),
                    rotation: slot.rotation,
                });
            }
        }

        Ok(Resolution {
            position: position.to_string(),
            source: ResolutionSource::Assignments,
            pool: None,
            rotation: RotationPolicy::Weighted,
        })
    }

    /// Fetch the active candidates the resolution points at, keeping pool
    /// order for configured slots.
    pub fn active_candidates(
        &self,
        resolution: &Resolution,
        candidates: &dyn CandidateStore,
    ) -> EngineResult<Vec<Candidate>> {
        let fetched = match &resolution.pool {
            Some(ids) => candidates.get_many(ids)?,
            None => candidates.list_for_position(&resolution.position)?,
        };
        Ok(fetched
            .into_iter()
            .filter(|c| c.status == CandidateStatus::Active)
            .collect())
    }
}
