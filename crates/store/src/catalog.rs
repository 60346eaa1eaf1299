//! Catalog ingest: the records the admin surface hands over at boot.

use crate::{CandidateStore, PlacementStore};
use adserve_core::placement::{ConfigScope, PlacementConfig, RotationPolicy, SlotConfig};
use adserve_core::types::*;
use adserve_core::EngineResult;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub placements: Vec<PlacementConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub candidates_loaded: usize,
    pub candidates_rejected: usize,
    pub placements_loaded: usize,
    pub placements_rejected: usize,
}

impl Catalog {
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load every record into the stores. Invalid records are skipped and
    /// counted; they never abort the whole load.
    pub fn load_into(
        self,
        candidates: &dyn CandidateStore,
        placements: &dyn PlacementStore,
    ) -> CatalogStats {
        let mut stats = CatalogStats::default();

        for candidate in self.candidates {
            let id = candidate.id;
            match candidates.upsert(candidate) {
                Ok(()) => stats.candidates_loaded += 1,
                Err(e) => {
                    warn!(candidate_id = %id, error = %e, "Rejected catalog candidate");
                    stats.candidates_rejected += 1;
                }
            }
        }
        for config in self.placements {
            let scope = config.scope.clone();
            match placements.upsert(config) {
                Ok(_) => stats.placements_loaded += 1,
                Err(e) => {
                    warn!(scope = %scope, error = %e, "Rejected placement config");
                    stats.placements_rejected += 1;
                }
            }
        }

        info!(
            candidates = stats.candidates_loaded,
            placements = stats.placements_loaded,
            rejected = stats.candidates_rejected + stats.placements_rejected,
            "Catalog loaded"
        );
        stats
    }

    /// Small demo catalog for development runs without a catalog file.
    pub fn demo() -> Self {
        let now = Utc::now();
        let make = |name: &str, headline: &str, position: &str, priority: u8, cap: Option<u32>| Candidate {
            id: Uuid::new_v4(),
            name: name.to_string(),
            internal_notes: None,
            creative: Creative {
                headline: headline.to_string(),
                body: None,
                image_url: Some(format!("https://cdn.example.com/creative/{}.png", name.to_lowercase().replace(' ', "-"))),
                video_url: None,
                html: None,
                call_to_action: Some("Learn more".to_string()),
            },
            link_url: "https://example.com/landing".to_string(),
            tracking: Some(TrackingParams {
                utm_source: Some("adserve".to_string()),
                utm_medium: Some("display".to_string()),
                utm_campaign: Some(name.to_lowercase().replace(' ', "_")),
                utm_term: None,
                utm_content: None,
            }),
            open_in_new_tab: true,
            targeting: TargetingRules::default(),
            placements: vec![PlacementAssignment {
                position: position.to_string(),
                priority,
                frequency_cap: cap,
            }],
            schedule: Schedule {
                start: now - Duration::days(1),
                end: Some(now + Duration::days(30)),
            },
            budget: Budget::default(),
            performance: Performance::default(),
            status: CandidateStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let header_a = make("Spring Sale", "Spring sale: 20% off", "header", 8, Some(5));
        let header_b = make("Newsletter", "Get the weekly digest", "header", 3, None);
        let mut sidebar = make("Mobile App", "Read on the go", "sidebar", 5, Some(3));
        sidebar.targeting.device_types = vec![DeviceType::Mobile, DeviceType::Tablet];

        let global = PlacementConfig {
            id: Uuid::new_v4(),
            scope: ConfigScope::Global,
            slots: vec![SlotConfig {
                position: "header".to_string(),
                candidate_ids: vec![header_a.id, header_b.id],
                rotation: RotationPolicy::Weighted,
                enabled: true,
            }],
        };

        Self {
            candidates: vec![header_a, header_b, sidebar],
            placements: vec![global],
        }
    }
}
