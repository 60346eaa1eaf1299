//! Placement configuration: per-page, per-category and global slot pools.

use crate::error::{EngineError, EngineResult};
use crate::types::CandidateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a configuration applies to. Resolution precedence is
/// `Page` > `Category` > `Global`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConfigScope {
    Page(String),
    Category(String),
    Global,
}

impl std::fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigScope::Page(id) => write!(f, "page:{id}"),
            ConfigScope::Category(id) => write!(f, "category:{id}"),
            ConfigScope::Global => f.write_str("global"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    Sequential,
    Random,
    #[default]
    Weighted,
    ABTest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotConfig {
    pub position: String,
    pub candidate_ids: Vec<CandidateId>,
    #[serde(default)]
    pub rotation: RotationPolicy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementConfig {
    pub id: Uuid,
    pub scope: ConfigScope,
    pub slots: Vec<SlotConfig>,
}

impl PlacementConfig {
    /// The enabled slot entry for `position`, if any.
    pub fn enabled_slot(&self, position: &str) -> Option<&SlotConfig> {
        self.slots
            .iter()
            .find(|s| s.position == position && s.enabled)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = std::collections::HashSet::new();
        for slot in &self.slots {
            if slot.position.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "placement config {}: slot position must not be empty",
                    self.id
                )));
            }
            if !seen.insert(slot.position.as_str()) {
                return Err(EngineError::Validation(format!(
                    "placement config {}: duplicate slot '{}'",
                    self.id, slot.position
                )));
            }
        }
        if let ConfigScope::Page(key) | ConfigScope::Category(key) = &self.scope {
            if key.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "placement config {}: scope key must not be empty",
                    self.id
                )));
            }
        }
        Ok(())
    }
}
