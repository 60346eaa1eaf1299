//! In-memory placement configuration store. One configuration per scope.

use crate::PlacementStore;
use adserve_core::placement::{ConfigScope, PlacementConfig};
use adserve_core::EngineResult;
use dashmap::DashMap;
use tracing::info;

pub struct MemoryPlacementStore {
    configs: DashMap<ConfigScope, PlacementConfig>,
}

impl MemoryPlacementStore {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
        }
    }
}

impl Default for MemoryPlacementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStore for MemoryPlacementStore {
    fn config_for(&self, scope: &ConfigScope) -> EngineResult<Option<PlacementConfig>> {
        Ok(self.configs.get(scope).map(|c| c.value().clone()))
    }

    fn upsert(&self, config: PlacementConfig) -> EngineResult<Option<PlacementConfig>> {
        config.validate()?;
        info!(scope = %config.scope, slots = config.slots.len(), "Placement config stored");
        Ok(self.configs.insert(config.scope.clone(), config))
    }

    fn remove(&self, scope: &ConfigScope) -> EngineResult<bool> {
        Ok(self.configs.remove(scope).is_some())
    }

    fn list(&self) -> EngineResult<Vec<PlacementConfig>> {
        Ok(self.configs.iter().map(|c| c.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::placement::{RotationPolicy, SlotConfig};
    use uuid::Uuid;

    fn make_config(scope: ConfigScope) -> PlacementConfig {
        PlacementConfig {
            id: Uuid::new_v4(),
            scope,
            slots: vec![SlotConfig {
                position: "header".into(),
                candidate_ids: vec![],
                rotation: RotationPolicy::Random,
                enabled: true,
            }],
        }
    }

    #[test]
    fn test_one_config_per_scope() {
        let store = MemoryPlacementStore::new();
        let first = make_config(ConfigScope::Page("home".into()));
        let second = make_config(ConfigScope::Page("home".into()));
        assert!(store.upsert(first.clone()).unwrap().is_none());
        let replaced = store.upsert(second.clone()).unwrap();
        assert_eq!(replaced.map(|c| c.id), Some(first.id));
        assert_eq!(store.list().unwrap().len(), 1);

        let got = store.config_for(&ConfigScope::Page("home".into())).unwrap();
        assert_eq!(got.map(|c| c.id), Some(second.id));
    }

    #[test]
    fn test_single_global_config() {
        let store = MemoryPlacementStore::new();
        store.upsert(make_config(ConfigScope::Global)).unwrap();
        store.upsert(make_config(ConfigScope::Global)).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.remove(&ConfigScope::Global).unwrap());
        assert!(store.config_for(&ConfigScope::Global).unwrap().is_none());
    }
}
