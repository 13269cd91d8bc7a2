use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::collection::config::CollectionConfig;

/// Thread-safe map of collection name to its latest configuration.
/// Lookups return independent clones so callers work lock-free on
/// snapshots.
#[derive(Default)]
pub struct CollectionConfigs {
    configs: Mutex<BTreeMap<String, CollectionConfig>>,
}

impl CollectionConfigs {
    pub fn new() -> Self {
        CollectionConfigs::default()
    }

    pub fn get(&self, coll_name: &str) -> Option<CollectionConfig> {
        self.configs.lock().get(coll_name).cloned()
    }

    pub fn set(&self, coll_name: &str, config: CollectionConfig) {
        self.configs.lock().insert(coll_name.to_string(), config);
    }

    pub fn remove(&self, coll_name: &str) {
        self.configs.lock().remove(coll_name);
    }
}
