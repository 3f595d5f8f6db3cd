//! Entity type to remote collection routing

use std::collections::BTreeMap;

use tipsync_domain::{default_collections, Result, SyncConfig, TipSyncError};

/// Routes entity types to the remote collection that stores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMap {
    routes: BTreeMap<String, String>,
}

impl Default for CollectionMap {
    fn default() -> Self {
        Self { routes: default_collections() }
    }
}

impl CollectionMap {
    pub fn new(routes: BTreeMap<String, String>) -> Self {
        Self { routes }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.collections.clone())
    }

    #[must_use]
    pub fn with_route(mut self, entity_type: impl Into<String>, collection: impl Into<String>) -> Self {
        self.routes.insert(entity_type.into(), collection.into());
        self
    }

    /// Collection for `entity_type`; unknown types are invalid input.
    pub fn collection_for(&self, entity_type: &str) -> Result<&str> {
        self.routes
            .get(entity_type)
            .map(String::as_str)
            .ok_or_else(|| TipSyncError::InvalidInput(format!("Unknown entity type: {entity_type}")))
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}
