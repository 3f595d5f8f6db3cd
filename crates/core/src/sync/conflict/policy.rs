//! Per-entity conflict resolution table

use std::collections::HashMap;

use tipsync_domain::constants::{
    ENTITY_ADDRESS, ENTITY_CONFIG, ENTITY_COUNTER, ENTITY_DELIVERY, ENTITY_USER_PROFILE,
};
use tipsync_domain::{ConflictType, ResolutionStrategy};

/// Strategy lookup keyed by conflict type first, then entity type.
///
/// The default table:
/// - `delivery` → client wins (tip corrections are user-initiated)
/// - `address` → merge (order id lists only grow)
/// - `userProfile`, `config`, `counter` → server wins
/// - `version` and `unknown` conflicts → server wins for every entity
/// - anything else → client wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    by_conflict: HashMap<ConflictType, ResolutionStrategy>,
    by_entity: HashMap<String, ResolutionStrategy>,
    fallback: ResolutionStrategy,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::new(ResolutionStrategy::ClientWins)
            .with_conflict_strategy(ConflictType::Version, ResolutionStrategy::ServerWins)
            .with_conflict_strategy(ConflictType::Unknown, ResolutionStrategy::ServerWins)
            .with_entity_strategy(ENTITY_DELIVERY, ResolutionStrategy::ClientWins)
            .with_entity_strategy(ENTITY_ADDRESS, ResolutionStrategy::Merge)
            .with_entity_strategy(ENTITY_USER_PROFILE, ResolutionStrategy::ServerWins)
            .with_entity_strategy(ENTITY_CONFIG, ResolutionStrategy::ServerWins)
            .with_entity_strategy(ENTITY_COUNTER, ResolutionStrategy::ServerWins)
    }
}

impl ResolutionPolicy {
    /// Empty table that always answers `fallback`.
    pub fn new(fallback: ResolutionStrategy) -> Self {
        Self { by_conflict: HashMap::new(), by_entity: HashMap::new(), fallback }
    }

    #[must_use]
    pub fn with_entity_strategy(
        mut self,
        entity_type: impl Into<String>,
        strategy: ResolutionStrategy,
    ) -> Self {
        self.by_entity.insert(entity_type.into(), strategy);
        self
    }

    /// Override every entity for one conflict type.
    #[must_use]
    pub fn with_conflict_strategy(
        mut self,
        conflict_type: ConflictType,
        strategy: ResolutionStrategy,
    ) -> Self {
        self.by_conflict.insert(conflict_type, strategy);
        self
    }

    pub fn fallback(&self) -> ResolutionStrategy {
        self.fallback
    }

    pub fn recommended_strategy(
        &self,
        conflict_type: ConflictType,
        entity_type: &str,
    ) -> ResolutionStrategy {
        self.by_conflict
            .get(&conflict_type)
            .or_else(|| self.by_entity.get(entity_type))
            .copied()
            .unwrap_or(self.fallback)
    }
}
