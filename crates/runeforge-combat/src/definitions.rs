//! Stat definitions and resource pools.
//!
//! Content modules register definitions in any order; lookups against ids
//! nobody registered resolve to a default of 0 without bounds.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use runeforge_common::StatId;

/// Well-known stat ids read by the combat core.
pub mod stats {
    /// Current health (usually host-pushed as an override).
    pub const HEALTH: &str = "health";
    /// Maximum health.
    pub const MAX_HEALTH: &str = "max_health";
    /// Current stamina.
    pub const STAMINA: &str = "stamina";
    /// Maximum stamina.
    pub const MAX_STAMINA: &str = "max_stamina";
    /// Current eitr (magic resource).
    pub const EITR: &str = "eitr";
    /// Maximum eitr.
    pub const MAX_EITR: &str = "max_eitr";
    /// Armor, reduces physical damage with diminishing returns.
    pub const ARMOR: &str = "armor";
    /// Physical resistance in percent.
    pub const PHYSICAL_RESIST: &str = "physical_resist";
    /// Flat physical damage bonus, spread over existing physical entries.
    pub const PHYSICAL_DAMAGE_BONUS: &str = "physical_damage_bonus";
    /// Critical chance (0.0-1.0).
    pub const CRIT_CHANCE: &str = "crit_chance";
    /// Critical damage multiplier.
    pub const CRIT_DAMAGE: &str = "crit_damage";
    /// Cooldown reduction (0.0-1.0).
    pub const COOLDOWN_REDUCTION: &str = "cooldown_reduction";
    /// Strength, drives optional global scaling.
    pub const STRENGTH: &str = "strength";
}

/// Bounds and default for one stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatDefinition {
    /// Stat id.
    pub id: StatId,
    /// Value used when no base is set.
    pub default: f32,
    /// Lower bound.
    pub min: Option<f32>,
    /// Upper bound.
    pub max: Option<f32>,
}

impl StatDefinition {
    /// Create an unbounded definition.
    pub fn new(id: impl Into<StatId>, default: f32) -> Self {
        Self {
            id: id.into(),
            default,
            min: None,
            max: None,
        }
    }

    /// Set both bounds.
    #[must_use]
    pub fn with_bounds(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set lower bound.
    #[must_use]
    pub fn with_min(mut self, min: f32) -> Self {
        self.min = Some(min);
        self
    }

    /// Set upper bound.
    #[must_use]
    pub fn with_max(mut self, max: f32) -> Self {
        self.max = Some(max);
        self
    }

    /// Clamp a value to the defined bounds.
    #[must_use]
    pub fn clamp(&self, value: f32) -> f32 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

/// Registry of stat definitions.
#[derive(Debug, Clone, Default)]
pub struct StatRegistry {
    definitions: AHashMap<StatId, StatDefinition>,
}

impl StatRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the stats the combat core reads.
    #[must_use]
    pub fn with_core_stats() -> Self {
        let mut registry = Self::new();
        registry.register(StatDefinition::new(stats::MAX_HEALTH, 100.0).with_min(1.0));
        registry.register(StatDefinition::new(stats::HEALTH, 100.0).with_min(0.0));
        registry.register(StatDefinition::new(stats::MAX_STAMINA, 100.0).with_min(0.0));
        registry.register(StatDefinition::new(stats::STAMINA, 100.0).with_min(0.0));
        registry.register(StatDefinition::new(stats::MAX_EITR, 0.0).with_min(0.0));
        registry.register(StatDefinition::new(stats::EITR, 0.0).with_min(0.0));
        registry.register(StatDefinition::new(stats::ARMOR, 0.0).with_min(0.0));
        registry.register(StatDefinition::new(stats::CRIT_CHANCE, 0.0).with_bounds(0.0, 1.0));
        registry.register(StatDefinition::new(stats::CRIT_DAMAGE, 1.5).with_min(1.0));
        registry.register(
            StatDefinition::new(stats::COOLDOWN_REDUCTION, 0.0).with_bounds(0.0, 0.9),
        );
        registry
    }

    /// Register or replace a definition. Returns the previous one.
    pub fn register(&mut self, definition: StatDefinition) -> Option<StatDefinition> {
        self.definitions.insert(definition.id.clone(), definition)
    }

    /// Remove a definition.
    pub fn unregister(&mut self, id: &StatId) -> Option<StatDefinition> {
        self.definitions.remove(id)
    }

    /// Look up a definition.
    #[must_use]
    pub fn get(&self, id: &StatId) -> Option<&StatDefinition> {
        self.definitions.get(id)
    }

    /// Default value, 0 for unknown stats.
    #[must_use]
    pub fn default_of(&self, id: &StatId) -> f32 {
        self.get(id).map_or(0.0, |d| d.default)
    }

    /// Clamp a value to a stat's bounds; unknown stats are unbounded.
    #[must_use]
    pub fn clamp(&self, id: &StatId, value: f32) -> f32 {
        self.get(id).map_or(value, |d| d.clamp(value))
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ============================================================================
// Resource Pools
// ============================================================================

/// A spendable resource backed by a current and a maximum stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Resource type name used by ability costs (lowercase).
    pub resource: String,
    /// Stat holding the current amount.
    pub current: StatId,
    /// Stat holding the maximum.
    pub max: StatId,
}

/// Known resource types.
///
/// Ability costs naming a resource that is not listed here are always
/// affordable.
#[derive(Debug, Clone)]
pub struct ResourcePools {
    pools: AHashMap<String, ResourcePool>,
}

impl Default for ResourcePools {
    fn default() -> Self {
        let mut pools = Self {
            pools: AHashMap::new(),
        };
        pools.register("health", stats::HEALTH, stats::MAX_HEALTH);
        pools.register("stamina", stats::STAMINA, stats::MAX_STAMINA);
        pools.register("eitr", stats::EITR, stats::MAX_EITR);
        pools
    }
}

impl ResourcePools {
    /// Create the built-in health/stamina/eitr set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host-defined resource type.
    pub fn register(
        &mut self,
        resource: &str,
        current: impl Into<StatId>,
        max: impl Into<StatId>,
    ) {
        let resource = resource.trim().to_lowercase();
        self.pools.insert(
            resource.clone(),
            ResourcePool {
                resource,
                current: current.into(),
                max: max.into(),
            },
        );
    }

    /// Look up a resource type (case-insensitive).
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&ResourcePool> {
        self.pools.get(&resource.trim().to_lowercase())
    }
}
