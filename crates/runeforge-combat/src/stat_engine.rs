//! Entity → stat container registry.
//!
//! This module provides:
//! - Lazy per-entity containers
//! - Cached, clamped stat reads
//! - Modifier application with collision policies
//! - Expiry sweeps and teardown with removal announcements

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use runeforge_common::{ContractError, ContractResult, EntityId, ModifierId, StatId, Timestamp};

use crate::definitions::{StatDefinition, StatRegistry};
use crate::events::{CombatEvent, EventBus, RemovalReason};
use crate::modifier::Modifier;
use crate::stat_container::{AddOutcome, BaseSource, StatBreakdown, StatContainer};

/// Default threshold below which base changes are not announced.
pub const DEFAULT_CHANGE_EPSILON: f32 = 1.0e-4;

/// Stat containers for every live entity.
#[derive(Debug)]
pub struct StatEngine {
    definitions: StatRegistry,
    containers: AHashMap<EntityId, StatContainer>,
    now: Timestamp,
    epsilon: f32,
    events: EventBus,
}

impl StatEngine {
    /// Create an engine over a definition registry.
    #[must_use]
    pub fn new(definitions: StatRegistry, events: EventBus) -> Self {
        Self {
            definitions,
            containers: AHashMap::new(),
            now: 0.0,
            epsilon: DEFAULT_CHANGE_EPSILON,
            events,
        }
    }

    /// Set the change-notification epsilon.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon.abs();
        self
    }

    /// Stat definitions.
    #[must_use]
    pub fn definitions(&self) -> &StatRegistry {
        &self.definitions
    }

    /// Register a definition late; cached values of that stat are dropped.
    pub fn register_stat(&mut self, definition: StatDefinition) {
        let id = definition.id.clone();
        self.definitions.register(definition);
        for container in self.containers.values_mut() {
            container.invalidate(&id);
        }
    }

    /// Time of the last update.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Event bus handle.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------------

    /// Container of an entity, if it exists.
    #[must_use]
    pub fn container(&self, entity: EntityId) -> Option<&StatContainer> {
        self.containers.get(&entity)
    }

    /// Container of an entity, created on first access.
    pub fn container_mut(&mut self, entity: EntityId) -> &mut StatContainer {
        self.containers
            .entry(entity)
            .or_insert_with(|| StatContainer::new(entity))
    }

    /// Whether an entity has a container.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.containers.contains_key(&entity)
    }

    /// Number of live containers.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.containers.len()
    }

    /// Ids of every entity with a container.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.containers.keys().copied()
    }

    /// Tear down an entity, announcing removal of each modifier first.
    ///
    /// Idempotent: returns false if the entity had no container.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        let Some(mut container) = self.containers.remove(&entity) else {
            return false;
        };
        for modifier in container.clear() {
            self.announce_removed(entity, modifier, RemovalReason::Teardown);
        }
        self.events.publish(CombatEvent::EntityRemoved { entity });
        debug!(%entity, "stat container removed");
        true
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Resolved stat value (cached, clamped).
    pub fn get(&mut self, entity: EntityId, stat: &StatId) -> f32 {
        let now = self.now;
        let definitions = &self.definitions;
        self.containers
            .entry(entity)
            .or_insert_with(|| StatContainer::new(entity))
            .value(stat, definitions, now)
    }

    /// Resolved stat value without creating a container or filling the cache.
    #[must_use]
    pub fn peek(&self, entity: EntityId, stat: &StatId) -> f32 {
        match self.containers.get(&entity) {
            Some(container) => container.peek(stat, &self.definitions, self.now),
            None => self.definitions.clamp(stat, self.definitions.default_of(stat)),
        }
    }

    /// Base value (override, else explicit, else default).
    #[must_use]
    pub fn get_base(&self, entity: EntityId, stat: &StatId) -> f32 {
        self.containers.get(&entity).map_or_else(
            || self.definitions.default_of(stat),
            |c| c.base(stat, &self.definitions),
        )
    }

    /// Phase-ordered breakdown of a stat.
    #[must_use]
    pub fn breakdown(&self, entity: EntityId, stat: &StatId) -> StatBreakdown {
        match self.containers.get(&entity) {
            Some(container) => container.breakdown(stat, &self.definitions, self.now),
            None => StatContainer::new(entity).breakdown(stat, &self.definitions, self.now),
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Set an explicit base. Announces the change if it exceeds the epsilon.
    pub fn set_base(&mut self, entity: EntityId, stat: &StatId, value: f32) -> ContractResult<()> {
        check_entity(entity, "set_base")?;
        stat.validate()?;
        ContractError::check_finite("base value", f64::from(value))?;

        let definitions = &self.definitions;
        let old = self
            .containers
            .entry(entity)
            .or_insert_with(|| StatContainer::new(entity))
            .set_base(stat, value, definitions);
        if (value - old).abs() > self.epsilon {
            self.events.publish(CombatEvent::StatChanged {
                entity,
                stat: stat.clone(),
                old,
                new: value,
            });
        }
        Ok(())
    }

    /// Push a host-authoritative base. Never announced.
    pub fn set_override(&mut self, entity: EntityId, stat: &StatId, value: f32) -> ContractResult<()> {
        check_entity(entity, "set_override")?;
        stat.validate()?;
        ContractError::check_finite("override value", f64::from(value))?;
        self.container_mut(entity).set_override(stat, value);
        Ok(())
    }

    /// Shift the winning base by `delta`.
    ///
    /// An active override is shifted in place and the explicit base is left
    /// untouched; otherwise the explicit (or default) base is rewritten.
    pub fn adjust_base(&mut self, entity: EntityId, stat: &StatId, delta: f32) -> ContractResult<()> {
        ContractError::check_finite("base delta", f64::from(delta))?;
        let (value, source) = self.containers.get(&entity).map_or_else(
            || (self.definitions.default_of(stat), BaseSource::Default),
            |c| c.base_with_source(stat, &self.definitions),
        );
        match source {
            BaseSource::Override => self.set_override(entity, stat, value + delta),
            BaseSource::Explicit | BaseSource::Default => self.set_base(entity, stat, value + delta),
        }
    }

    /// Drop a host-authoritative base.
    pub fn clear_override(&mut self, entity: EntityId, stat: &StatId) -> bool {
        self.containers
            .get_mut(&entity)
            .is_some_and(|c| c.clear_override(stat))
    }

    /// Apply a modifier. Returns whether it was accepted.
    pub fn add_modifier(&mut self, entity: EntityId, modifier: Modifier) -> ContractResult<bool> {
        self.apply_modifier(entity, modifier)
            .map(|outcome| outcome.accepted())
    }

    /// Apply a modifier, reporting how its collision was resolved.
    pub fn apply_modifier(
        &mut self,
        entity: EntityId,
        modifier: Modifier,
    ) -> ContractResult<AddOutcome> {
        check_entity(entity, "add_modifier")?;
        modifier.validate()?;

        let stat = modifier.stat.clone();
        let now = self.now;
        let container = self.container_mut(entity);
        let replaced = container.modifier(&stat, &modifier.id).is_some();
        let outcome = container.add_modifier(modifier, now);

        if let Some(id) = outcome.id() {
            if matches!(outcome, AddOutcome::Replaced(_)) && replaced {
                self.events.publish(CombatEvent::ModifierRemoved {
                    entity,
                    stat: stat.clone(),
                    modifier: id.clone(),
                    reason: RemovalReason::Replaced,
                });
            }
            self.events.publish(CombatEvent::ModifierAdded {
                entity,
                stat,
                modifier: id.clone(),
            });
        }
        Ok(outcome)
    }

    /// Remove a modifier by id. A miss returns false and changes nothing.
    pub fn remove_modifier(&mut self, entity: EntityId, stat: &StatId, id: &ModifierId) -> bool {
        let removed = self
            .containers
            .get_mut(&entity)
            .and_then(|c| c.remove_modifier(stat, id));
        match removed {
            Some(modifier) => {
                self.announce_removed(entity, modifier, RemovalReason::Explicit);
                true
            },
            None => false,
        }
    }

    /// Remove every modifier an entity holds from `source`. Returns the count.
    pub fn remove_modifiers_from_source(&mut self, entity: EntityId, source: &str) -> usize {
        let removed = self
            .containers
            .get_mut(&entity)
            .map(|c| c.remove_from_source(source))
            .unwrap_or_default();
        let count = removed.len();
        for modifier in removed {
            self.announce_removed(entity, modifier, RemovalReason::Source);
        }
        count
    }

    /// Advance time and sweep expired modifiers. Returns how many expired.
    pub fn update(&mut self, now: Timestamp) -> usize {
        self.now = now;
        let mut expired = Vec::new();
        for (entity, container) in &mut self.containers {
            for modifier in container.sweep_expired(now) {
                expired.push((*entity, modifier));
            }
        }
        let count = expired.len();
        for (entity, modifier) in expired {
            self.announce_removed(entity, modifier, RemovalReason::Expired);
        }
        count
    }

    fn announce_removed(&self, entity: EntityId, modifier: Modifier, reason: RemovalReason) {
        self.events.publish(CombatEvent::ModifierRemoved {
            entity,
            stat: modifier.stat,
            modifier: modifier.id,
            reason,
        });
    }
}

fn check_entity(entity: EntityId, operation: &'static str) -> ContractResult<()> {
    if entity.is_valid() {
        Ok(())
    } else {
        Err(ContractError::NullEntity { operation })
    }
}

// ============================================================================
// Shared access
// ============================================================================

/// Thread-safe handle to a [`StatEngine`].
///
/// Creation, removal and bulk updates take the write lock, so they are
/// mutually exclusive when the host drives the registry from several threads.
#[derive(Debug, Clone)]
pub struct SharedStatEngine {
    inner: Arc<RwLock<StatEngine>>,
}

impl SharedStatEngine {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: StatEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Read access.
    pub fn read(&self) -> RwLockReadGuard<'_, StatEngine> {
        self.inner.read()
    }

    /// Write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, StatEngine> {
        self.inner.write()
    }

    /// Create a container for an entity.
    pub fn create(&self, entity: EntityId) {
        self.inner.write().container_mut(entity);
    }

    /// Tear down an entity.
    pub fn remove(&self, entity: EntityId) -> bool {
        self.inner.write().remove_entity(entity)
    }

    /// Sweep expired modifiers across all entities.
    pub fn update(&self, now: Timestamp) -> usize {
        self.inner.write().update(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::stats;
    use crate::modifier::StackPolicy;

    fn engine() -> StatEngine {
        StatEngine::new(StatRegistry::with_core_stats(), EventBus::new(256))
    }

    fn armor() -> StatId {
        StatId::from(stats::ARMOR)
    }

    #[test]
    fn test_lazy_container_and_defaults() {
        let mut engine = engine();
        let e = EntityId::from_raw(10);
        assert!(!engine.contains(e));
        assert_eq!(engine.peek(e, &StatId::from(stats::CRIT_DAMAGE)), 1.5);
        assert!(!engine.contains(e));

        assert_eq!(engine.get(e, &StatId::from("unregistered_stat")), 0.0);
        assert!(engine.contains(e));
    }

    #[test]
    fn test_set_base_notifies_past_epsilon() {
        let mut engine = engine();
        let e = EntityId::from_raw(11);
        engine.set_base(e, &armor(), 10.0).ok();
        engine.set_base(e, &armor(), 10.000_01).ok();

        let changes = engine
            .events()
            .drain()
            .into_iter()
            .filter(|ev| matches!(ev, CombatEvent::StatChanged { .. }))
            .count();
        assert_eq!(changes, 1);
        assert!((engine.get(e, &armor()) - 10.000_01).abs() < 1e-6);
    }

    #[test]
    fn test_contract_violations_fail_fast() {
        let mut engine = engine();
        assert!(engine
            .add_modifier(EntityId::NULL, Modifier::flat("a", "armor", 1.0))
            .is_err());
        assert!(engine
            .add_modifier(EntityId::from_raw(1), Modifier::flat("", "armor", 1.0))
            .is_err());
        assert!(engine
            .set_base(EntityId::from_raw(1), &armor(), f32::INFINITY)
            .is_err());
    }

    #[test]
    fn test_expiry_sweep_invalidates() {
        let mut engine = engine();
        let e = EntityId::from_raw(12);
        engine
            .add_modifier(e, Modifier::flat("troll_set", "armor", 30.0).with_duration(6.0))
            .ok();
        assert_eq!(engine.get(e, &armor()), 30.0);

        assert_eq!(engine.update(5.9), 0);
        assert_eq!(engine.get(e, &armor()), 30.0);
        assert_eq!(engine.update(6.1), 1);
        assert_eq!(engine.get(e, &armor()), 0.0);
    }

    #[test]
    fn test_stack_policy_past_cap() {
        let mut engine = engine();
        let e = EntityId::from_raw(13);
        let stack = || {
            Modifier::flat("frenzy", "armor", 5.0)
                .with_duration(4.0)
                .with_stacking(StackPolicy::Stack, 3)
        };
        for step in 0..4 {
            engine.update(f64::from(step));
            assert_eq!(engine.add_modifier(e, stack()), Ok(true));
        }
        assert_eq!(engine.get(e, &armor()), 15.0);

        // Refreshed at t=3, so still alive at t=6.5.
        engine.update(6.5);
        assert_eq!(engine.get(e, &armor()), 15.0);
    }

    #[test]
    fn test_remove_nonexistent_returns_false() {
        let mut engine = engine();
        let e = EntityId::from_raw(14);
        engine.add_modifier(e, Modifier::flat("a", "armor", 1.0)).ok();
        engine.get(e, &armor());

        assert!(!engine.remove_modifier(e, &armor(), &ModifierId::from("b")));
        assert!(engine.container(e).is_some_and(|c| c.is_cached(&armor())));
        assert!(engine.remove_modifier(e, &armor(), &ModifierId::from("a")));
    }

    #[test]
    fn test_remove_from_source_counts() {
        let mut engine = engine();
        let e = EntityId::from_raw(15);
        engine
            .add_modifier(e, Modifier::flat("a", "armor", 1.0).with_source("padded"))
            .ok();
        engine
            .add_modifier(e, Modifier::flat("b", "max_health", 1.0).with_source("padded"))
            .ok();
        engine
            .add_modifier(e, Modifier::flat("c", "armor", 1.0).with_source("other"))
            .ok();
        assert_eq!(engine.remove_modifiers_from_source(e, "padded"), 2);
        assert_eq!(engine.remove_modifiers_from_source(e, "padded"), 0);
        assert_eq!(engine.get(e, &armor()), 1.0);
    }

    #[test]
    fn test_teardown_announces_each_modifier() {
        let mut engine = engine();
        let e = EntityId::from_raw(16);
        engine.add_modifier(e, Modifier::flat("a", "armor", 1.0)).ok();
        engine.add_modifier(e, Modifier::flat("b", "armor", 2.0)).ok();
        engine.events().drain();

        assert!(engine.remove_entity(e));
        assert!(!engine.remove_entity(e));

        let events = engine.events().drain();
        let teardowns = events
            .iter()
            .filter(|ev| {
                matches!(
                    ev,
                    CombatEvent::ModifierRemoved {
                        reason: RemovalReason::Teardown,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(teardowns, 2);
        assert_eq!(events.last(), Some(&CombatEvent::EntityRemoved { entity: e }));
    }

    #[test]
    fn test_late_registration_invalidates() {
        let mut engine = engine();
        let e = EntityId::from_raw(17);
        let poise = StatId::from("poise");
        engine.add_modifier(e, Modifier::flat("a", "poise", 80.0)).ok();
        assert_eq!(engine.get(e, &poise), 80.0);

        engine.register_stat(StatDefinition::new("poise", 0.0).with_max(50.0));
        assert_eq!(engine.get(e, &poise), 50.0);
    }

    #[test]
    fn test_adjust_base_follows_override() {
        let mut engine = engine();
        let e = EntityId::from_raw(4);
        let stamina = StatId::from("stamina");
        engine.set_base(e, &stamina, 100.0).expect("valid");
        engine.adjust_base(e, &stamina, -30.0).expect("valid");
        assert_eq!(engine.get_base(e, &stamina), 70.0);

        engine.set_override(e, &stamina, 50.0).expect("valid");
        engine.adjust_base(e, &stamina, -30.0).expect("valid");
        assert_eq!(engine.get(e, &stamina), 20.0);

        assert!(engine.clear_override(e, &stamina));
        assert_eq!(engine.get(e, &stamina), 70.0);
        assert!(engine.adjust_base(e, &stamina, f32::NAN).is_err());
    }

    #[test]
    fn test_shared_engine() {
        let shared = SharedStatEngine::new(engine());
        let e = EntityId::from_raw(18);
        shared.create(e);
        shared
            .write()
            .add_modifier(e, Modifier::flat("a", "armor", 3.0).with_duration(1.0))
            .ok();
        assert_eq!(shared.read().peek(e, &armor()), 3.0);
        assert_eq!(shared.update(2.0), 1);
        assert!(shared.remove(e));
    }
}
