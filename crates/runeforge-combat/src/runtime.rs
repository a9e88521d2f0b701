//! Combat runtime.
//!
//! Owns the four engines and wires them together: proc dispatch from the
//! pipeline into effects and items, deferred commands from callbacks, ability
//! executions into the pipeline, and entity teardown across all of them.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use fastrand::Rng;
use tracing::{debug, info, warn};

use runeforge_common::{
    AbilityId, Clock, ContractError, ContractResult, EffectId, EntityId, ItemId, StatId,
    Timestamp,
};

use crate::ability::{
    AbilityDefinition, AbilityEngine, AbilityExecution, AbilityState, CastError, CastOutcome,
    EffectTarget,
};
use crate::command::{CommandBuffer, EffectCommand};
use crate::config::CombatConfig;
use crate::damage::{DamageInstance, DamageType};
use crate::definitions::{stats, ResourcePools, StatDefinition, StatRegistry};
use crate::effect::{DispelKind, EffectDefinition, EffectEngine, EffectInstance};
use crate::events::{CombatEvent, EventBus};
use crate::item_proc::{ItemProcDefinition, ItemProcLayer};
use crate::pipeline::{DamageHook, DamageMode, DamagePipeline, ProcEvent, ProcSink};
use crate::stat_engine::StatEngine;

/// Host-side view of which entities are alive.
pub trait EntityDirectory {
    /// Whether the entity still exists.
    fn is_alive(&self, entity: EntityId) -> bool;
}

impl<F> EntityDirectory for F
where
    F: Fn(EntityId) -> bool,
{
    fn is_alive(&self, entity: EntityId) -> bool {
        self(entity)
    }
}

/// Routes pipeline proc events to effect and item procs.
struct ProcRouter<'a> {
    effects: &'a mut EffectEngine,
    items: &'a mut ItemProcLayer,
    commands: &'a mut CommandBuffer,
    now: Timestamp,
}

impl ProcSink for ProcRouter<'_> {
    fn dispatch(&mut self, event: ProcEvent, stats: &StatEngine, rng: &mut Rng, hit: &DamageInstance) {
        self.effects
            .dispatch(event, hit, stats, rng, self.commands, self.now);
        self.items
            .dispatch(event, hit, stats, rng, self.commands, self.now);
    }
}

/// The combat core.
pub struct CombatRuntime {
    config: CombatConfig,
    stats: StatEngine,
    pipeline: DamagePipeline,
    effects: EffectEngine,
    items: ItemProcLayer,
    abilities: AbilityEngine,
    effect_templates: AHashMap<EffectId, Arc<EffectDefinition>>,
    events: EventBus,
    rng: Rng,
    now: Timestamp,
}

impl std::fmt::Debug for CombatRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatRuntime")
            .field("now", &self.now)
            .field("entities", &self.stats.entity_count())
            .field("pending_events", &self.events.pending_count())
            .finish_non_exhaustive()
    }
}

impl CombatRuntime {
    /// Create a runtime with the core stat definitions.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        Self::with_registry(config, StatRegistry::with_core_stats())
    }

    /// Create a runtime with a host-supplied stat registry.
    #[must_use]
    pub fn with_registry(mut config: CombatConfig, registry: StatRegistry) -> Self {
        config.validate();
        let events = EventBus::new(config.event_bus_capacity);
        let rng = config.rng_seed.map_or_else(Rng::new, Rng::with_seed);
        info!(
            stats = registry.len(),
            seeded = config.rng_seed.is_some(),
            "combat runtime created"
        );

        Self {
            stats: StatEngine::new(registry, events.clone()).with_epsilon(config.change_epsilon),
            pipeline: DamagePipeline::new(&config, events.clone()),
            effects: EffectEngine::new(events.clone()),
            items: ItemProcLayer::new(events.clone()),
            abilities: AbilityEngine::new(
                ResourcePools::new(),
                config.ability_buff_order,
                events.clone(),
            ),
            effect_templates: AHashMap::new(),
            events,
            rng,
            now: 0.0,
            config,
        }
    }

    // ====== Accessors ======

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Stat engine.
    #[must_use]
    pub fn stats(&self) -> &StatEngine {
        &self.stats
    }

    /// Mutable stat engine.
    pub fn stats_mut(&mut self) -> &mut StatEngine {
        &mut self.stats
    }

    /// Damage pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &DamagePipeline {
        &self.pipeline
    }

    /// Mutable damage pipeline (formulas, hooks).
    pub fn pipeline_mut(&mut self) -> &mut DamagePipeline {
        &mut self.pipeline
    }

    /// Effect engine.
    #[must_use]
    pub fn effects(&self) -> &EffectEngine {
        &self.effects
    }

    /// Ability engine.
    #[must_use]
    pub fn abilities(&self) -> &AbilityEngine {
        &self.abilities
    }

    /// Resource types used by ability costs.
    pub fn resource_pools_mut(&mut self) -> &mut ResourcePools {
        self.abilities.pools_mut()
    }

    /// Event bus shared by every engine.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Take every pending event.
    pub fn drain_events(&self) -> Vec<CombatEvent> {
        self.events.drain()
    }

    // ====== Stats ======

    /// Register a stat definition.
    pub fn register_stat(&mut self, definition: StatDefinition) {
        self.stats.register_stat(definition);
    }

    /// Resolved stat value.
    pub fn stat(&mut self, entity: EntityId, stat: &str) -> f32 {
        self.stats.get(entity, &StatId::from(stat))
    }

    /// Set a base value.
    pub fn set_base(&mut self, entity: EntityId, stat: &str, value: f32) -> ContractResult<()> {
        self.stats.set_base(entity, &StatId::from(stat), value)
    }

    // ====== Time ======

    /// Advance to `now`: modifier expiry, effect ticks and expiry, ability
    /// timers, low-health triggers, then queued commands.
    pub fn update(&mut self, now: Timestamp) {
        self.now = now;
        let mut commands = CommandBuffer::new();

        self.stats.update(now);
        self.effects.update(now, &self.stats, &mut commands);
        for execution in self.abilities.update(now) {
            self.execute_ability(execution, &mut commands);
        }
        self.check_low_health(None, &mut commands);

        self.run(commands);
    }

    /// Advance to the clock's current time.
    pub fn tick(&mut self, clock: &impl Clock) {
        self.update(clock.now());
    }

    /// Re-check low-health triggers of an entity after the host changed its health.
    pub fn notify_health_changed(&mut self, entity: EntityId) {
        let mut commands = CommandBuffer::new();
        self.check_low_health(Some(entity), &mut commands);
        self.run(commands);
    }

    // ====== Damage ======

    /// Run a hit through all ten phases. Returns final damage.
    pub fn process_damage(&mut self, hit: &mut DamageInstance) -> f32 {
        self.deliver(hit, DamageMode::Full)
    }

    /// Single-type hit that skips attacker bonuses and crits.
    pub fn deal_direct_damage(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        damage_type: DamageType,
        amount: f32,
    ) -> f32 {
        let mut hit = DamageInstance::new(attacker, target).with_damage(damage_type, amount);
        self.deliver(&mut hit, DamageMode::Direct)
    }

    /// Unmitigated hit.
    pub fn deal_true_damage(&mut self, attacker: EntityId, target: EntityId, amount: f32) -> f32 {
        let mut hit = DamageInstance::new(attacker, target).with_damage(DamageType::True, amount);
        self.deliver(&mut hit, DamageMode::True)
    }

    /// Apply a damage-over-time debuff ticking at the configured interval.
    pub fn apply_dot(
        &mut self,
        target: EntityId,
        source: Option<EntityId>,
        damage_type: DamageType,
        per_tick: f32,
        duration: f64,
    ) -> ContractResult<Option<u64>> {
        let interval = self.config.dot_tick_interval;
        self.apply_dot_with_interval(target, source, damage_type, per_tick, duration, interval)
    }

    /// Apply a damage-over-time debuff with an explicit tick interval.
    pub fn apply_dot_with_interval(
        &mut self,
        target: EntityId,
        source: Option<EntityId>,
        damage_type: DamageType,
        per_tick: f32,
        duration: f64,
        interval: f64,
    ) -> ContractResult<Option<u64>> {
        if interval <= 0.0 {
            return Err(ContractError::NegativeDuration {
                id: format!("dot_{}", damage_type.name()),
                duration: interval,
            });
        }
        let definition = EffectDefinition::damage_over_time(
            format!("dot_{}", damage_type.name()),
            damage_type,
            duration,
            interval,
        );
        self.apply_effect(target, Arc::new(definition), source, per_tick)
    }

    /// Register a pipeline hook.
    pub fn add_hook(&mut self, name: impl Into<String>, hook: impl DamageHook + 'static) {
        self.pipeline.add_hook(name, hook);
    }

    fn deliver(&mut self, hit: &mut DamageInstance, mode: DamageMode) -> f32 {
        let mut commands = CommandBuffer::new();
        let damage = self.resolve(hit, mode, &mut commands);
        self.run(commands);
        damage
    }

    fn resolve(&mut self, hit: &mut DamageInstance, mode: DamageMode, commands: &mut CommandBuffer) -> f32 {
        let mut router = ProcRouter {
            effects: &mut self.effects,
            items: &mut self.items,
            commands,
            now: self.now,
        };
        self.pipeline
            .process(&mut self.stats, &mut self.rng, &mut router, hit, mode)
    }

    // ====== Effects ======

    /// Register an effect template for [`Self::apply_registered_effect`].
    pub fn register_effect(&mut self, definition: EffectDefinition) -> ContractResult<()> {
        definition.validate()?;
        self.effect_templates
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    /// Registered effect template.
    #[must_use]
    pub fn effect_definition(&self, effect: &EffectId) -> Option<&Arc<EffectDefinition>> {
        self.effect_templates.get(effect)
    }

    /// Apply an effect. Returns the instance id, or None if rejected.
    pub fn apply_effect(
        &mut self,
        owner: EntityId,
        definition: Arc<EffectDefinition>,
        source: Option<EntityId>,
        magnitude: f32,
    ) -> ContractResult<Option<u64>> {
        let mut commands = CommandBuffer::new();
        let applied = self.effects.apply(
            owner,
            definition,
            source,
            magnitude,
            &self.stats,
            &mut commands,
            self.now,
        );
        self.run(commands);
        applied
    }

    /// Apply a registered effect by id. Unknown ids apply nothing.
    pub fn apply_registered_effect(
        &mut self,
        owner: EntityId,
        effect: &EffectId,
        source: Option<EntityId>,
        magnitude: f32,
    ) -> ContractResult<Option<u64>> {
        match self.effect_templates.get(effect) {
            Some(definition) => {
                let definition = Arc::clone(definition);
                self.apply_effect(owner, definition, source, magnitude)
            },
            None => {
                debug!(%owner, %effect, "unknown effect");
                Ok(None)
            },
        }
    }

    /// Remove every instance of an effect.
    pub fn remove_effect(&mut self, owner: EntityId, effect: &EffectId) -> bool {
        let mut commands = CommandBuffer::new();
        let removed = self
            .effects
            .remove(owner, effect, &self.stats, &mut commands, self.now);
        self.run(commands);
        removed
    }

    /// Whether an entity carries an effect.
    #[must_use]
    pub fn has_effect(&self, owner: EntityId, effect: &EffectId) -> bool {
        self.effects.has(owner, effect)
    }

    /// Live effect instances of an entity.
    #[must_use]
    pub fn effects_of(&self, owner: EntityId) -> &[EffectInstance] {
        self.effects.effects(owner)
    }

    /// Remove up to `max` buffs or debuffs, highest priority first.
    pub fn dispel(&mut self, owner: EntityId, kind: DispelKind, max: usize) -> Vec<EffectId> {
        let mut commands = CommandBuffer::new();
        let removed = self
            .effects
            .dispel(owner, kind, max, &self.stats, &mut commands, self.now);
        self.run(commands);
        removed
    }

    // ====== Items ======

    /// Equip an item's procs.
    pub fn equip_item(
        &mut self,
        owner: EntityId,
        item: impl Into<ItemId>,
        procs: Vec<ItemProcDefinition>,
    ) -> ContractResult<()> {
        self.items.equip(owner, item.into(), procs)
    }

    /// Unequip an item's procs.
    pub fn unequip_item(&mut self, owner: EntityId, item: &ItemId) -> bool {
        self.items.unequip(owner, item)
    }

    /// Whether an item's procs are registered.
    #[must_use]
    pub fn is_equipped(&self, owner: EntityId, item: &ItemId) -> bool {
        self.items.is_equipped(owner, item)
    }

    // ====== Abilities ======

    /// Register an ability template.
    pub fn register_ability(&mut self, definition: AbilityDefinition) -> ContractResult<()> {
        self.abilities.register(definition)
    }

    /// Grant an ability. False if the template is unknown.
    pub fn grant_ability(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        self.abilities.grant(caster, ability)
    }

    /// Revoke an ability.
    pub fn revoke_ability(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        self.abilities.revoke(caster, ability)
    }

    /// Disable an ability permanently.
    pub fn disable_ability(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        self.abilities.disable(caster, ability)
    }

    /// Start a cast. Instant casts are delivered before returning.
    pub fn try_cast(
        &mut self,
        caster: EntityId,
        ability: &AbilityId,
        target: Option<EntityId>,
    ) -> Result<CastOutcome, CastError> {
        let outcome = self
            .abilities
            .try_cast(caster, ability, target, &mut self.stats, self.now)?;
        if let CastOutcome::Executing(execution) = &outcome {
            let mut commands = CommandBuffer::new();
            self.execute_ability(execution.clone(), &mut commands);
            self.run(commands);
        }
        Ok(outcome)
    }

    /// Execute an ability at once, skipping cast time, predicate and costs.
    ///
    /// Rejected while the ability is on cooldown, executing or channeling.
    /// A cast still in its cast time is superseded and refunded.
    pub fn force_ability(
        &mut self,
        caster: EntityId,
        ability: &AbilityId,
        target: Option<EntityId>,
        damage_multiplier: f32,
    ) -> Result<(), CastError> {
        let execution = self.abilities.force(
            caster,
            ability,
            target,
            damage_multiplier,
            &mut self.stats,
            self.now,
        )?;
        let mut commands = CommandBuffer::new();
        self.execute_ability(execution, &mut commands);
        self.run(commands);
        Ok(())
    }

    /// Interrupt a cast or channel.
    pub fn interrupt(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        self.abilities.interrupt(caster, ability, &mut self.stats)
    }

    /// Seconds of cooldown left.
    #[must_use]
    pub fn remaining_cooldown(&self, caster: EntityId, ability: &AbilityId) -> f64 {
        self.abilities.remaining_cooldown(caster, ability, self.now)
    }

    /// Ability state, if granted.
    #[must_use]
    pub fn ability_state(&self, caster: EntityId, ability: &AbilityId) -> Option<AbilityState> {
        self.abilities.state(caster, ability)
    }

    fn execute_ability(&mut self, execution: AbilityExecution, commands: &mut CommandBuffer) {
        let definition = Arc::clone(&execution.definition);
        let caster = execution.caster;

        if let (true, Some(target)) = (definition.deals_damage(), execution.target) {
            let mut amount =
                definition.scaled_damage(caster, &mut self.stats) * execution.damage_multiplier;
            let mut hit = DamageInstance::new(caster, target).with_source(definition.id.as_str());
            if let Some(multiplier) = self
                .pipeline
                .roll_crit(&mut self.stats, &mut self.rng, caster, None)
            {
                amount *= multiplier;
                hit.critical = true;
                hit.crit_multiplier = multiplier;
                self.events.publish(CombatEvent::CriticalHit {
                    attacker: caster,
                    target,
                    multiplier,
                });
            }
            hit.add(definition.damage_type, amount);
            if execution.forced {
                hit.may_proc = false;
            }
            self.resolve(&mut hit, DamageMode::Direct, commands);
        }

        let order = self.abilities.buff_order();
        for effect in &definition.effects {
            let recipient = match effect.target {
                EffectTarget::Caster => Some(caster),
                EffectTarget::Target => execution.target,
            };
            let Some(recipient) = recipient else {
                continue;
            };
            let modifier = effect.to_modifier(&definition.id, order);
            if let Err(error) = self.stats.apply_modifier(recipient, modifier) {
                warn!(%caster, ability = %definition.id, %error, "ability modifier rejected");
            }
        }

        debug!(%caster, ability = %definition.id, forced = execution.forced, "ability executed");
        self.abilities.complete(caster, &definition.id, self.now);
    }

    // ====== Entities ======

    /// Tear down every piece of state held for an entity.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        let mut commands = CommandBuffer::new();
        let effects = self
            .effects
            .remove_owner(entity, &self.stats, &mut commands, self.now);
        let items = self.items.unequip_all(entity);
        let abilities = self.abilities.remove_caster(entity);
        self.run(commands);
        let stats = self.stats.remove_entity(entity);
        debug!(%entity, effects, items, abilities, "entity removed");
        stats || effects > 0 || items > 0 || abilities > 0
    }

    /// Tear down entities the host no longer reports alive.
    pub fn sync_entities(&mut self, directory: &dyn EntityDirectory) -> usize {
        let mut known: AHashSet<EntityId> = self.stats.entities().collect();
        known.extend(self.effects.owners());
        known.extend(self.items.owners());
        known.extend(self.abilities.casters());

        let mut dead: Vec<EntityId> = known
            .into_iter()
            .filter(|entity| !directory.is_alive(*entity))
            .collect();
        dead.sort_unstable();
        for entity in &dead {
            self.remove_entity(*entity);
        }
        dead.len()
    }

    // ====== Internals ======

    fn check_low_health(&mut self, only: Option<EntityId>, commands: &mut CommandBuffer) {
        let mut owners = self.effects.low_health_owners();
        owners.extend(self.items.low_health_owners());
        owners.sort_unstable();
        owners.dedup();
        if let Some(entity) = only {
            owners.retain(|owner| *owner == entity);
        }

        for owner in owners {
            let max = self.stats.get(owner, &StatId::from(stats::MAX_HEALTH));
            if max <= 0.0 {
                continue;
            }
            let fraction = self.stats.get(owner, &StatId::from(stats::HEALTH)) / max;
            self.effects
                .check_low_health(owner, fraction, &self.stats, &mut self.rng, commands, self.now);
            self.items
                .check_low_health(owner, fraction, &self.stats, &mut self.rng, commands, self.now);
        }
    }

    /// Execute queued commands generation by generation.
    ///
    /// Past the depth limit only cleanup commands still run.
    fn run(&mut self, mut commands: CommandBuffer) {
        let mut depth = 0;
        while !commands.is_empty() {
            let mut batch = commands.take();
            if depth >= self.config.max_command_depth {
                let queued = batch.len();
                batch.retain(EffectCommand::is_cleanup);
                if batch.len() < queued {
                    warn!(dropped = queued - batch.len(), depth, "command depth limit reached");
                }
            }
            for command in batch {
                self.execute(command, &mut commands);
            }
            depth += 1;
        }
    }

    fn execute(&mut self, command: EffectCommand, spawned: &mut CommandBuffer) {
        match command {
            EffectCommand::ApplyModifier { entity, modifier } => {
                if let Err(error) = self.stats.apply_modifier(entity, modifier) {
                    warn!(%entity, %error, "queued modifier rejected");
                }
            },
            EffectCommand::RemoveModifier { entity, stat, id } => {
                self.stats.remove_modifier(entity, &stat, &id);
            },
            EffectCommand::RemoveModifiersFromSource { entity, source } => {
                self.stats.remove_modifiers_from_source(entity, &source);
            },
            EffectCommand::DealDamage { mut hit, mode } => {
                self.resolve(&mut hit, mode, spawned);
            },
            EffectCommand::ApplyEffect {
                owner,
                definition,
                source,
                magnitude,
            } => {
                let applied = self.effects.apply(
                    owner,
                    definition,
                    source,
                    magnitude,
                    &self.stats,
                    spawned,
                    self.now,
                );
                if let Err(error) = applied {
                    warn!(%owner, %error, "queued effect rejected");
                }
            },
            EffectCommand::RemoveEffect { owner, effect } => {
                self.effects
                    .remove(owner, &effect, &self.stats, spawned, self.now);
            },
            EffectCommand::ForceAbility {
                caster,
                ability,
                target,
                damage_multiplier,
            } => {
                match self.abilities.force(
                    caster,
                    &ability,
                    target,
                    damage_multiplier,
                    &mut self.stats,
                    self.now,
                ) {
                    Ok(execution) => self.execute_ability(execution, spawned),
                    Err(error) => debug!(%caster, %ability, %error, "forced ability rejected"),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::AbilityEffect;
    use crate::effect::TriggerKind;
    use crate::modifier::{Modifier, ModifierKind};

    fn runtime() -> CombatRuntime {
        CombatRuntime::new(CombatConfig {
            rng_seed: Some(7),
            ..CombatConfig::default()
        })
    }

    fn attacker() -> EntityId {
        EntityId::from_raw(1)
    }

    fn target() -> EntityId {
        EntityId::from_raw(2)
    }

    #[test]
    fn test_true_damage_ignores_mitigation() {
        let mut rt = runtime();
        rt.set_base(target(), stats::ARMOR, 500.0).expect("valid");
        rt.set_base(target(), stats::PHYSICAL_RESIST, 90.0).expect("valid");
        let damage = rt.deal_true_damage(attacker(), target(), 50.0);
        assert!((damage - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_direct_damage_is_mitigated() {
        let mut rt = runtime();
        rt.set_base(target(), stats::ARMOR, 100.0).expect("valid");
        let damage = rt.deal_direct_damage(attacker(), target(), DamageType::Slash, 80.0);
        assert!((damage - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_dot_ticks_through_pipeline() {
        let mut rt = runtime();
        rt.set_base(target(), "fire_resist", 50.0).expect("valid");
        rt.apply_dot(target(), Some(attacker()), DamageType::Fire, 10.0, 3.0)
            .expect("valid")
            .expect("applied");
        rt.drain_events();

        rt.update(3.0);
        let ticks: Vec<f32> = rt
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                CombatEvent::DamageResolved { attacker: a, amount, .. } if a == attacker() => Some(amount),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len(), 3);
        assert!(ticks.iter().all(|t| (t - 5.0).abs() < 1e-4));
        assert!(!rt.has_effect(target(), &EffectId::from("dot_fire")));
    }

    #[test]
    fn test_dot_rejects_zero_interval() {
        let mut rt = runtime();
        assert!(rt
            .apply_dot_with_interval(target(), None, DamageType::Poison, 5.0, 4.0, 0.0)
            .is_err());
    }

    #[test]
    fn test_instant_ability_deals_damage_and_applies_modifiers() {
        let mut rt = runtime();
        rt.register_ability(
            AbilityDefinition::new("shield_slam")
                .with_damage(30.0, DamageType::Blunt)
                .with_cooldown(6.0)
                .with_effect(AbilityEffect::new(
                    stats::ARMOR,
                    ModifierKind::Flat,
                    25.0,
                    Some(10.0),
                    EffectTarget::Caster,
                ))
                .with_effect(AbilityEffect::new(
                    "attack_speed",
                    ModifierKind::Flat,
                    -10.0,
                    Some(10.0),
                    EffectTarget::Target,
                )),
        )
        .expect("valid");
        let ability = AbilityId::from("shield_slam");
        assert!(rt.grant_ability(attacker(), &ability));

        let outcome = rt.try_cast(attacker(), &ability, Some(target()));
        assert!(matches!(outcome, Ok(CastOutcome::Executing(_))));
        assert_eq!(rt.stat(attacker(), stats::ARMOR), 25.0);
        assert_eq!(rt.stat(target(), "attack_speed"), -10.0);
        assert_eq!(rt.ability_state(attacker(), &ability), Some(AbilityState::OnCooldown));

        let resolved = rt.drain_events().into_iter().any(|event| {
            matches!(event, CombatEvent::DamageResolved { target: t, amount, .. } if t == target() && amount > 0.0)
        });
        assert!(resolved);
        assert!((rt.remaining_cooldown(attacker(), &ability) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cast_time_executes_on_update() {
        let mut rt = runtime();
        rt.register_ability(
            AbilityDefinition::new("pyroblast")
                .with_cast_time(2.0)
                .with_damage(40.0, DamageType::Fire),
        )
        .expect("valid");
        let ability = AbilityId::from("pyroblast");
        rt.grant_ability(attacker(), &ability);

        assert!(matches!(
            rt.try_cast(attacker(), &ability, Some(target())),
            Ok(CastOutcome::Casting { .. })
        ));
        rt.drain_events();
        rt.update(1.0);
        assert_eq!(rt.ability_state(attacker(), &ability), Some(AbilityState::Casting));
        rt.update(2.0);
        assert_eq!(rt.ability_state(attacker(), &ability), Some(AbilityState::Ready));
        assert!(rt
            .drain_events()
            .iter()
            .any(|e| matches!(e, CombatEvent::AbilityExecuted { forced: false, .. })));
    }

    #[test]
    fn test_effect_modifiers_follow_effect_lifetime() {
        let mut rt = runtime();
        let definition = EffectDefinition::new("stoneskin")
            .with_duration(5.0)
            .with_modifier(Modifier::flat("stoneskin_armor", stats::ARMOR, 40.0));
        rt.apply_effect(target(), Arc::new(definition), None, 1.0)
            .expect("valid");
        assert_eq!(rt.stat(target(), stats::ARMOR), 40.0);

        rt.update(5.0);
        assert_eq!(rt.stat(target(), stats::ARMOR), 0.0);
    }

    #[test]
    fn test_registered_effect_lookup() {
        let mut rt = runtime();
        rt.register_effect(EffectDefinition::new("Haste").with_duration(3.0))
            .expect("valid");
        assert!(rt
            .apply_registered_effect(target(), &EffectId::from("haste"), None, 1.0)
            .expect("valid")
            .is_some());
        assert!(rt
            .apply_registered_effect(target(), &EffectId::from("missing"), None, 1.0)
            .expect("valid")
            .is_none());
        assert!(rt.has_effect(target(), &EffectId::from("HASTE")));
    }

    #[test]
    fn test_command_depth_limit_stops_runaway_procs() {
        let mut rt = CombatRuntime::new(CombatConfig {
            rng_seed: Some(1),
            max_command_depth: 3,
            ..CombatConfig::default()
        });
        // Every hit taken re-queues a proc-enabled hit back at the attacker.
        let echo = EffectDefinition::new("echo")
            .with_trigger(TriggerKind::OnDamageTaken, 1.0, 0.0)
            .with_behavior(Echo);
        for entity in [attacker(), target()] {
            rt.apply_effect(entity, Arc::new(echo.clone()), None, 1.0)
                .expect("valid");
        }
        rt.drain_events();

        rt.deal_direct_damage(attacker(), target(), DamageType::Blunt, 5.0);
        let hits = rt
            .drain_events()
            .iter()
            .filter(|e| matches!(e, CombatEvent::DamageResolved { .. }))
            .count();
        assert_eq!(hits, 4);
    }

    #[test]
    fn test_cleanup_runs_past_depth_limit() {
        let mut rt = CombatRuntime::new(CombatConfig {
            rng_seed: Some(1),
            max_command_depth: 1,
            ..CombatConfig::default()
        });
        let ward = EffectDefinition::new("ward")
            .with_trigger(TriggerKind::OnDamageTaken, 1.0, 0.0)
            .with_modifier(Modifier::flat("ward_armor", stats::ARMOR, 20.0))
            .with_behavior(Shatter);
        rt.apply_effect(target(), Arc::new(ward), None, 1.0)
            .expect("valid");
        let echo = EffectDefinition::new("echo")
            .with_trigger(TriggerKind::OnDamageTaken, 1.0, 0.0)
            .with_behavior(Echo);
        rt.apply_effect(attacker(), Arc::new(echo), None, 1.0)
            .expect("valid");
        assert_eq!(rt.stat(target(), stats::ARMOR), 20.0);
        rt.drain_events();

        rt.deal_direct_damage(attacker(), target(), DamageType::Blunt, 5.0);
        let hits = rt
            .drain_events()
            .iter()
            .filter(|e| matches!(e, CombatEvent::DamageResolved { .. }))
            .count();
        // The echo from the attacker lands past the limit and is dropped.
        assert_eq!(hits, 2);
        assert!(!rt.has_effect(target(), &EffectId::from("ward")));
        assert_eq!(rt.stat(target(), stats::ARMOR), 0.0);
    }

    /// Breaks on the first hit taken and strikes back once.
    struct Shatter;

    impl crate::effect::EffectBehavior for Shatter {
        fn on_proc(
            &self,
            ctx: &mut crate::effect::EffectContext<'_>,
            hit: Option<&DamageInstance>,
        ) -> runeforge_common::HandlerResult {
            ctx.commands.remove_effect(ctx.owner, ctx.effect.clone());
            if let Some(hit) = hit {
                let recoil = DamageInstance::new(hit.target, hit.attacker).with_damage(DamageType::Pierce, 2.0);
                ctx.commands.deal_damage(recoil, DamageMode::Direct);
            }
            Ok(())
        }
    }

    struct Echo;

    impl crate::effect::EffectBehavior for Echo {
        fn on_proc(
            &self,
            ctx: &mut crate::effect::EffectContext<'_>,
            hit: Option<&DamageInstance>,
        ) -> runeforge_common::HandlerResult {
            if let Some(hit) = hit {
                let echo = DamageInstance::new(hit.target, hit.attacker).with_damage(DamageType::Blunt, 1.0);
                ctx.commands.deal_damage(echo, DamageMode::Direct);
            }
            Ok(())
        }
    }

    #[test]
    fn test_remove_entity_clears_everything() {
        let mut rt = runtime();
        rt.set_base(target(), stats::ARMOR, 10.0).expect("valid");
        rt.apply_dot(target(), Some(attacker()), DamageType::Poison, 2.0, 10.0)
            .expect("valid");
        rt.equip_item(target(), "ring", vec![]).expect("valid");

        assert!(rt.remove_entity(target()));
        assert!(!rt.stats().contains(target()));
        assert!(rt.effects_of(target()).is_empty());
        assert!(!rt.is_equipped(target(), &ItemId::from("ring")));
        assert!(!rt.remove_entity(target()));
    }

    #[test]
    fn test_sync_entities_removes_dead() {
        let mut rt = runtime();
        rt.set_base(attacker(), stats::ARMOR, 1.0).expect("valid");
        rt.set_base(target(), stats::ARMOR, 1.0).expect("valid");

        let alive = |entity: EntityId| entity == attacker();
        assert_eq!(rt.sync_entities(&alive), 1);
        assert!(rt.stats().contains(attacker()));
        assert!(!rt.stats().contains(target()));
    }
}
