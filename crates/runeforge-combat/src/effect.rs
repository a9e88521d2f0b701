//! Status effects and procs.
//!
//! This module provides:
//! - Effect definitions (duration, ticks, trigger, proc gating, stacking)
//! - Per-owner effect instances with tick and expiry scheduling
//! - Proc dispatch for hit, crit, damage-taken, kill and low-health triggers
//! - Dispel by buff/debuff and priority
//!
//! Callbacks never touch engine state directly. They read stats through an
//! [`EffectContext`] and queue changes into a [`CommandBuffer`].

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use fastrand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use runeforge_common::{
    has_elapsed, ContractError, ContractResult, EffectId, EntityId, HandlerError, HandlerResult, StatId,
    Timestamp,
};

use crate::command::CommandBuffer;
use crate::damage::{DamageInstance, DamageType};
use crate::events::{CombatEvent, EventBus, RemovalReason};
use crate::guard::{isolate, isolate_value};
use crate::modifier::{Collision, Modifier, ModifierKind, StackPolicy};
use crate::pipeline::ProcEvent;
use crate::stat_engine::StatEngine;

// ============================================================================
// Triggers and Gating
// ============================================================================

/// What fires an effect's proc callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum TriggerKind {
    /// Never procs; only ticks and expires.
    #[default]
    Timed,
    /// Owner landed a hit.
    OnHit,
    /// Owner landed a critical hit.
    OnCrit,
    /// Owner took damage.
    OnDamageTaken,
    /// Owner killed something.
    OnKill,
    /// Owner's health fraction crossed below `threshold` (0.0-1.0).
    OnLowHealth {
        /// Health fraction
        threshold: f32,
    },
}

impl TriggerKind {
    /// Whether a hit event fires this trigger.
    #[must_use]
    pub fn matches(self, event: ProcEvent) -> bool {
        matches!(
            (self, event),
            (Self::OnHit, ProcEvent::Hit)
                | (Self::OnCrit, ProcEvent::Crit)
                | (Self::OnDamageTaken, ProcEvent::DamageTaken)
                | (Self::OnKill, ProcEvent::Kill)
        )
    }

    /// Low-health threshold, if this is a low-health trigger.
    #[must_use]
    pub fn low_health_threshold(self) -> Option<f32> {
        match self {
            Self::OnLowHealth { threshold } => Some(threshold),
            _ => None,
        }
    }
}

/// Chance and cooldown gate shared by effect and item procs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcGate {
    chance: f32,
    cooldown: f64,
    last_proc: Option<Timestamp>,
}

impl ProcGate {
    /// Create a gate. A chance of 1 or more always passes.
    #[must_use]
    pub fn new(chance: f32, cooldown: f64) -> Self {
        Self {
            chance,
            cooldown: cooldown.max(0.0),
            last_proc: None,
        }
    }

    /// Whether the cooldown has elapsed.
    #[must_use]
    pub fn ready(&self, now: Timestamp) -> bool {
        self.last_proc.map_or(true, |last| now - last >= self.cooldown)
    }

    /// Roll the chance.
    pub fn roll(&self, rng: &mut Rng) -> bool {
        self.chance >= 1.0 || (self.chance > 0.0 && rng.f32() < self.chance)
    }

    /// Start the cooldown.
    pub fn stamp(&mut self, now: Timestamp) {
        self.last_proc = Some(now);
    }

    /// Time of the last successful proc.
    #[must_use]
    pub fn last_proc(&self) -> Option<Timestamp> {
        self.last_proc
    }
}

/// Edge detector for low-health triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowHealthLatch {
    armed: bool,
}

impl Default for LowHealthLatch {
    fn default() -> Self {
        Self { armed: true }
    }
}

impl LowHealthLatch {
    /// Feed a health fraction. Returns true on a downward crossing.
    pub fn observe(&mut self, fraction: f32, threshold: f32) -> bool {
        if self.armed && fraction <= threshold {
            self.armed = false;
            true
        } else {
            if !self.armed && fraction > threshold {
                self.armed = true;
            }
            false
        }
    }

    /// Whether the next downward crossing will fire.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Extra filter over (owner, other party, hit), evaluated before the roll.
pub trait ProcCondition: Send + Sync {
    /// Whether the proc may fire.
    fn allows(&self, owner: EntityId, other: EntityId, hit: &DamageInstance) -> Result<bool, HandlerError>;
}

impl<F> ProcCondition for F
where
    F: Fn(EntityId, EntityId, &DamageInstance) -> bool + Send + Sync,
{
    fn allows(&self, owner: EntityId, other: EntityId, hit: &DamageInstance) -> Result<bool, HandlerError> {
        Ok(self(owner, other, hit))
    }
}

pub(crate) fn condition_allows(
    condition: Option<&Arc<dyn ProcCondition>>,
    owner: EntityId,
    other: EntityId,
    hit: &DamageInstance,
) -> bool {
    condition.map_or(true, |condition| {
        isolate_value("proc condition", false, || condition.allows(owner, other, hit))
    })
}

// ============================================================================
// Behaviors
// ============================================================================

/// What a callback sees of the world.
pub struct EffectContext<'a> {
    /// Entity carrying the effect.
    pub owner: EntityId,
    /// Entity credited with applying it.
    pub source: Option<EntityId>,
    /// Definition id.
    pub effect: EffectId,
    /// Instance id.
    pub instance: u64,
    /// Magnitude given at application.
    pub magnitude: f32,
    /// Current stacks.
    pub stacks: u32,
    /// Current time.
    pub now: Timestamp,
    /// Read access to stats.
    pub stats: &'a StatEngine,
    /// Queue for state changes.
    pub commands: &'a mut CommandBuffer,
}

impl EffectContext<'_> {
    /// Entity to credit with damage dealt by this effect.
    #[must_use]
    pub fn attacker(&self) -> EntityId {
        self.source.unwrap_or(self.owner)
    }

    /// Resolved stat of any entity.
    #[must_use]
    pub fn stat(&self, entity: EntityId, stat: &str) -> f32 {
        self.stats.peek(entity, &StatId::from(stat))
    }
}

/// Callbacks of an effect. Every method defaults to a no-op.
pub trait EffectBehavior: Send + Sync {
    /// Instance created.
    fn on_apply(&self, _ctx: &mut EffectContext<'_>) -> HandlerResult {
        Ok(())
    }

    /// Instance removed for any reason.
    fn on_remove(&self, _ctx: &mut EffectContext<'_>, _reason: RemovalReason) -> HandlerResult {
        Ok(())
    }

    /// Tick interval elapsed.
    fn on_tick(&self, _ctx: &mut EffectContext<'_>) -> HandlerResult {
        Ok(())
    }

    /// Every update, with the elapsed time.
    fn on_update(&self, _ctx: &mut EffectContext<'_>, _dt: f64) -> HandlerResult {
        Ok(())
    }

    /// Proc fired. `hit` is absent for low-health procs.
    fn on_proc(&self, _ctx: &mut EffectContext<'_>, _hit: Option<&DamageInstance>) -> HandlerResult {
        Ok(())
    }
}

/// Deals `magnitude × stacks` of one damage type every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOverTime {
    /// Damage type of each tick.
    pub damage_type: DamageType,
}

impl EffectBehavior for DamageOverTime {
    fn on_tick(&self, ctx: &mut EffectContext<'_>) -> HandlerResult {
        #[allow(clippy::cast_precision_loss)]
        let amount = ctx.magnitude * ctx.stacks as f32;
        if amount > 0.0 {
            let attacker = ctx.attacker();
            let owner = ctx.owner;
            let label = ctx.effect.as_str().to_string();
            ctx.commands
                .deal_direct(attacker, owner, self.damage_type, amount, &label);
        }
        Ok(())
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// Template of an effect.
#[derive(Clone)]
pub struct EffectDefinition {
    /// Effect id.
    pub id: EffectId,
    /// Lifetime in seconds; 0 or less is permanent.
    pub duration: f64,
    /// Seconds between ticks; 0 disables ticking.
    pub tick_interval: f64,
    /// Proc trigger.
    pub trigger: TriggerKind,
    /// Proc chance (1.0 or more always fires).
    pub proc_chance: f32,
    /// Seconds between procs.
    pub proc_cooldown: f64,
    /// Collision policy on re-application.
    pub stack_policy: StackPolicy,
    /// Stack cap.
    pub max_stacks: u32,
    /// Debuff (true) or buff (false).
    pub is_debuff: bool,
    /// Higher priorities are dispelled first.
    pub dispel_priority: i32,
    /// Modifiers granted while the effect lives, scaled by stacks.
    pub modifiers: Vec<Modifier>,
    /// Callbacks.
    pub behavior: Option<Arc<dyn EffectBehavior>>,
    /// Proc filter.
    pub condition: Option<Arc<dyn ProcCondition>>,
}

impl fmt::Debug for EffectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDefinition")
            .field("id", &self.id)
            .field("duration", &self.duration)
            .field("tick_interval", &self.tick_interval)
            .field("trigger", &self.trigger)
            .field("proc_chance", &self.proc_chance)
            .field("stack_policy", &self.stack_policy)
            .field("max_stacks", &self.max_stacks)
            .field("is_debuff", &self.is_debuff)
            .finish_non_exhaustive()
    }
}

impl EffectDefinition {
    /// Create a permanent, non-proccing buff.
    pub fn new(id: impl Into<EffectId>) -> Self {
        Self {
            id: id.into(),
            duration: 0.0,
            tick_interval: 0.0,
            trigger: TriggerKind::Timed,
            proc_chance: 1.0,
            proc_cooldown: 0.0,
            stack_policy: StackPolicy::Replace,
            max_stacks: 1,
            is_debuff: false,
            dispel_priority: 0,
            modifiers: Vec::new(),
            behavior: None,
            condition: None,
        }
    }

    /// Damage-over-time debuff dealing `magnitude` per tick.
    pub fn damage_over_time(
        id: impl Into<EffectId>,
        damage_type: DamageType,
        duration: f64,
        tick_interval: f64,
    ) -> Self {
        Self::new(id)
            .with_duration(duration)
            .with_tick_interval(tick_interval)
            .as_debuff(0)
            .with_behavior(DamageOverTime { damage_type })
    }

    /// Set duration.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// Set tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, seconds: f64) -> Self {
        self.tick_interval = seconds;
        self
    }

    /// Set proc trigger, chance and cooldown.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerKind, chance: f32, cooldown: f64) -> Self {
        self.trigger = trigger;
        self.proc_chance = chance;
        self.proc_cooldown = cooldown;
        self
    }

    /// Set stacking.
    #[must_use]
    pub fn with_stacking(mut self, policy: StackPolicy, max_stacks: u32) -> Self {
        self.stack_policy = policy;
        self.max_stacks = max_stacks;
        self
    }

    /// Mark as a debuff.
    #[must_use]
    pub fn as_debuff(mut self, dispel_priority: i32) -> Self {
        self.is_debuff = true;
        self.dispel_priority = dispel_priority;
        self
    }

    /// Set dispel priority.
    #[must_use]
    pub fn with_dispel_priority(mut self, priority: i32) -> Self {
        self.dispel_priority = priority;
        self
    }

    /// Grant a modifier while active.
    #[must_use]
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Set callbacks.
    #[must_use]
    pub fn with_behavior(mut self, behavior: impl EffectBehavior + 'static) -> Self {
        self.behavior = Some(Arc::new(behavior));
        self
    }

    /// Set proc filter.
    #[must_use]
    pub fn with_condition(mut self, condition: impl ProcCondition + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Whether the effect never expires.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.duration <= 0.0
    }

    /// Check the definition for programming errors.
    pub fn validate(&self) -> ContractResult<()> {
        self.id.validate()?;
        ContractError::check_finite("effect duration", self.duration)?;
        ContractError::check_finite("tick interval", self.tick_interval)?;
        ContractError::check_finite("proc cooldown", self.proc_cooldown)?;
        ContractError::check_finite("proc chance", f64::from(self.proc_chance))?;
        for duration in [self.tick_interval, self.proc_cooldown] {
            if duration < 0.0 {
                return Err(ContractError::NegativeDuration {
                    id: self.id.as_str().to_string(),
                    duration,
                });
            }
        }
        if self.max_stacks == 0 {
            return Err(ContractError::ZeroStackLimit {
                id: self.id.as_str().to_string(),
            });
        }
        if let Some(threshold) = self.trigger.low_health_threshold() {
            ContractError::check_finite("low health threshold", f64::from(threshold))?;
        }
        self.modifiers.iter().try_for_each(Modifier::validate)
    }
}

// ============================================================================
// Instances
// ============================================================================

/// One live application of an effect.
#[derive(Debug, Clone)]
pub struct EffectInstance {
    /// Unique instance id.
    pub id: u64,
    /// Definition.
    pub definition: Arc<EffectDefinition>,
    /// Entity carrying the effect.
    pub owner: EntityId,
    /// Entity credited with applying it.
    pub source: Option<EntityId>,
    /// Magnitude given at application.
    pub magnitude: f32,
    /// Current stacks.
    pub stacks: u32,
    /// Application (or last refresh) time.
    pub applied_at: Timestamp,
    /// Time of the last tick.
    pub last_tick: Timestamp,
    /// Cleared when the instance is scheduled for removal.
    pub active: bool,
    gate: ProcGate,
    latch: LowHealthLatch,
}

impl EffectInstance {
    /// Time of the last successful proc.
    #[must_use]
    pub fn last_proc(&self) -> Option<Timestamp> {
        self.gate.last_proc()
    }

    /// Whether the duration has run out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        !self.definition.is_permanent()
            && has_elapsed(now, self.applied_at, self.definition.duration)
    }

    /// Seconds left, None if permanent.
    #[must_use]
    pub fn remaining(&self, now: Timestamp) -> Option<f64> {
        (!self.definition.is_permanent())
            .then(|| (self.definition.duration - (now - self.applied_at)).max(0.0))
    }

    /// Source label of the modifiers this instance grants.
    #[must_use]
    pub fn modifier_source(&self) -> String {
        format!("effect:{}#{}", self.definition.id, self.id)
    }

    fn granted_modifiers(&self) -> impl Iterator<Item = Modifier> + '_ {
        let source = self.modifier_source();
        #[allow(clippy::cast_precision_loss)]
        let stacks = self.stacks as f32;
        self.definition.modifiers.iter().map(move |template| {
            let value = match template.kind {
                ModifierKind::Flat | ModifierKind::Percent => template.value * stacks,
                ModifierKind::Multiply | ModifierKind::Override => template.value,
            };
            Modifier::new(
                format!("{}#{}", template.id, self.id).as_str(),
                template.stat.clone(),
                template.kind,
                value,
            )
            .with_order(template.order)
            .with_source(source.clone())
        })
    }
}

fn invoke<F>(
    label: &str,
    instance: &EffectInstance,
    stats: &StatEngine,
    commands: &mut CommandBuffer,
    now: Timestamp,
    callback: F,
) where
    F: FnOnce(&dyn EffectBehavior, &mut EffectContext<'_>) -> HandlerResult,
{
    let Some(behavior) = instance.definition.behavior.clone() else {
        return;
    };
    let mut ctx = EffectContext {
        owner: instance.owner,
        source: instance.source,
        effect: instance.definition.id.clone(),
        instance: instance.id,
        magnitude: instance.magnitude,
        stacks: instance.stacks,
        now,
        stats,
        commands,
    };
    let _ = isolate(label, || callback(behavior.as_ref(), &mut ctx));
}

/// Which side a dispel strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispelKind {
    /// Remove buffs.
    Buffs,
    /// Remove debuffs.
    Debuffs,
}

// ============================================================================
// Engine
// ============================================================================

/// Effect instances of every owner.
#[derive(Debug)]
pub struct EffectEngine {
    effects: AHashMap<EntityId, Vec<EffectInstance>>,
    next_instance: u64,
    last_update: Timestamp,
    events: EventBus,
}

impl EffectEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            effects: AHashMap::new(),
            next_instance: 1,
            last_update: 0.0,
            events,
        }
    }

    /// Apply an effect. Returns the affected instance id, or None if rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        owner: EntityId,
        definition: Arc<EffectDefinition>,
        source: Option<EntityId>,
        magnitude: f32,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> ContractResult<Option<u64>> {
        if !owner.is_valid() {
            return Err(ContractError::NullEntity {
                operation: "apply_effect",
            });
        }
        definition.validate()?;
        ContractError::check_finite("effect magnitude", f64::from(magnitude))?;

        let effect = definition.id.clone();
        let list = self.effects.entry(owner).or_default();
        let existing = list
            .iter()
            .position(|i| i.active && i.definition.id == effect);

        let collision = existing.map(|index| {
            definition
                .stack_policy
                .on_collision(list[index].stacks, definition.max_stacks)
        });

        match (existing, collision) {
            (Some(_), Some(Collision::Reject)) => {
                debug!(%owner, %effect, "effect application ignored");
                Ok(None)
            },
            (Some(index), Some(Collision::Refresh | Collision::StackCapped)) => {
                let instance = &mut list[index];
                instance.applied_at = now;
                let (id, stacks) = (instance.id, instance.stacks);
                self.events.publish(CombatEvent::EffectApplied { owner, effect, stacks });
                Ok(Some(id))
            },
            (Some(index), Some(Collision::AddStack)) => {
                let instance = &mut list[index];
                instance.stacks += 1;
                instance.applied_at = now;
                for modifier in instance.granted_modifiers() {
                    commands.apply_modifier(owner, modifier);
                }
                let (id, stacks) = (instance.id, instance.stacks);
                self.events.publish(CombatEvent::EffectApplied { owner, effect, stacks });
                Ok(Some(id))
            },
            (Some(index), Some(Collision::Replace)) => {
                let old = list.remove(index);
                self.finish_removal(old, RemovalReason::Replaced, stats, commands, now);
                Ok(Some(self.insert(owner, definition, source, magnitude, stats, commands, now)))
            },
            _ => Ok(Some(self.insert(owner, definition, source, magnitude, stats, commands, now))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert(
        &mut self,
        owner: EntityId,
        definition: Arc<EffectDefinition>,
        source: Option<EntityId>,
        magnitude: f32,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> u64 {
        let id = self.next_instance;
        self.next_instance += 1;

        let instance = EffectInstance {
            id,
            gate: ProcGate::new(definition.proc_chance, definition.proc_cooldown),
            latch: LowHealthLatch::default(),
            definition,
            owner,
            source,
            magnitude,
            stacks: 1,
            applied_at: now,
            last_tick: now,
            active: true,
        };

        for modifier in instance.granted_modifiers() {
            commands.apply_modifier(owner, modifier);
        }
        invoke("effect apply", &instance, stats, commands, now, |b, ctx| b.on_apply(ctx));

        debug!(%owner, effect = %instance.definition.id, id, "effect applied");
        self.events.publish(CombatEvent::EffectApplied {
            owner,
            effect: instance.definition.id.clone(),
            stacks: 1,
        });
        self.effects.entry(owner).or_default().push(instance);
        id
    }

    fn finish_removal(
        &self,
        mut instance: EffectInstance,
        reason: RemovalReason,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) {
        instance.active = false;
        if !instance.definition.modifiers.is_empty() {
            commands.remove_modifiers_from_source(instance.owner, instance.modifier_source());
        }
        invoke("effect remove", &instance, stats, commands, now, |b, ctx| {
            b.on_remove(ctx, reason)
        });
        debug!(owner = %instance.owner, effect = %instance.definition.id, ?reason, "effect removed");
        self.events.publish(CombatEvent::EffectRemoved {
            owner: instance.owner,
            effect: instance.definition.id.clone(),
            reason,
        });
    }

    /// Remove every instance of an effect from an owner.
    pub fn remove(
        &mut self,
        owner: EntityId,
        effect: &EffectId,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> bool {
        self.remove_where(owner, |i| i.definition.id == *effect, RemovalReason::Explicit, stats, commands, now) > 0
    }

    /// Remove one instance by id.
    pub fn remove_instance(
        &mut self,
        owner: EntityId,
        instance: u64,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> bool {
        self.remove_where(owner, |i| i.id == instance, RemovalReason::Explicit, stats, commands, now) > 0
    }

    /// Remove up to `max` buffs or debuffs, highest dispel priority first.
    pub fn dispel(
        &mut self,
        owner: EntityId,
        kind: DispelKind,
        max: usize,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> Vec<EffectId> {
        let want_debuffs = kind == DispelKind::Debuffs;
        let mut candidates: Vec<(i32, u64)> = self
            .effects(owner)
            .iter()
            .filter(|i| i.active && i.definition.is_debuff == want_debuffs)
            .map(|i| (i.definition.dispel_priority, i.id))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates.truncate(max);

        let chosen: Vec<u64> = candidates.into_iter().map(|(_, id)| id).collect();
        let mut removed = Vec::new();
        if let Some(list) = self.effects.get_mut(&owner) {
            let mut index = 0;
            while index < list.len() {
                if chosen.contains(&list[index].id) {
                    removed.push(list.remove(index));
                } else {
                    index += 1;
                }
            }
        }
        self.effects.retain(|_, list| !list.is_empty());
        removed
            .into_iter()
            .map(|instance| {
                let id = instance.definition.id.clone();
                self.finish_removal(instance, RemovalReason::Dispelled, stats, commands, now);
                id
            })
            .collect()
    }

    /// Tear down every effect of an owner.
    pub fn remove_owner(
        &mut self,
        owner: EntityId,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> usize {
        let removed = self.effects.remove(&owner).unwrap_or_default();
        let count = removed.len();
        for instance in removed {
            self.finish_removal(instance, RemovalReason::Teardown, stats, commands, now);
        }
        count
    }

    fn remove_where<P>(
        &mut self,
        owner: EntityId,
        predicate: P,
        reason: RemovalReason,
        stats: &StatEngine,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> usize
    where
        P: Fn(&EffectInstance) -> bool,
    {
        let Some(list) = self.effects.get_mut(&owner) else {
            return 0;
        };
        let mut removed = Vec::new();
        let mut index = 0;
        while index < list.len() {
            if predicate(&list[index]) {
                removed.push(list.remove(index));
            } else {
                index += 1;
            }
        }
        if list.is_empty() {
            self.effects.remove(&owner);
        }
        let count = removed.len();
        for instance in removed {
            self.finish_removal(instance, reason, stats, commands, now);
        }
        count
    }

    /// Whether an owner carries an effect.
    #[must_use]
    pub fn has(&self, owner: EntityId, effect: &EffectId) -> bool {
        self.effects(owner)
            .iter()
            .any(|i| i.active && i.definition.id == *effect)
    }

    /// Live instances of an owner.
    #[must_use]
    pub fn effects(&self, owner: EntityId) -> &[EffectInstance] {
        self.effects.get(&owner).map_or(&[], Vec::as_slice)
    }

    /// Owners with at least one instance.
    pub fn owners(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.effects.keys().copied()
    }

    /// Owners carrying a low-health trigger.
    #[must_use]
    pub fn low_health_owners(&self) -> Vec<EntityId> {
        self.effects
            .iter()
            .filter(|(_, list)| {
                list.iter()
                    .any(|i| i.definition.trigger.low_health_threshold().is_some())
            })
            .map(|(owner, _)| *owner)
            .collect()
    }

    /// Advance time: continuous callbacks, ticks, then expiry.
    pub fn update(&mut self, now: Timestamp, stats: &StatEngine, commands: &mut CommandBuffer) -> usize {
        let dt = (now - self.last_update).max(0.0);
        self.last_update = now;

        let mut owners: Vec<EntityId> = self.effects.keys().copied().collect();
        owners.sort_unstable();

        for owner in &owners {
            let Some(list) = self.effects.get_mut(owner) else {
                continue;
            };
            for instance in list.iter_mut().filter(|i| i.active) {
                invoke("effect update", instance, stats, commands, now, |b, ctx| {
                    b.on_update(ctx, dt)
                });

                let interval = instance.definition.tick_interval;
                if interval > 0.0 {
                    let horizon = if instance.definition.is_permanent() {
                        now
                    } else {
                        now.min(instance.applied_at + instance.definition.duration)
                    };
                    while instance.last_tick + interval <= horizon {
                        instance.last_tick += interval;
                        invoke("effect tick", instance, stats, commands, now, |b, ctx| b.on_tick(ctx));
                    }
                }

                if instance.is_expired(now) {
                    instance.active = false;
                }
            }
        }

        let mut expired = Vec::new();
        for owner in &owners {
            let Some(list) = self.effects.get_mut(owner) else {
                continue;
            };
            let mut index = 0;
            while index < list.len() {
                if list[index].active {
                    index += 1;
                } else {
                    expired.push(list.remove(index));
                }
            }
        }
        self.effects.retain(|_, list| !list.is_empty());

        let count = expired.len();
        for instance in expired {
            self.finish_removal(instance, RemovalReason::Expired, stats, commands, now);
        }
        count
    }

    /// Offer a hit event to the owner's proc effects. Returns how many fired.
    pub fn dispatch(
        &mut self,
        event: ProcEvent,
        hit: &DamageInstance,
        stats: &StatEngine,
        rng: &mut Rng,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> usize {
        let owner = event.owner(hit);
        let other = event.counterpart(hit);
        let Some(list) = self.effects.get_mut(&owner) else {
            return 0;
        };

        let mut fired = Vec::new();
        for instance in list.iter_mut() {
            if !instance.active || !instance.definition.trigger.matches(event) {
                continue;
            }
            if !instance.gate.ready(now)
                || !condition_allows(instance.definition.condition.as_ref(), owner, other, hit)
                || !instance.gate.roll(rng)
            {
                continue;
            }
            instance.gate.stamp(now);
            invoke("effect proc", instance, stats, commands, now, |b, ctx| {
                b.on_proc(ctx, Some(hit))
            });
            fired.push(instance.definition.id.clone());
        }

        let count = fired.len();
        for effect in fired {
            debug!(%owner, %effect, ?event, "proc fired");
            self.events.publish(CombatEvent::ProcFired { owner, effect });
        }
        count
    }

    /// Feed the owner's health fraction to low-health triggers.
    pub fn check_low_health(
        &mut self,
        owner: EntityId,
        fraction: f32,
        stats: &StatEngine,
        rng: &mut Rng,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> usize {
        let Some(list) = self.effects.get_mut(&owner) else {
            return 0;
        };

        let mut fired = Vec::new();
        for instance in list.iter_mut().filter(|i| i.active) {
            let Some(threshold) = instance.definition.trigger.low_health_threshold() else {
                continue;
            };
            if !instance.latch.observe(fraction, threshold) {
                continue;
            }
            if !instance.gate.ready(now) || !instance.gate.roll(rng) {
                continue;
            }
            instance.gate.stamp(now);
            invoke("effect proc", instance, stats, commands, now, |b, ctx| b.on_proc(ctx, None));
            fired.push(instance.definition.id.clone());
        }

        let count = fired.len();
        for effect in fired {
            debug!(%owner, %effect, fraction, "low health proc fired");
            self.events.publish(CombatEvent::ProcFired { owner, effect });
        }
        count
    }
}
