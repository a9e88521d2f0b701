//! Ability cast and cooldown state machine.
//!
//! ```text
//! Ready ──cast time 0──────────────► Executing ──► OnCooldown ──► Ready
//!   │                                    ▲   │
//!   └──► Casting ──cast time elapsed─────┘   └──► Channeling ──► OnCooldown
//!           │                                         │
//!           └────────── interrupt ──► Ready ◄─────────┘
//! ```
//!
//! `Disabled` is terminal. Executions are returned to the caller, which
//! delivers damage and effects and then calls [`AbilityEngine::complete`].

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use runeforge_common::{
    AbilityId, ContractError, ContractResult, EntityId, HandlerError, StatId, Timestamp,
};

use crate::damage::DamageType;
use crate::definitions::{stats, ResourcePools};
use crate::events::{CombatEvent, EventBus};
use crate::guard::isolate_value;
use crate::modifier::{Modifier, ModifierKind};
use crate::stat_engine::StatEngine;

// ============================================================================
// Errors
// ============================================================================

/// Why a cast was rejected. Rejections never change state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    /// The caster does not have the ability.
    #[error("ability not granted: {0}")]
    NotGranted(AbilityId),
    /// The ability is already casting or channeling.
    #[error("ability already casting")]
    AlreadyCasting,
    /// Cooldown has not elapsed.
    #[error("ability on cooldown: {remaining}s remaining")]
    OnCooldown {
        /// Time remaining in seconds
        remaining: f64,
    },
    /// The ability was disabled.
    #[error("ability disabled")]
    Disabled,
    /// The usability predicate said no.
    #[error("ability cannot be used right now")]
    UseConditionFailed,
    /// Not enough of the cost resource.
    #[error("insufficient {resource}: need {required}, have {available}")]
    InsufficientResource {
        /// Resource type
        resource: String,
        /// Amount required
        required: f32,
        /// Amount available
        available: f32,
    },
    /// Bad input from the caller.
    #[error(transparent)]
    Contract(#[from] ContractError),
}

// ============================================================================
// Definitions
// ============================================================================

/// Ability lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityState {
    /// Can be cast.
    Ready,
    /// Cast time running.
    Casting,
    /// Damage and effects being delivered.
    Executing,
    /// Channel running after execution.
    Channeling,
    /// Cooldown running.
    OnCooldown,
    /// Permanently unusable.
    Disabled,
}

/// Resource cost of a cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCost {
    /// Resource type name (case-insensitive).
    pub resource: String,
    /// Flat amount, or percent of the maximum.
    pub amount: f32,
    /// Whether `amount` is a percentage of the pool maximum.
    pub percent_of_max: bool,
}

/// Who receives an ability's modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectTarget {
    /// The caster.
    Caster,
    /// The cast target.
    Target,
}

impl EffectTarget {
    fn label(self) -> &'static str {
        match self {
            Self::Caster => "self",
            Self::Target => "target",
        }
    }
}

/// A modifier an ability applies on execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityEffect {
    /// Stat modified.
    pub stat: StatId,
    /// Modifier kind.
    pub kind: ModifierKind,
    /// Modifier value.
    pub value: f32,
    /// Lifetime in seconds (None = permanent).
    pub duration: Option<f64>,
    /// Recipient.
    pub target: EffectTarget,
}

impl AbilityEffect {
    /// Create an ability effect.
    pub fn new(
        stat: impl Into<StatId>,
        kind: ModifierKind,
        value: f32,
        duration: Option<f64>,
        target: EffectTarget,
    ) -> Self {
        Self {
            stat: stat.into(),
            kind,
            value,
            duration,
            target,
        }
    }

    /// Build the modifier, id `{ability}:{stat}:{self|target}`.
    #[must_use]
    pub fn to_modifier(&self, ability: &AbilityId, order: i32) -> Modifier {
        let id = format!("{ability}:{}:{}", self.stat, self.target.label());
        let modifier = Modifier::new(id, self.stat.clone(), self.kind, self.value)
            .with_order(order)
            .with_source(ability.as_str());
        match self.duration {
            Some(seconds) => modifier.with_duration(seconds),
            None => modifier,
        }
    }
}

/// Usability predicate checked before a normal cast.
pub trait UseCondition: Send + Sync {
    /// Whether `caster` may cast now.
    fn usable(&self, caster: EntityId, stats: &StatEngine) -> Result<bool, HandlerError>;
}

impl<F> UseCondition for F
where
    F: Fn(EntityId, &StatEngine) -> bool + Send + Sync,
{
    fn usable(&self, caster: EntityId, stats: &StatEngine) -> Result<bool, HandlerError> {
        Ok(self(caster, stats))
    }
}

/// Template of an ability.
#[derive(Clone)]
pub struct AbilityDefinition {
    /// Ability id.
    pub id: AbilityId,
    /// Seconds before execution; 0 executes at once.
    pub cast_time: f64,
    /// Seconds of channeling after execution.
    pub channel_duration: f64,
    /// Base cooldown in seconds.
    pub cooldown: f64,
    /// Whether casting and channeling can be interrupted.
    pub interruptible: bool,
    /// Resource cost.
    pub cost: Option<ResourceCost>,
    /// Base damage.
    pub base_damage: f32,
    /// Damage type.
    pub damage_type: DamageType,
    /// Primary scaling stat.
    pub scaling_stat: Option<StatId>,
    /// Damage per point of the primary stat.
    pub scaling_factor: f32,
    /// Secondary scaling stat.
    pub secondary_stat: Option<StatId>,
    /// Damage per point of the secondary stat.
    pub secondary_factor: f32,
    /// Modifiers applied on execution.
    pub effects: Vec<AbilityEffect>,
    /// Usability predicate.
    pub use_condition: Option<Arc<dyn UseCondition>>,
}

impl fmt::Debug for AbilityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbilityDefinition")
            .field("id", &self.id)
            .field("cast_time", &self.cast_time)
            .field("channel_duration", &self.channel_duration)
            .field("cooldown", &self.cooldown)
            .field("cost", &self.cost)
            .field("base_damage", &self.base_damage)
            .field("damage_type", &self.damage_type)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

impl AbilityDefinition {
    /// Create an instant, free, damage-less ability.
    pub fn new(id: impl Into<AbilityId>) -> Self {
        Self {
            id: id.into(),
            cast_time: 0.0,
            channel_duration: 0.0,
            cooldown: 0.0,
            interruptible: true,
            cost: None,
            base_damage: 0.0,
            damage_type: DamageType::Blunt,
            scaling_stat: None,
            scaling_factor: 0.0,
            secondary_stat: None,
            secondary_factor: 0.0,
            effects: Vec::new(),
            use_condition: None,
        }
    }

    /// Set cast time.
    #[must_use]
    pub fn with_cast_time(mut self, seconds: f64) -> Self {
        self.cast_time = seconds;
        self
    }

    /// Set channel duration.
    #[must_use]
    pub fn with_channel(mut self, seconds: f64) -> Self {
        self.channel_duration = seconds;
        self
    }

    /// Set cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, seconds: f64) -> Self {
        self.cooldown = seconds;
        self
    }

    /// Set interruptibility.
    #[must_use]
    pub fn interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    /// Flat resource cost.
    #[must_use]
    pub fn with_cost(mut self, resource: &str, amount: f32) -> Self {
        self.cost = Some(ResourceCost {
            resource: resource.trim().to_lowercase(),
            amount,
            percent_of_max: false,
        });
        self
    }

    /// Resource cost as a percentage of the pool maximum.
    #[must_use]
    pub fn with_percent_cost(mut self, resource: &str, percent: f32) -> Self {
        self.cost = Some(ResourceCost {
            resource: resource.trim().to_lowercase(),
            amount: percent,
            percent_of_max: true,
        });
        self
    }

    /// Set base damage and type.
    #[must_use]
    pub fn with_damage(mut self, base: f32, damage_type: DamageType) -> Self {
        self.base_damage = base;
        self.damage_type = damage_type;
        self
    }

    /// Set primary scaling.
    #[must_use]
    pub fn with_scaling(mut self, stat: impl Into<StatId>, factor: f32) -> Self {
        self.scaling_stat = Some(stat.into());
        self.scaling_factor = factor;
        self
    }

    /// Set secondary scaling.
    #[must_use]
    pub fn with_secondary_scaling(mut self, stat: impl Into<StatId>, factor: f32) -> Self {
        self.secondary_stat = Some(stat.into());
        self.secondary_factor = factor;
        self
    }

    /// Add an execution modifier.
    #[must_use]
    pub fn with_effect(mut self, effect: AbilityEffect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Set usability predicate.
    #[must_use]
    pub fn with_use_condition(mut self, condition: impl UseCondition + 'static) -> Self {
        self.use_condition = Some(Arc::new(condition));
        self
    }

    /// Whether execution deals damage.
    #[must_use]
    pub fn deals_damage(&self) -> bool {
        self.base_damage != 0.0 || self.scaling_stat.is_some() || self.secondary_stat.is_some()
    }

    /// `(base + stat × factor + secondary × factor) × (1 + type amplify)`.
    ///
    /// Per-cast multiplier and crit are applied by the caller.
    pub fn scaled_damage(&self, caster: EntityId, stats: &mut StatEngine) -> f32 {
        let mut damage = self.base_damage;
        if let Some(stat) = &self.scaling_stat {
            damage += stats.get(caster, stat) * self.scaling_factor;
        }
        if let Some(stat) = &self.secondary_stat {
            damage += stats.get(caster, stat) * self.secondary_factor;
        }
        let amplify = stats.get(caster, &self.damage_type.amplify_stat());
        (damage * (1.0 + amplify)).max(0.0)
    }

    /// Check for programming errors.
    pub fn validate(&self) -> ContractResult<()> {
        self.id.validate()?;
        for (what, value) in [
            ("cast time", self.cast_time),
            ("channel duration", self.channel_duration),
            ("cooldown", self.cooldown),
        ] {
            ContractError::check_finite(what, value)?;
            if value < 0.0 {
                return Err(ContractError::NegativeDuration {
                    id: self.id.as_str().to_string(),
                    duration: value,
                });
            }
        }
        ContractError::check_finite("base damage", f64::from(self.base_damage))?;
        ContractError::check_finite("scaling factor", f64::from(self.scaling_factor))?;
        ContractError::check_finite("secondary factor", f64::from(self.secondary_factor))?;
        if let Some(cost) = &self.cost {
            ContractError::check_finite("resource cost", f64::from(cost.amount))?;
        }
        self.effects
            .iter()
            .try_for_each(|e| e.to_modifier(&self.id, 0).validate())
    }
}

// ============================================================================
// Instances
// ============================================================================

/// One ability bound to one caster.
#[derive(Debug, Clone)]
pub struct AbilityInstance {
    /// Template.
    pub definition: Arc<AbilityDefinition>,
    /// Caster.
    pub caster: EntityId,
    /// Current state.
    pub state: AbilityState,
    /// When the current cast began.
    pub cast_started: Option<Timestamp>,
    /// When the current channel began.
    pub channel_started: Option<Timestamp>,
    /// When the current cooldown began.
    pub cooldown_started: Option<Timestamp>,
    /// Cooldown computed at cast time.
    pub effective_cooldown: f64,
    /// Current target.
    pub target: Option<EntityId>,
    /// Per-cast damage multiplier.
    pub damage_multiplier: f32,
    /// Set for forced executions.
    pub skip_resources: bool,
    reserved: Option<(StatId, f32)>,
}

impl AbilityInstance {
    fn new(definition: Arc<AbilityDefinition>, caster: EntityId) -> Self {
        Self {
            definition,
            caster,
            state: AbilityState::Ready,
            cast_started: None,
            channel_started: None,
            cooldown_started: None,
            effective_cooldown: 0.0,
            target: None,
            damage_multiplier: 1.0,
            skip_resources: false,
            reserved: None,
        }
    }

    /// Seconds of cooldown left at `now`.
    #[must_use]
    pub fn remaining_cooldown(&self, now: Timestamp) -> f64 {
        match (self.state, self.cooldown_started) {
            (AbilityState::OnCooldown, Some(started)) => {
                (self.effective_cooldown - (now - started)).max(0.0)
            },
            _ => 0.0,
        }
    }

    fn execution(&self, forced: bool) -> AbilityExecution {
        AbilityExecution {
            caster: self.caster,
            target: self.target,
            definition: Arc::clone(&self.definition),
            damage_multiplier: self.damage_multiplier,
            forced,
        }
    }

    fn start_cooldown(&mut self, at: Timestamp) {
        self.channel_started = None;
        self.cast_started = None;
        if self.effective_cooldown > 0.0 {
            self.state = AbilityState::OnCooldown;
            self.cooldown_started = Some(at);
        } else {
            self.state = AbilityState::Ready;
            self.cooldown_started = None;
        }
    }
}

/// An execution the caller must deliver.
#[derive(Debug, Clone)]
pub struct AbilityExecution {
    /// Caster.
    pub caster: EntityId,
    /// Target.
    pub target: Option<EntityId>,
    /// Template.
    pub definition: Arc<AbilityDefinition>,
    /// Per-cast damage multiplier.
    pub damage_multiplier: f32,
    /// Whether a proc forced it.
    pub forced: bool,
}

/// Result of an accepted cast.
#[derive(Debug, Clone)]
pub enum CastOutcome {
    /// Cast time started.
    Casting {
        /// When execution is due
        completes_at: Timestamp,
    },
    /// No cast time; deliver now.
    Executing(AbilityExecution),
}

// ============================================================================
// Engine
// ============================================================================

/// Templates and per-caster ability instances.
#[derive(Debug)]
pub struct AbilityEngine {
    templates: AHashMap<AbilityId, Arc<AbilityDefinition>>,
    instances: AHashMap<(EntityId, AbilityId), AbilityInstance>,
    pools: ResourcePools,
    buff_order: i32,
    events: EventBus,
}

impl AbilityEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(pools: ResourcePools, buff_order: i32, events: EventBus) -> Self {
        Self {
            templates: AHashMap::new(),
            instances: AHashMap::new(),
            pools,
            buff_order,
            events,
        }
    }

    /// Ordering tier of ability modifiers.
    #[must_use]
    pub fn buff_order(&self) -> i32 {
        self.buff_order
    }

    /// Resource types.
    #[must_use]
    pub fn pools(&self) -> &ResourcePools {
        &self.pools
    }

    /// Mutable resource types.
    pub fn pools_mut(&mut self) -> &mut ResourcePools {
        &mut self.pools
    }

    /// Register or replace a template. Existing instances keep the old one.
    pub fn register(&mut self, definition: AbilityDefinition) -> ContractResult<()> {
        definition.validate()?;
        self.templates
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    /// Template by id.
    #[must_use]
    pub fn definition(&self, ability: &AbilityId) -> Option<&Arc<AbilityDefinition>> {
        self.templates.get(ability)
    }

    /// Bind a template to a caster. False if the template is unknown.
    pub fn grant(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        let Some(definition) = self.templates.get(ability) else {
            return false;
        };
        let definition = Arc::clone(definition);
        self.instances
            .entry((caster, ability.clone()))
            .or_insert_with(|| AbilityInstance::new(definition, caster));
        true
    }

    /// Unbind an ability.
    pub fn revoke(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        self.instances.remove(&(caster, ability.clone())).is_some()
    }

    /// Disable an ability permanently.
    pub fn disable(&mut self, caster: EntityId, ability: &AbilityId) -> bool {
        match self.instances.get_mut(&(caster, ability.clone())) {
            Some(instance) => {
                instance.state = AbilityState::Disabled;
                true
            },
            None => false,
        }
    }

    /// Instance of a caster's ability.
    #[must_use]
    pub fn instance(&self, caster: EntityId, ability: &AbilityId) -> Option<&AbilityInstance> {
        self.instances.get(&(caster, ability.clone()))
    }

    /// State of a caster's ability.
    #[must_use]
    pub fn state(&self, caster: EntityId, ability: &AbilityId) -> Option<AbilityState> {
        self.instance(caster, ability).map(|i| i.state)
    }

    /// Seconds of cooldown left (0 when ready or unknown).
    #[must_use]
    pub fn remaining_cooldown(&self, caster: EntityId, ability: &AbilityId, now: Timestamp) -> f64 {
        self.instance(caster, ability)
            .map_or(0.0, |i| i.remaining_cooldown(now))
    }

    /// Casters with at least one ability.
    #[must_use]
    pub fn casters(&self) -> Vec<EntityId> {
        let mut casters: Vec<EntityId> = self.instances.keys().map(|(c, _)| *c).collect();
        casters.sort_unstable();
        casters.dedup();
        casters
    }

    /// Drop every ability of a caster.
    pub fn remove_caster(&mut self, caster: EntityId) -> usize {
        let before = self.instances.len();
        self.instances.retain(|(c, _), _| *c != caster);
        before - self.instances.len()
    }

    /// Start a normal cast.
    pub fn try_cast(
        &mut self,
        caster: EntityId,
        ability: &AbilityId,
        target: Option<EntityId>,
        stats: &mut StatEngine,
        now: Timestamp,
    ) -> Result<CastOutcome, CastError> {
        let instance = self
            .instances
            .get_mut(&(caster, ability.clone()))
            .ok_or_else(|| CastError::NotGranted(ability.clone()))?;

        match instance.state {
            AbilityState::Disabled => return Err(CastError::Disabled),
            AbilityState::Casting | AbilityState::Channeling | AbilityState::Executing => {
                return Err(CastError::AlreadyCasting)
            },
            AbilityState::OnCooldown => {
                let remaining = instance.remaining_cooldown(now);
                if remaining > 0.0 {
                    return Err(CastError::OnCooldown { remaining });
                }
            },
            AbilityState::Ready => {},
        }

        let definition = Arc::clone(&instance.definition);
        if let Some(condition) = &definition.use_condition {
            let usable = isolate_value("use condition", false, || condition.usable(caster, stats));
            if !usable {
                return Err(CastError::UseConditionFailed);
            }
        }

        let reserved = match &definition.cost {
            Some(cost) => reserve(&self.pools, cost, caster, stats)?,
            None => None,
        };

        instance.effective_cooldown = effective_cooldown(&definition, caster, stats);
        instance.target = target;
        instance.damage_multiplier = 1.0;
        instance.skip_resources = false;
        instance.reserved = reserved;
        instance.cooldown_started = None;

        if definition.cast_time > 0.0 {
            instance.state = AbilityState::Casting;
            instance.cast_started = Some(now);
            debug!(%caster, ability = %definition.id, "cast started");
            self.events.publish(CombatEvent::AbilityCastStarted {
                caster,
                ability: definition.id.clone(),
            });
            Ok(CastOutcome::Casting {
                completes_at: now + definition.cast_time,
            })
        } else {
            instance.state = AbilityState::Executing;
            instance.cast_started = Some(now);
            instance.reserved = None;
            Ok(CastOutcome::Executing(instance.execution(false)))
        }
    }

    /// Execute at once, skipping cast time, predicate and costs.
    ///
    /// Grants the ability if the caster lacks it. A running cooldown still
    /// blocks, as does an execution or channel in progress. A cast still in
    /// its cast time is superseded and its reserved cost refunded. A new
    /// cooldown starts on completion.
    pub fn force(
        &mut self,
        caster: EntityId,
        ability: &AbilityId,
        target: Option<EntityId>,
        damage_multiplier: f32,
        stats: &mut StatEngine,
        now: Timestamp,
    ) -> Result<AbilityExecution, CastError> {
        ContractError::check_finite("damage multiplier", f64::from(damage_multiplier))?;
        if !self.grant(caster, ability) {
            return Err(CastError::NotGranted(ability.clone()));
        }
        let Some(instance) = self.instances.get_mut(&(caster, ability.clone())) else {
            return Err(CastError::NotGranted(ability.clone()));
        };
        match instance.state {
            AbilityState::Disabled => return Err(CastError::Disabled),
            AbilityState::Executing | AbilityState::Channeling => {
                return Err(CastError::AlreadyCasting);
            },
            AbilityState::OnCooldown => {
                let remaining = instance.remaining_cooldown(now);
                if remaining > 0.0 {
                    return Err(CastError::OnCooldown { remaining });
                }
            },
            AbilityState::Ready | AbilityState::Casting => {},
        }
        if let Some((stat, amount)) = instance.reserved.take() {
            debug!(%caster, %ability, "forced execution supersedes cast");
            refund(stats, caster, &stat, amount);
        }

        let definition = Arc::clone(&instance.definition);
        instance.effective_cooldown = effective_cooldown(&definition, caster, stats);
        instance.state = AbilityState::Executing;
        instance.cast_started = Some(now);
        instance.cooldown_started = None;
        instance.target = target;
        instance.damage_multiplier = damage_multiplier;
        instance.skip_resources = true;
        debug!(%caster, ability = %definition.id, "forced execution");
        Ok(instance.execution(true))
    }

    /// Finish an execution: enter channeling or cooldown.
    pub fn complete(&mut self, caster: EntityId, ability: &AbilityId, now: Timestamp) -> bool {
        let Some(instance) = self.instances.get_mut(&(caster, ability.clone())) else {
            return false;
        };
        if instance.state != AbilityState::Executing {
            return false;
        }
        if instance.definition.channel_duration > 0.0 {
            instance.state = AbilityState::Channeling;
            instance.channel_started = Some(now);
        } else {
            instance.start_cooldown(now);
        }
        self.events.publish(CombatEvent::AbilityExecuted {
            caster,
            ability: ability.clone(),
            forced: instance.skip_resources,
        });
        true
    }

    /// Interrupt a cast or channel. Resources reserved by a cast are refunded.
    pub fn interrupt(&mut self, caster: EntityId, ability: &AbilityId, stats: &mut StatEngine) -> bool {
        let Some(instance) = self.instances.get_mut(&(caster, ability.clone())) else {
            return false;
        };
        if !matches!(instance.state, AbilityState::Casting | AbilityState::Channeling)
            || !instance.definition.interruptible
        {
            return false;
        }
        if let Some((stat, amount)) = instance.reserved.take() {
            refund(stats, caster, &stat, amount);
        }
        instance.state = AbilityState::Ready;
        instance.cast_started = None;
        instance.channel_started = None;
        debug!(%caster, %ability, "ability interrupted");
        self.events.publish(CombatEvent::AbilityInterrupted {
            caster,
            ability: ability.clone(),
        });
        true
    }

    /// Interrupt everything a caster is casting or channeling.
    pub fn interrupt_all(&mut self, caster: EntityId, stats: &mut StatEngine) -> usize {
        let abilities: Vec<AbilityId> = self
            .instances
            .keys()
            .filter(|(c, _)| *c == caster)
            .map(|(_, a)| a.clone())
            .collect();
        abilities
            .iter()
            .filter(|ability| self.interrupt(caster, ability, stats))
            .count()
    }

    /// Advance timers. Returns casts whose cast time elapsed.
    pub fn update(&mut self, now: Timestamp) -> Vec<AbilityExecution> {
        let mut due = Vec::new();
        for instance in self.instances.values_mut() {
            match instance.state {
                AbilityState::Casting => {
                    let started = instance.cast_started.unwrap_or(now);
                    if now - started >= instance.definition.cast_time {
                        instance.state = AbilityState::Executing;
                        instance.reserved = None;
                        due.push(instance.execution(false));
                    }
                },
                AbilityState::Channeling => {
                    let started = instance.channel_started.unwrap_or(now);
                    let ends = started + instance.definition.channel_duration;
                    if now >= ends {
                        instance.start_cooldown(ends);
                    }
                },
                AbilityState::OnCooldown => {
                    if instance.remaining_cooldown(now) <= 0.0 {
                        instance.state = AbilityState::Ready;
                        instance.cooldown_started = None;
                    }
                },
                AbilityState::Ready | AbilityState::Executing | AbilityState::Disabled => {},
            }
        }
        due.sort_by(|a, b| {
            (a.caster, &a.definition.id).cmp(&(b.caster, &b.definition.id))
        });
        due
    }
}

fn effective_cooldown(definition: &AbilityDefinition, caster: EntityId, stats: &mut StatEngine) -> f64 {
    let reduction = stats.get(caster, &StatId::from(stats::COOLDOWN_REDUCTION));
    definition.cooldown * (1.0 - f64::from(reduction))
}

fn reserve(
    pools: &ResourcePools,
    cost: &ResourceCost,
    caster: EntityId,
    stats: &mut StatEngine,
) -> Result<Option<(StatId, f32)>, CastError> {
    let Some(pool) = pools.get(&cost.resource) else {
        return Ok(None);
    };
    let available = stats.get(caster, &pool.current);
    let required = if cost.percent_of_max {
        stats.get(caster, &pool.max) * cost.amount / 100.0
    } else {
        cost.amount
    };
    if available < required {
        return Err(CastError::InsufficientResource {
            resource: pool.resource.clone(),
            required,
            available,
        });
    }
    stats.adjust_base(caster, &pool.current, -required)?;
    Ok(Some((pool.current.clone(), required)))
}

fn refund(stats: &mut StatEngine, caster: EntityId, stat: &StatId, amount: f32) {
    if let Err(error) = stats.adjust_base(caster, stat, amount) {
        warn!(%caster, %stat, %error, "resource refund failed");
    }
}
