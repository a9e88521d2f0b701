//! Procs granted by equipped items.
//!
//! Same gating model as effect procs, keyed by (owner, item) so unequipping an
//! item drops exactly its procs.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use fastrand::Rng;
use tracing::debug;

use runeforge_common::{
    AbilityId, ContractError, ContractResult, EntityId, HandlerResult, ItemId, Timestamp,
};

use crate::command::CommandBuffer;
use crate::damage::DamageInstance;
use crate::effect::{condition_allows, EffectDefinition, LowHealthLatch, ProcCondition, ProcGate, TriggerKind};
use crate::events::{CombatEvent, EventBus};
use crate::guard::isolate;
use crate::pipeline::ProcEvent;
use crate::stat_engine::StatEngine;

/// What an item proc does when it fires.
#[derive(Clone)]
pub enum ItemProcPayload {
    /// Execute an ability at once, skipping cast time and costs.
    ForceAbility {
        /// Ability to execute
        ability: AbilityId,
        /// Per-cast damage multiplier
        damage_multiplier: f32,
    },
    /// Apply an effect to the owner or the other party.
    ApplyEffect {
        /// Effect to apply
        definition: Arc<EffectDefinition>,
        /// Apply to the other party instead of the owner
        to_other: bool,
        /// Effect magnitude
        magnitude: f32,
    },
    /// Run custom logic.
    Handler(Arc<dyn ItemProcHandler>),
}

impl fmt::Debug for ItemProcPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForceAbility { ability, damage_multiplier } => f
                .debug_struct("ForceAbility")
                .field("ability", ability)
                .field("damage_multiplier", damage_multiplier)
                .finish(),
            Self::ApplyEffect { definition, to_other, magnitude } => f
                .debug_struct("ApplyEffect")
                .field("effect", &definition.id)
                .field("to_other", to_other)
                .field("magnitude", magnitude)
                .finish(),
            Self::Handler(_) => f.write_str("Handler"),
        }
    }
}

/// What a custom item proc sees of the world.
pub struct ItemProcContext<'a> {
    /// Item owner.
    pub owner: EntityId,
    /// Item.
    pub item: ItemId,
    /// Other party of the hit (the owner for low-health procs).
    pub other: EntityId,
    /// Current time.
    pub now: Timestamp,
    /// Read access to stats.
    pub stats: &'a StatEngine,
    /// Queue for state changes.
    pub commands: &'a mut CommandBuffer,
}

/// Custom item proc logic.
pub trait ItemProcHandler: Send + Sync {
    /// Proc fired. `hit` is absent for low-health procs.
    fn fire(&self, ctx: &mut ItemProcContext<'_>, hit: Option<&DamageInstance>) -> HandlerResult;
}

impl<F> ItemProcHandler for F
where
    F: Fn(&mut ItemProcContext<'_>, Option<&DamageInstance>) -> HandlerResult + Send + Sync,
{
    fn fire(&self, ctx: &mut ItemProcContext<'_>, hit: Option<&DamageInstance>) -> HandlerResult {
        self(ctx, hit)
    }
}

/// One proc an item grants.
#[derive(Clone)]
pub struct ItemProcDefinition {
    /// Trigger.
    pub trigger: TriggerKind,
    /// Chance (1.0 or more always fires).
    pub chance: f32,
    /// Seconds between procs.
    pub cooldown: f64,
    /// Extra filter over the hit.
    pub condition: Option<Arc<dyn ProcCondition>>,
    /// Action.
    pub payload: ItemProcPayload,
}

impl fmt::Debug for ItemProcDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemProcDefinition")
            .field("trigger", &self.trigger)
            .field("chance", &self.chance)
            .field("cooldown", &self.cooldown)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl ItemProcDefinition {
    /// Create a proc.
    #[must_use]
    pub fn new(trigger: TriggerKind, chance: f32, cooldown: f64, payload: ItemProcPayload) -> Self {
        Self {
            trigger,
            chance,
            cooldown,
            condition: None,
            payload,
        }
    }

    /// Proc that forces an ability.
    pub fn force_ability(
        trigger: TriggerKind,
        chance: f32,
        cooldown: f64,
        ability: impl Into<AbilityId>,
    ) -> Self {
        Self::new(
            trigger,
            chance,
            cooldown,
            ItemProcPayload::ForceAbility {
                ability: ability.into(),
                damage_multiplier: 1.0,
            },
        )
    }

    /// Set filter.
    #[must_use]
    pub fn with_condition(mut self, condition: impl ProcCondition + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Check for programming errors.
    pub fn validate(&self) -> ContractResult<()> {
        ContractError::check_finite("item proc chance", f64::from(self.chance))?;
        ContractError::check_finite("item proc cooldown", self.cooldown)?;
        if self.cooldown < 0.0 {
            return Err(ContractError::NegativeDuration {
                id: "item proc".to_string(),
                duration: self.cooldown,
            });
        }
        match &self.payload {
            ItemProcPayload::ForceAbility { ability, damage_multiplier } => {
                ability.validate()?;
                ContractError::check_finite("damage multiplier", f64::from(*damage_multiplier))
            },
            ItemProcPayload::ApplyEffect { definition, .. } => definition.validate(),
            ItemProcPayload::Handler(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
struct ItemProcState {
    definition: Arc<ItemProcDefinition>,
    gate: ProcGate,
    latch: LowHealthLatch,
}

/// Procs of equipped items.
#[derive(Debug)]
pub struct ItemProcLayer {
    procs: AHashMap<(EntityId, ItemId), Vec<ItemProcState>>,
    events: EventBus,
}

impl ItemProcLayer {
    /// Create an empty layer.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            procs: AHashMap::new(),
            events,
        }
    }

    /// Equip an item's procs, replacing any it had.
    pub fn equip(
        &mut self,
        owner: EntityId,
        item: ItemId,
        procs: Vec<ItemProcDefinition>,
    ) -> ContractResult<()> {
        if !owner.is_valid() {
            return Err(ContractError::NullEntity { operation: "equip" });
        }
        item.validate()?;
        procs.iter().try_for_each(ItemProcDefinition::validate)?;

        debug!(%owner, %item, count = procs.len(), "item procs equipped");
        let states = procs
            .into_iter()
            .map(|definition| ItemProcState {
                gate: ProcGate::new(definition.chance, definition.cooldown),
                latch: LowHealthLatch::default(),
                definition: Arc::new(definition),
            })
            .collect();
        self.procs.insert((owner, item), states);
        Ok(())
    }

    /// Drop an item's procs.
    pub fn unequip(&mut self, owner: EntityId, item: &ItemId) -> bool {
        self.procs.remove(&(owner, item.clone())).is_some()
    }

    /// Drop every item of an owner. Returns how many items were removed.
    pub fn unequip_all(&mut self, owner: EntityId) -> usize {
        let before = self.procs.len();
        self.procs.retain(|(o, _), _| *o != owner);
        before - self.procs.len()
    }

    /// Whether an item has procs registered.
    #[must_use]
    pub fn is_equipped(&self, owner: EntityId, item: &ItemId) -> bool {
        self.procs.contains_key(&(owner, item.clone()))
    }

    /// Owners with at least one item.
    #[must_use]
    pub fn owners(&self) -> Vec<EntityId> {
        let mut owners: Vec<EntityId> = self.procs.keys().map(|(o, _)| *o).collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }

    /// Owners carrying a low-health item proc.
    #[must_use]
    pub fn low_health_owners(&self) -> Vec<EntityId> {
        let mut owners: Vec<EntityId> = self
            .procs
            .iter()
            .filter(|(_, states)| {
                states
                    .iter()
                    .any(|s| s.definition.trigger.low_health_threshold().is_some())
            })
            .map(|((o, _), _)| *o)
            .collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }

    /// Offer a hit event to the owner's item procs. Returns how many fired.
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
        let mut fired = Vec::new();

        for (item, states) in self.owned_mut(owner) {
            for state in states.iter_mut() {
                if !state.definition.trigger.matches(event)
                    || !state.gate.ready(now)
                    || !condition_allows(state.definition.condition.as_ref(), owner, other, hit)
                    || !state.gate.roll(rng)
                {
                    continue;
                }
                state.gate.stamp(now);
                fire(&state.definition.payload, owner, item, other, Some(hit), stats, commands, now);
                fired.push(item.clone());
            }
        }
        self.announce(owner, fired)
    }

    /// Feed the owner's health fraction to low-health item procs.
    pub fn check_low_health(
        &mut self,
        owner: EntityId,
        fraction: f32,
        stats: &StatEngine,
        rng: &mut Rng,
        commands: &mut CommandBuffer,
        now: Timestamp,
    ) -> usize {
        let mut fired = Vec::new();
        for (item, states) in self.owned_mut(owner) {
            for state in states.iter_mut() {
                let Some(threshold) = state.definition.trigger.low_health_threshold() else {
                    continue;
                };
                if !state.latch.observe(fraction, threshold)
                    || !state.gate.ready(now)
                    || !state.gate.roll(rng)
                {
                    continue;
                }
                state.gate.stamp(now);
                fire(&state.definition.payload, owner, item, owner, None, stats, commands, now);
                fired.push(item.clone());
            }
        }
        self.announce(owner, fired)
    }

    /// Procs of one owner in item id order.
    fn owned_mut(&mut self, owner: EntityId) -> Vec<(&ItemId, &mut Vec<ItemProcState>)> {
        let mut owned: Vec<_> = self
            .procs
            .iter_mut()
            .filter(|((o, _), _)| *o == owner)
            .map(|((_, item), states)| (item, states))
            .collect();
        owned.sort_unstable_by(|a, b| a.0.cmp(b.0));
        owned
    }

    fn announce(&self, owner: EntityId, fired: Vec<ItemId>) -> usize {
        let count = fired.len();
        for item in fired {
            debug!(%owner, %item, "item proc fired");
            self.events.publish(CombatEvent::ItemProcFired { owner, item });
        }
        count
    }
}

#[allow(clippy::too_many_arguments)]
fn fire(
    payload: &ItemProcPayload,
    owner: EntityId,
    item: &ItemId,
    other: EntityId,
    hit: Option<&DamageInstance>,
    stats: &StatEngine,
    commands: &mut CommandBuffer,
    now: Timestamp,
) {
    match payload {
        ItemProcPayload::ForceAbility { ability, damage_multiplier } => {
            let target = (other != owner).then_some(other);
            commands.force_ability(owner, ability.clone(), target, *damage_multiplier);
        },
        ItemProcPayload::ApplyEffect { definition, to_other, magnitude } => {
            let target = if *to_other { other } else { owner };
            commands.apply_effect(target, Arc::clone(definition), Some(owner), *magnitude);
        },
        ItemProcPayload::Handler(handler) => {
            let mut ctx = ItemProcContext {
                owner,
                item: item.clone(),
                other,
                now,
                stats,
                commands,
            };
            let _ = isolate(item.as_str(), || handler.fire(&mut ctx, hit));
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::EffectCommand;
    use crate::definitions::StatRegistry;
    use runeforge_common::HandlerError;

    fn setup() -> (StatEngine, ItemProcLayer, Rng, CommandBuffer) {
        let bus = EventBus::new(64);
        (
            StatEngine::new(StatRegistry::with_core_stats(), bus.clone()),
            ItemProcLayer::new(bus),
            Rng::with_seed(11),
            CommandBuffer::new(),
        )
    }

    fn owner() -> EntityId {
        EntityId::from_raw(1)
    }

    fn target() -> EntityId {
        EntityId::from_raw(2)
    }

    #[test]
    fn test_force_ability_payload() {
        let (stats, mut layer, mut rng, mut commands) = setup();
        layer
            .equip(
                owner(),
                ItemId::from("Mjolnir"),
                vec![ItemProcDefinition::force_ability(TriggerKind::OnHit, 1.0, 5.0, "chain_lightning")],
            )
            .expect("valid procs");

        let hit = DamageInstance::new(owner(), target());
        assert_eq!(layer.dispatch(ProcEvent::Hit, &hit, &stats, &mut rng, &mut commands, 0.0), 1);
        assert_eq!(layer.dispatch(ProcEvent::Hit, &hit, &stats, &mut rng, &mut commands, 1.0), 0);

        match commands.take().as_slice() {
            [EffectCommand::ForceAbility { caster, ability, target: t, damage_multiplier }] => {
                assert_eq!(*caster, owner());
                assert_eq!(ability.as_str(), "chain_lightning");
                assert_eq!(*t, Some(target()));
                assert_eq!(*damage_multiplier, 1.0);
            },
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn test_unequip_scopes_to_item() {
        let (stats, mut layer, mut rng, mut commands) = setup();
        let proc = || ItemProcDefinition::force_ability(TriggerKind::OnHit, 1.0, 0.0, "zap");
        layer.equip(owner(), ItemId::from("ring"), vec![proc()]).expect("valid");
        layer.equip(owner(), ItemId::from("amulet"), vec![proc()]).expect("valid");
        assert!(layer.unequip(owner(), &ItemId::from("RING")));
        assert!(!layer.unequip(owner(), &ItemId::from("ring")));

        let hit = DamageInstance::new(owner(), target());
        assert_eq!(layer.dispatch(ProcEvent::Hit, &hit, &stats, &mut rng, &mut commands, 0.0), 1);
        assert_eq!(layer.unequip_all(owner()), 1);
        assert!(layer.owners().is_empty());
    }

    #[test]
    fn test_handler_failure_contained() {
        let (stats, mut layer, mut rng, mut commands) = setup();
        let failing = ItemProcDefinition::new(
            TriggerKind::OnDamageTaken,
            1.0,
            0.0,
            ItemProcPayload::Handler(Arc::new(
                |_: &mut ItemProcContext<'_>, _: Option<&DamageInstance>| -> HandlerResult {
                    Err(HandlerError::failed("cursed"))
                },
            )),
        );
        let effect = Arc::new(EffectDefinition::new("thorns"));
        let applying = ItemProcDefinition::new(
            TriggerKind::OnDamageTaken,
            1.0,
            0.0,
            ItemProcPayload::ApplyEffect {
                definition: effect,
                to_other: true,
                magnitude: 1.0,
            },
        );
        layer
            .equip(target(), ItemId::from("shield"), vec![failing, applying])
            .expect("valid");

        let hit = DamageInstance::new(owner(), target());
        assert_eq!(layer.dispatch(ProcEvent::DamageTaken, &hit, &stats, &mut rng, &mut commands, 0.0), 2);
        assert!(matches!(
            commands.take().as_slice(),
            [EffectCommand::ApplyEffect { owner: o, source: Some(s), .. }] if *o == owner() && *s == target()
        ));
    }

    #[test]
    fn test_low_health_item_proc() {
        let (stats, mut layer, mut rng, mut commands) = setup();
        layer
            .equip(
                owner(),
                ItemId::from("berserker_belt"),
                vec![ItemProcDefinition::force_ability(
                    TriggerKind::OnLowHealth { threshold: 0.25 },
                    1.0,
                    0.0,
                    "second_wind",
                )],
            )
            .expect("valid");
        assert_eq!(layer.low_health_owners(), vec![owner()]);

        let fired: usize = [1.0, 0.2, 0.1, 0.9, 0.2]
            .iter()
            .map(|f| layer.check_low_health(owner(), *f, &stats, &mut rng, &mut commands, 0.0))
            .sum();
        assert_eq!(fired, 2);
        assert!(commands
            .take()
            .iter()
            .all(|c| matches!(c, EffectCommand::ForceAbility { target: None, .. })));
    }

    #[test]
    fn test_invalid_proc_rejected() {
        let (_, mut layer, _, _) = setup();
        let bad = ItemProcDefinition::force_ability(TriggerKind::OnHit, f32::NAN, 0.0, "zap");
        assert!(layer.equip(owner(), ItemId::from("wand"), vec![bad]).is_err());
        assert!(layer
            .equip(EntityId::NULL, ItemId::from("wand"), Vec::new())
            .is_err());
    }
}
