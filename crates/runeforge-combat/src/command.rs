//! Deferred commands emitted by effect, proc and hook callbacks.
//!
//! Callbacks only get read access to stats. Anything that mutates combat
//! state is queued here and executed by the runtime once the dispatch that
//! produced it has finished.

use std::sync::Arc;

use runeforge_common::{AbilityId, EffectId, EntityId, ModifierId, StatId};

use crate::damage::{DamageInstance, DamageType};
use crate::effect::EffectDefinition;
use crate::modifier::Modifier;
use crate::pipeline::DamageMode;

/// A queued state change.
#[derive(Debug)]
pub enum EffectCommand {
    /// Add a modifier to an entity.
    ApplyModifier {
        /// Entity
        entity: EntityId,
        /// Modifier to add
        modifier: Modifier,
    },
    /// Remove a modifier by id.
    RemoveModifier {
        /// Entity
        entity: EntityId,
        /// Stat slot
        stat: StatId,
        /// Modifier id
        id: ModifierId,
    },
    /// Remove every modifier of an entity from a source.
    RemoveModifiersFromSource {
        /// Entity
        entity: EntityId,
        /// Source label
        source: String,
    },
    /// Run a hit through the damage pipeline.
    DealDamage {
        /// The hit
        hit: Box<DamageInstance>,
        /// Which phases to run
        mode: DamageMode,
    },
    /// Apply an effect.
    ApplyEffect {
        /// Owner of the new instance
        owner: EntityId,
        /// Definition
        definition: Arc<EffectDefinition>,
        /// Entity credited with the effect
        source: Option<EntityId>,
        /// Magnitude (damage per tick for DoTs)
        magnitude: f32,
    },
    /// Remove every instance of an effect.
    RemoveEffect {
        /// Owner
        owner: EntityId,
        /// Definition id
        effect: EffectId,
    },
    /// Execute an ability immediately, skipping cast time and costs.
    ForceAbility {
        /// Caster
        caster: EntityId,
        /// Ability
        ability: AbilityId,
        /// Target
        target: Option<EntityId>,
        /// Per-cast damage multiplier
        damage_multiplier: f32,
    },
}

impl EffectCommand {
    /// Whether the command only tears state down and cannot start new hits.
    #[must_use]
    pub fn is_cleanup(&self) -> bool {
        matches!(
            self,
            Self::RemoveModifier { .. } | Self::RemoveModifiersFromSource { .. } | Self::RemoveEffect { .. }
        )
    }
}

/// Commands queued during one dispatch.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<EffectCommand>,
}

impl CommandBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command.
    pub fn push(&mut self, command: EffectCommand) {
        self.commands.push(command);
    }

    /// Queue a modifier.
    pub fn apply_modifier(&mut self, entity: EntityId, modifier: Modifier) {
        self.push(EffectCommand::ApplyModifier { entity, modifier });
    }

    /// Queue a modifier removal.
    pub fn remove_modifier(&mut self, entity: EntityId, stat: StatId, id: ModifierId) {
        self.push(EffectCommand::RemoveModifier { entity, stat, id });
    }

    /// Queue removal of everything an entity holds from `source`.
    pub fn remove_modifiers_from_source(&mut self, entity: EntityId, source: impl Into<String>) {
        self.push(EffectCommand::RemoveModifiersFromSource {
            entity,
            source: source.into(),
        });
    }

    /// Queue a hit.
    pub fn deal_damage(&mut self, hit: DamageInstance, mode: DamageMode) {
        self.push(EffectCommand::DealDamage {
            hit: Box::new(hit),
            mode,
        });
    }

    /// Queue a single-type direct hit that cannot proc.
    pub fn deal_direct(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        damage_type: DamageType,
        amount: f32,
        source: &str,
    ) {
        let hit = DamageInstance::new(attacker, target)
            .with_damage(damage_type, amount)
            .with_source(source)
            .without_procs();
        self.deal_damage(hit, DamageMode::Direct);
    }

    /// Queue an effect application.
    pub fn apply_effect(
        &mut self,
        owner: EntityId,
        definition: Arc<EffectDefinition>,
        source: Option<EntityId>,
        magnitude: f32,
    ) {
        self.push(EffectCommand::ApplyEffect {
            owner,
            definition,
            source,
            magnitude,
        });
    }

    /// Queue an effect removal.
    pub fn remove_effect(&mut self, owner: EntityId, effect: EffectId) {
        self.push(EffectCommand::RemoveEffect { owner, effect });
    }

    /// Queue a forced ability execution.
    pub fn force_ability(
        &mut self,
        caster: EntityId,
        ability: AbilityId,
        target: Option<EntityId>,
        damage_multiplier: f32,
    ) {
        self.push(EffectCommand::ForceAbility {
            caster,
            ability,
            target,
            damage_multiplier,
        });
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take the queued commands in order.
    pub fn take(&mut self) -> Vec<EffectCommand> {
        std::mem::take(&mut self.commands)
    }
}
