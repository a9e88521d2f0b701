//! Event bus for combat notifications.
//!
//! Every engine publishes into a shared bus; the host drains it once per tick
//! for UI, audio, logging or replication.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::warn;

use runeforge_common::{AbilityId, EffectId, EntityId, ItemId, ModifierId, StatId};

/// Why a modifier or effect left its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    /// Removed by id.
    Explicit,
    /// Removed as part of a by-source sweep.
    Source,
    /// Duration ran out.
    Expired,
    /// Superseded by a `Replace` application.
    Replaced,
    /// Removed by a dispel.
    Dispelled,
    /// Owner was torn down.
    Teardown,
}

/// Event types published by the combat core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A base value changed by more than the configured epsilon.
    StatChanged {
        /// Entity ID
        entity: EntityId,
        /// Stat whose base changed
        stat: StatId,
        /// Previous base
        old: f32,
        /// New base
        new: f32,
    },
    /// A modifier was added, replaced, refreshed or stacked.
    ModifierAdded {
        /// Entity ID
        entity: EntityId,
        /// Stat modified
        stat: StatId,
        /// Modifier id (derived id for independent entries)
        modifier: ModifierId,
    },
    /// A modifier left its slot.
    ModifierRemoved {
        /// Entity ID
        entity: EntityId,
        /// Stat modified
        stat: StatId,
        /// Modifier id
        modifier: ModifierId,
        /// Why it was removed
        reason: RemovalReason,
    },
    /// All state of an entity was torn down.
    EntityRemoved {
        /// Entity ID
        entity: EntityId,
    },
    /// A hit rolled a critical.
    CriticalHit {
        /// Attacker
        attacker: EntityId,
        /// Target
        target: EntityId,
        /// Applied multiplier
        multiplier: f32,
    },
    /// A hit finished mitigation.
    DamageResolved {
        /// Attacker
        attacker: EntityId,
        /// Target
        target: EntityId,
        /// Final damage
        amount: f32,
        /// Whether it was a critical
        critical: bool,
    },
    /// A hit was cancelled by a pre-damage hook.
    DamageCancelled {
        /// Attacker
        attacker: EntityId,
        /// Target
        target: EntityId,
        /// Reason given by the hook
        reason: String,
    },
    /// A hit was lethal. Health deduction is the host's job.
    Killed {
        /// Killer
        attacker: EntityId,
        /// Victim
        target: EntityId,
        /// Final damage of the lethal hit
        amount: f32,
    },
    /// An effect was applied or re-applied.
    EffectApplied {
        /// Owner
        owner: EntityId,
        /// Definition id
        effect: EffectId,
        /// Stacks after application
        stacks: u32,
    },
    /// An effect was removed.
    EffectRemoved {
        /// Owner
        owner: EntityId,
        /// Definition id
        effect: EffectId,
        /// Why it was removed
        reason: RemovalReason,
    },
    /// An effect proc succeeded.
    ProcFired {
        /// Owner of the proc
        owner: EntityId,
        /// Effect that fired
        effect: EffectId,
    },
    /// An item proc succeeded.
    ItemProcFired {
        /// Owner of the item
        owner: EntityId,
        /// Item that fired
        item: ItemId,
    },
    /// A cast began its cast time.
    AbilityCastStarted {
        /// Caster
        caster: EntityId,
        /// Ability
        ability: AbilityId,
    },
    /// An ability executed (damage and effects delivered).
    AbilityExecuted {
        /// Caster
        caster: EntityId,
        /// Ability
        ability: AbilityId,
        /// Whether execution was forced by a proc
        forced: bool,
    },
    /// A cast or channel was interrupted.
    AbilityInterrupted {
        /// Caster
        caster: EntityId,
        /// Ability
        ability: AbilityId,
    },
}

/// Event bus for broadcasting combat events.
///
/// Clones share one channel, so each engine can hold its own handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<CombatEvent>,
    /// Receiver for collecting events
    receiver: Receiver<CombatEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            capacity: capacity.max(1),
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: CombatEvent) {
        // Non-blocking send - if full, event is dropped
        if self.sender.try_send(event).is_err() {
            warn!(capacity = self.capacity, "event bus full, dropping event");
        }
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<CombatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<CombatEvent> {
        self.sender.clone()
    }
}
