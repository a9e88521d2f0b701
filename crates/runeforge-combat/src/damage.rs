//! Damage types and per-hit damage instances.
//!
//! This module provides:
//! - Physical sub-types, elements and true damage
//! - The stat ids each type reads (bonus, resistance, amplification)
//! - `DamageInstance`, the mutable record a hit carries through the pipeline
//! - Typed extension data attached to a hit

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use runeforge_common::{EntityId, StatId};

use crate::definitions::stats;

// ============================================================================
// Damage Types
// ============================================================================

/// Types of damage a hit can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DamageType {
    /// Blunt physical damage.
    Blunt,
    /// Slashing physical damage.
    Slash,
    /// Piercing physical damage.
    Pierce,
    /// Tree-felling physical damage.
    Chop,
    /// Mining physical damage.
    Pickaxe,
    /// Fire damage.
    Fire,
    /// Frost damage.
    Frost,
    /// Lightning damage.
    Lightning,
    /// Poison damage.
    Poison,
    /// Spirit damage.
    Spirit,
    /// Ignores all mitigation.
    True,
}

impl DamageType {
    /// Physical sub-types.
    pub const PHYSICAL: [Self; 5] = [Self::Blunt, Self::Slash, Self::Pierce, Self::Chop, Self::Pickaxe];

    /// Elemental types.
    pub const ELEMENTAL: [Self; 5] = [Self::Fire, Self::Frost, Self::Lightning, Self::Poison, Self::Spirit];

    /// Lowercase name used in stat ids.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blunt => "blunt",
            Self::Slash => "slash",
            Self::Pierce => "pierce",
            Self::Chop => "chop",
            Self::Pickaxe => "pickaxe",
            Self::Fire => "fire",
            Self::Frost => "frost",
            Self::Lightning => "lightning",
            Self::Poison => "poison",
            Self::Spirit => "spirit",
            Self::True => "true",
        }
    }

    /// Check if this is a physical sub-type (reduced by armor).
    #[must_use]
    pub fn is_physical(self) -> bool {
        Self::PHYSICAL.contains(&self)
    }

    /// Check if this damage type is elemental.
    #[must_use]
    pub fn is_elemental(self) -> bool {
        Self::ELEMENTAL.contains(&self)
    }

    /// Check if damage ignores all defenses.
    #[must_use]
    pub fn is_true_damage(self) -> bool {
        matches!(self, Self::True)
    }

    /// Attacker stat adding flat damage of this type, e.g. `fire_damage_bonus`.
    ///
    /// All physical sub-types share `physical_damage_bonus`. True damage has none.
    #[must_use]
    pub fn bonus_stat(self) -> Option<StatId> {
        if self.is_physical() {
            Some(StatId::from(stats::PHYSICAL_DAMAGE_BONUS))
        } else if self.is_elemental() {
            Some(StatId::from(format!("{}_damage_bonus", self.name())))
        } else {
            None
        }
    }

    /// Target stat resisting this type in percent, e.g. `frost_resist`.
    ///
    /// All physical sub-types share `physical_resist`. True damage has none.
    #[must_use]
    pub fn resist_stat(self) -> Option<StatId> {
        if self.is_physical() {
            Some(StatId::from(stats::PHYSICAL_RESIST))
        } else if self.is_elemental() {
            Some(StatId::from(format!("{}_resist", self.name())))
        } else {
            None
        }
    }

    /// Caster stat amplifying ability damage of this type, e.g. `slash_amplify`.
    #[must_use]
    pub fn amplify_stat(self) -> StatId {
        StatId::from(format!("{}_amplify", self.name()))
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Extension Data
// ============================================================================

/// Typed key/value store; the value's type is its key.
#[derive(Default)]
pub struct Extensions {
    values: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Get a value by type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable value by type.
    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value by type.
    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Check if a value of type `T` is present.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.values.len())
            .finish()
    }
}

// ============================================================================
// Damage Instance
// ============================================================================

/// A single hit, mutated in place by each pipeline phase.
#[derive(Debug)]
pub struct DamageInstance {
    /// Attacker.
    pub attacker: EntityId,
    /// Target.
    pub target: EntityId,
    amounts: BTreeMap<DamageType, f32>,
    /// Whether the hit is critical.
    pub critical: bool,
    /// Applied crit multiplier (1.0 when not critical).
    pub crit_multiplier: f32,
    /// Whether the target blocked.
    pub blocked: bool,
    /// Damage absorbed by the block, applied after resistances.
    pub block_amount: f32,
    /// Whether a hook cancelled the hit.
    pub cancelled: bool,
    /// Why the hit was cancelled.
    pub cancel_reason: Option<String>,
    /// Whether the hit is a backstab.
    pub backstab: bool,
    /// Backstab multiplier, applied on top of the crit multiplier.
    pub backstab_multiplier: f32,
    /// Knockback force.
    pub knockback: f32,
    /// Stagger amount.
    pub stagger: f32,
    /// Whether procs may trigger from this hit.
    pub may_proc: bool,
    /// Ability or effect that produced the hit.
    pub source: Option<String>,
    /// Result of phase 6, kept for post-damage hooks and procs.
    pub final_damage: f32,
    /// Host data carried alongside the hit.
    pub extensions: Extensions,
}

impl DamageInstance {
    /// Create an empty hit.
    #[must_use]
    pub fn new(attacker: EntityId, target: EntityId) -> Self {
        Self {
            attacker,
            target,
            amounts: BTreeMap::new(),
            critical: false,
            crit_multiplier: 1.0,
            blocked: false,
            block_amount: 0.0,
            cancelled: false,
            cancel_reason: None,
            backstab: false,
            backstab_multiplier: 1.0,
            knockback: 0.0,
            stagger: 0.0,
            may_proc: true,
            source: None,
            final_damage: 0.0,
            extensions: Extensions::new(),
        }
    }

    /// Add damage of a type (builder pattern).
    #[must_use]
    pub fn with_damage(mut self, damage_type: DamageType, amount: f32) -> Self {
        self.add(damage_type, amount);
        self
    }

    /// Mark as backstab.
    #[must_use]
    pub fn with_backstab(mut self, multiplier: f32) -> Self {
        self.backstab = true;
        self.backstab_multiplier = multiplier.max(1.0);
        self
    }

    /// Mark as blocked.
    #[must_use]
    pub fn with_block(mut self, amount: f32) -> Self {
        self.blocked = true;
        self.block_amount = amount.max(0.0);
        self
    }

    /// Set knockback and stagger.
    #[must_use]
    pub fn with_impact(mut self, knockback: f32, stagger: f32) -> Self {
        self.knockback = knockback;
        self.stagger = stagger;
        self
    }

    /// Tag the producing ability or effect.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Suppress procs from this hit.
    #[must_use]
    pub fn without_procs(mut self) -> Self {
        self.may_proc = false;
        self
    }

    /// Add damage of a type. Non-finite or zero totals leave no entry.
    pub fn add(&mut self, damage_type: DamageType, amount: f32) {
        if !amount.is_finite() {
            return;
        }
        let total = self.amount(damage_type) + amount;
        self.set(damage_type, total);
    }

    /// Set damage of a type, removing the entry when not positive.
    pub fn set(&mut self, damage_type: DamageType, amount: f32) {
        if amount > 0.0 && amount.is_finite() {
            self.amounts.insert(damage_type, amount);
        } else {
            self.amounts.remove(&damage_type);
        }
    }

    /// Damage of a type (0 if absent).
    #[must_use]
    pub fn amount(&self, damage_type: DamageType) -> f32 {
        self.amounts.get(&damage_type).copied().unwrap_or(0.0)
    }

    /// Nonzero entries in type order.
    pub fn amounts(&self) -> impl Iterator<Item = (DamageType, f32)> + '_ {
        self.amounts.iter().map(|(t, a)| (*t, *a))
    }

    /// Types with a nonzero entry.
    #[must_use]
    pub fn types(&self) -> Vec<DamageType> {
        self.amounts.keys().copied().collect()
    }

    /// Returns true if the hit carries a true-damage entry.
    #[must_use]
    pub fn has_true_damage(&self) -> bool {
        self.amounts.contains_key(&DamageType::True)
    }

    /// Multiply every entry.
    pub fn scale(&mut self, factor: f32) {
        for amount in self.amounts.values_mut() {
            *amount *= factor;
        }
        self.amounts.retain(|_, amount| *amount > 0.0 && amount.is_finite());
    }

    /// Drop every entry except `keep`.
    pub fn retain_only(&mut self, keep: DamageType) {
        self.amounts.retain(|t, _| *t == keep);
    }

    /// Sum of all entries.
    #[must_use]
    pub fn total(&self) -> f32 {
        self.amounts.values().sum()
    }

    /// Sum of physical entries.
    #[must_use]
    pub fn physical_total(&self) -> f32 {
        self.amounts
            .iter()
            .filter(|(t, _)| t.is_physical())
            .map(|(_, a)| *a)
            .sum()
    }

    /// Cancel the hit.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.cancelled = true;
        self.cancel_reason = Some(reason.into());
    }
}
