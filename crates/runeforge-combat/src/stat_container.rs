//! Per-entity stat storage and resolution.
//!
//! Resolution of one stat:
//!
//! ```text
//! B = override base | explicit base | definition default
//! V = B + Σ flat
//! V = V × (1 + Σ percent / 100)
//! V = V × Π multiply
//! V = override with the highest order, if any
//! V = clamp(V)
//! ```
//!
//! Within a kind, modifiers are visited by `(order, id)`; insertion order
//! never matters.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::trace;

use runeforge_common::{EntityId, ModifierId, StatId, Timestamp};

use crate::definitions::StatRegistry;
use crate::modifier::{Collision, Modifier, ModifierKind};

/// Where the base of a stat came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseSource {
    /// Host-pushed authoritative override.
    Override,
    /// Explicitly set base.
    Explicit,
    /// Definition default (0 for unknown stats).
    Default,
}

/// Outcome of [`StatContainer::add_modifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Inserted into an empty slot.
    Added(ModifierId),
    /// Replaced an existing entry.
    Replaced(ModifierId),
    /// Existing entry's timestamp reset.
    Refreshed(ModifierId),
    /// Existing entry gained a stack.
    Stacked {
        /// Modifier id
        id: ModifierId,
        /// Stacks after the application
        stacks: u32,
    },
    /// Existing entry was at its cap; only the timestamp was reset.
    StackCapped(ModifierId),
    /// Rejected under the `Ignore` policy.
    Rejected,
}

impl AddOutcome {
    /// Whether the application changed anything.
    #[must_use]
    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }

    /// Id of the affected entry.
    #[must_use]
    pub fn id(&self) -> Option<&ModifierId> {
        match self {
            Self::Added(id)
            | Self::Replaced(id)
            | Self::Refreshed(id)
            | Self::Stacked { id, .. }
            | Self::StackCapped(id) => Some(id),
            Self::Rejected => None,
        }
    }
}

/// One modifier's contribution in a [`StatBreakdown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Resolution phase.
    pub kind: ModifierKind,
    /// Modifier id.
    pub id: ModifierId,
    /// Source label.
    pub source: Option<String>,
    /// Value after stacking.
    pub value: f32,
    /// Ordering key.
    pub order: i32,
    /// Current stacks.
    pub stacks: u32,
    /// Seconds left (None = permanent).
    pub remaining: Option<f64>,
}

/// Phase-ordered explanation of a stat value, for tooltips and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatBreakdown {
    /// Entity ID.
    pub entity: EntityId,
    /// Stat.
    pub stat: StatId,
    /// Base value.
    pub base: f32,
    /// Where the base came from.
    pub base_source: BaseSource,
    /// Contributing modifiers in resolution order.
    pub contributions: Vec<Contribution>,
    /// Value after the flat phase.
    pub after_flat: f32,
    /// Value after the percent phase.
    pub after_percent: f32,
    /// Value after the multiply phase.
    pub after_multiply: f32,
    /// Value before clamping (overrides applied).
    pub unclamped: f32,
    /// Final value.
    pub value: f32,
}

impl StatBreakdown {
    /// Serialize for host diagnostics.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Contributions of one phase.
    pub fn phase(&self, kind: ModifierKind) -> impl Iterator<Item = &Contribution> {
        self.contributions.iter().filter(move |c| c.kind == kind)
    }
}

/// Stats, modifiers and cache of one entity.
#[derive(Debug, Clone)]
pub struct StatContainer {
    entity: EntityId,
    base: AHashMap<StatId, f32>,
    overrides: AHashMap<StatId, f32>,
    modifiers: AHashMap<StatId, Vec<Modifier>>,
    cache: AHashMap<StatId, f32>,
    dirty: AHashSet<StatId>,
    next_derived: u64,
}

impl StatContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            base: AHashMap::new(),
            overrides: AHashMap::new(),
            modifiers: AHashMap::new(),
            cache: AHashMap::new(),
            dirty: AHashSet::new(),
            next_derived: 1,
        }
    }

    /// Owning entity.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    // ------------------------------------------------------------------------
    // Base values
    // ------------------------------------------------------------------------

    /// Base value and where it came from.
    #[must_use]
    pub fn base_with_source(&self, stat: &StatId, defs: &StatRegistry) -> (f32, BaseSource) {
        if let Some(&value) = self.overrides.get(stat) {
            (value, BaseSource::Override)
        } else if let Some(&value) = self.base.get(stat) {
            (value, BaseSource::Explicit)
        } else {
            (defs.default_of(stat), BaseSource::Default)
        }
    }

    /// Base value (override, else explicit, else default).
    #[must_use]
    pub fn base(&self, stat: &StatId, defs: &StatRegistry) -> f32 {
        self.base_with_source(stat, defs).0
    }

    /// Set the explicit base. Returns the effective base before the change.
    pub fn set_base(&mut self, stat: &StatId, value: f32, defs: &StatRegistry) -> f32 {
        let old = self.base(stat, defs);
        self.base.insert(stat.clone(), value);
        self.invalidate(stat);
        old
    }

    /// Push an authoritative override base.
    pub fn set_override(&mut self, stat: &StatId, value: f32) {
        let changed = self
            .overrides
            .insert(stat.clone(), value)
            .map_or(true, |old| old != value);
        if changed {
            self.invalidate(stat);
        }
    }

    /// Drop an override base. Returns true if one existed.
    pub fn clear_override(&mut self, stat: &StatId) -> bool {
        let existed = self.overrides.remove(stat).is_some();
        if existed {
            self.invalidate(stat);
        }
        existed
    }

    // ------------------------------------------------------------------------
    // Modifiers
    // ------------------------------------------------------------------------

    /// Apply a modifier, resolving id collisions by its stack policy.
    ///
    /// The modifier must already be validated.
    pub fn add_modifier(&mut self, mut modifier: Modifier, now: Timestamp) -> AddOutcome {
        let stat = modifier.stat.clone();
        modifier.applied_at = now;
        modifier.stacks = 1;

        let slot = self.modifiers.entry(stat.clone()).or_default();
        let Some(index) = slot.iter().position(|m| m.id == modifier.id) else {
            let id = modifier.id.clone();
            slot.push(modifier);
            self.invalidate(&stat);
            return AddOutcome::Added(id);
        };

        let existing = &mut slot[index];
        let outcome = match modifier
            .stack_policy
            .on_collision(existing.stacks, existing.max_stacks)
        {
            Collision::Reject => return AddOutcome::Rejected,
            Collision::Replace => {
                let id = modifier.id.clone();
                *existing = modifier;
                AddOutcome::Replaced(id)
            },
            Collision::Refresh => {
                existing.applied_at = now;
                AddOutcome::Refreshed(existing.id.clone())
            },
            Collision::AddStack => {
                existing.stacks += 1;
                existing.applied_at = now;
                AddOutcome::Stacked {
                    id: existing.id.clone(),
                    stacks: existing.stacks,
                }
            },
            Collision::StackCapped => {
                existing.applied_at = now;
                AddOutcome::StackCapped(existing.id.clone())
            },
            Collision::Coexist => {
                let derived = loop {
                    let candidate =
                        ModifierId::new(&format!("{}#{}", modifier.id, self.next_derived));
                    self.next_derived += 1;
                    if !slot.iter().any(|m| m.id == candidate) {
                        break candidate;
                    }
                };
                modifier.id = derived.clone();
                slot.push(modifier);
                AddOutcome::Added(derived)
            },
        };
        self.invalidate(&stat);
        outcome
    }

    /// Remove a modifier by id. A miss leaves the cache untouched.
    pub fn remove_modifier(&mut self, stat: &StatId, id: &ModifierId) -> Option<Modifier> {
        let slot = self.modifiers.get_mut(stat)?;
        let index = slot.iter().position(|m| &m.id == id)?;
        let removed = slot.remove(index);
        if slot.is_empty() {
            self.modifiers.remove(stat);
        }
        self.invalidate(stat);
        Some(removed)
    }

    /// Remove every modifier carrying `source`.
    pub fn remove_from_source(&mut self, source: &str) -> Vec<Modifier> {
        self.drain_where(|m| m.source.as_deref() == Some(source))
    }

    /// Remove every modifier expired at `now`.
    pub fn sweep_expired(&mut self, now: Timestamp) -> Vec<Modifier> {
        self.drain_where(|m| m.is_expired(now))
    }

    /// Remove every modifier and base value.
    pub fn clear(&mut self) -> Vec<Modifier> {
        let removed = self.drain_where(|_| true);
        self.base.clear();
        self.overrides.clear();
        self.cache.clear();
        self.dirty.clear();
        removed
    }

    fn drain_where(&mut self, mut predicate: impl FnMut(&Modifier) -> bool) -> Vec<Modifier> {
        let mut removed = Vec::new();
        let mut touched = Vec::new();
        for (stat, slot) in &mut self.modifiers {
            let before = removed.len();
            let mut index = 0;
            while index < slot.len() {
                if predicate(&slot[index]) {
                    removed.push(slot.remove(index));
                } else {
                    index += 1;
                }
            }
            if removed.len() != before {
                touched.push(stat.clone());
            }
        }
        for stat in touched {
            if self.modifiers.get(&stat).is_some_and(Vec::is_empty) {
                self.modifiers.remove(&stat);
            }
            self.invalidate(&stat);
        }
        removed
    }

    /// Modifiers on one stat.
    #[must_use]
    pub fn modifiers(&self, stat: &StatId) -> &[Modifier] {
        self.modifiers.get(stat).map_or(&[], Vec::as_slice)
    }

    /// Look up one modifier.
    #[must_use]
    pub fn modifier(&self, stat: &StatId, id: &ModifierId) -> Option<&Modifier> {
        self.modifiers(stat).iter().find(|m| &m.id == id)
    }

    /// Total number of modifiers held.
    #[must_use]
    pub fn modifier_count(&self) -> usize {
        self.modifiers.values().map(Vec::len).sum()
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    /// Mark a stat for recalculation.
    pub fn invalidate(&mut self, stat: &StatId) {
        self.dirty.insert(stat.clone());
    }

    /// Mark every cached stat for recalculation.
    pub fn invalidate_all(&mut self) {
        let cached: Vec<StatId> = self.cache.keys().cloned().collect();
        self.dirty.extend(cached);
    }

    /// Whether `stat` has a valid cached value.
    #[must_use]
    pub fn is_cached(&self, stat: &StatId) -> bool {
        self.cache.contains_key(stat) && !self.dirty.contains(stat)
    }

    fn has_conditions(&self, stat: &StatId) -> bool {
        self.modifiers(stat).iter().any(|m| m.condition.is_some())
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolved value, served from the cache when valid.
    ///
    /// Stats carrying conditional modifiers are never cached, since their
    /// conditions can flip without any mutation.
    pub fn value(&mut self, stat: &StatId, defs: &StatRegistry, now: Timestamp) -> f32 {
        if self.is_cached(stat) {
            if let Some(&value) = self.cache.get(stat) {
                return value;
            }
        }
        let value = self.compute(stat, defs, now);
        if !self.has_conditions(stat) {
            self.cache.insert(stat.clone(), value);
            self.dirty.remove(stat);
        }
        trace!(entity = %self.entity, %stat, value, "stat recalculated");
        value
    }

    /// Resolved value without touching the cache.
    #[must_use]
    pub fn peek(&self, stat: &StatId, defs: &StatRegistry, now: Timestamp) -> f32 {
        if self.is_cached(stat) {
            if let Some(&value) = self.cache.get(stat) {
                return value;
            }
        }
        self.compute(stat, defs, now)
    }

    /// Resolve a stat from scratch.
    #[must_use]
    pub fn compute(&self, stat: &StatId, defs: &StatRegistry, now: Timestamp) -> f32 {
        self.breakdown(stat, defs, now).value
    }

    /// Full phase-ordered resolution of a stat.
    #[must_use]
    pub fn breakdown(&self, stat: &StatId, defs: &StatRegistry, now: Timestamp) -> StatBreakdown {
        let (base, base_source) = self.base_with_source(stat, defs);

        let mut active: Vec<&Modifier> = self
            .modifiers(stat)
            .iter()
            .filter(|m| m.is_active(self.entity, now))
            .collect();
        active.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(a.order.cmp(&b.order))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut flat = 0.0_f32;
        let mut percent = 0.0_f32;
        let mut multiply = 1.0_f32;
        let mut overridden = None;
        for modifier in &active {
            let value = modifier.effective_value();
            match modifier.kind {
                ModifierKind::Flat => flat += value,
                ModifierKind::Percent => percent += value,
                ModifierKind::Multiply => multiply *= value,
                // Sorted ascending by order, so the last one seen wins.
                ModifierKind::Override => overridden = Some(value),
            }
        }

        let after_flat = base + flat;
        let after_percent = after_flat * (1.0 + percent / 100.0);
        let after_multiply = after_percent * multiply;
        let unclamped = overridden.unwrap_or(after_multiply);
        let value = defs.clamp(stat, unclamped);

        StatBreakdown {
            entity: self.entity,
            stat: stat.clone(),
            base,
            base_source,
            contributions: active
                .into_iter()
                .map(|m| Contribution {
                    kind: m.kind,
                    id: m.id.clone(),
                    source: m.source.clone(),
                    value: m.effective_value(),
                    order: m.order,
                    stacks: m.stacks,
                    remaining: m.remaining(now),
                })
                .collect(),
            after_flat,
            after_percent,
            after_multiply,
            unclamped,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::StatDefinition;
    use crate::modifier::StackPolicy;
    use proptest::prelude::*;

    fn strength() -> StatId {
        StatId::from("strength")
    }

    fn defs() -> StatRegistry {
        let mut defs = StatRegistry::new();
        defs.register(StatDefinition::new("strength", 0.0));
        defs.register(StatDefinition::new("block", 0.0).with_bounds(0.0, 50.0));
        defs
    }

    #[test]
    fn test_four_phase_scenario() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.set_base(&strength(), 10.0, &defs);

        c.add_modifier(Modifier::flat("ring", "strength", 5.0), 0.0);
        assert_eq!(c.value(&strength(), &defs, 0.0), 15.0);

        c.add_modifier(Modifier::percent("mead", "strength", 50.0), 0.0);
        assert_eq!(c.value(&strength(), &defs, 0.0), 22.5);

        c.add_modifier(Modifier::multiply("berserk", "strength", 2.0), 0.0);
        assert_eq!(c.value(&strength(), &defs, 0.0), 45.0);

        c.add_modifier(Modifier::override_with("curse", "strength", 100.0), 0.0);
        assert_eq!(c.value(&strength(), &defs, 0.0), 100.0);
    }

    #[test]
    fn test_override_highest_order_wins() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(
            Modifier::override_with("late", "strength", 7.0).with_order(10),
            0.0,
        );
        c.add_modifier(
            Modifier::override_with("early", "strength", 3.0).with_order(1),
            0.0,
        );
        assert_eq!(c.value(&strength(), &defs, 0.0), 7.0);
    }

    #[test]
    fn test_base_precedence() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        assert_eq!(c.base_with_source(&strength(), &defs), (0.0, BaseSource::Default));

        c.set_base(&strength(), 12.0, &defs);
        assert_eq!(c.base_with_source(&strength(), &defs), (12.0, BaseSource::Explicit));

        c.set_override(&strength(), 30.0);
        assert_eq!(c.base_with_source(&strength(), &defs), (30.0, BaseSource::Override));
        assert_eq!(c.value(&strength(), &defs, 0.0), 30.0);

        assert!(c.clear_override(&strength()));
        assert_eq!(c.value(&strength(), &defs, 0.0), 12.0);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let defs = defs();
        let block = StatId::from("block");
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(Modifier::flat("shield", "block", 80.0), 0.0);
        assert_eq!(c.value(&block, &defs, 0.0), 50.0);

        let breakdown = c.breakdown(&block, &defs, 0.0);
        assert_eq!(breakdown.unclamped, 80.0);
        assert_eq!(breakdown.value, 50.0);
    }

    #[test]
    fn test_remove_missing_keeps_cache() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(Modifier::flat("ring", "strength", 5.0), 0.0);
        c.value(&strength(), &defs, 0.0);
        assert!(c.is_cached(&strength()));

        assert!(c
            .remove_modifier(&strength(), &ModifierId::from("nope"))
            .is_none());
        assert!(c.is_cached(&strength()));

        assert!(c
            .remove_modifier(&strength(), &ModifierId::from("RING"))
            .is_some());
        assert!(!c.is_cached(&strength()));
        assert_eq!(c.value(&strength(), &defs, 0.0), 0.0);
    }

    #[test]
    fn test_stack_cap_refreshes_duration() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        let rage = || {
            Modifier::flat("rage", "strength", 2.0)
                .with_duration(5.0)
                .with_stacking(StackPolicy::Stack, 3)
        };

        for t in 0..3 {
            c.add_modifier(rage(), f64::from(t));
        }
        let outcome = c.add_modifier(rage(), 10.0);
        assert_eq!(outcome, AddOutcome::StackCapped(ModifierId::from("rage")));

        let m = c
            .modifier(&strength(), &ModifierId::from("rage"))
            .cloned()
            .unwrap_or_else(|| Modifier::flat("missing", "strength", 0.0));
        assert_eq!(m.stacks, 3);
        assert_eq!(m.applied_at, 10.0);
        assert_eq!(c.value(&strength(), &defs, 10.0), 6.0);
    }

    #[test]
    fn test_ignore_rejects_without_mutation() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(Modifier::flat("aura", "strength", 4.0), 0.0);
        c.value(&strength(), &defs, 0.0);

        let outcome = c.add_modifier(
            Modifier::flat("aura", "strength", 9.0).with_stacking(StackPolicy::Ignore, 1),
            1.0,
        );
        assert_eq!(outcome, AddOutcome::Rejected);
        assert!(c.is_cached(&strength()));
        assert_eq!(c.value(&strength(), &defs, 1.0), 4.0);
    }

    #[test]
    fn test_refresh_keeps_value() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(Modifier::flat("aura", "strength", 4.0).with_duration(5.0), 0.0);
        c.add_modifier(
            Modifier::flat("aura", "strength", 9.0)
                .with_duration(5.0)
                .with_stacking(StackPolicy::Refresh, 1),
            3.0,
        );
        assert_eq!(c.value(&strength(), &defs, 7.0), 4.0);
        assert!(!c
            .modifier(&strength(), &ModifierId::from("aura"))
            .is_some_and(|m| m.is_expired(7.0)));
    }

    #[test]
    fn test_independent_entries_coexist() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        let hit = || Modifier::flat("bleed", "strength", -1.0).with_stacking(StackPolicy::Independent, 1);
        let first = c.add_modifier(hit(), 0.0);
        let second = c.add_modifier(hit(), 0.0);

        assert_eq!(first, AddOutcome::Added(ModifierId::from("bleed")));
        assert!(matches!(second, AddOutcome::Added(ref id) if id.as_str() == "bleed#1"));
        assert_eq!(c.modifiers(&strength()).len(), 2);
        assert_eq!(c.value(&strength(), &defs, 0.0), -2.0);
    }

    #[test]
    fn test_sweep_expired_and_source_removal() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(Modifier::flat("short", "strength", 1.0).with_duration(2.0), 0.0);
        c.add_modifier(Modifier::flat("sword", "strength", 3.0).with_source("item:sword"), 0.0);
        c.add_modifier(Modifier::flat("hilt", "block", 3.0).with_source("item:sword"), 0.0);

        assert_eq!(c.sweep_expired(1.0).len(), 0);
        assert_eq!(c.sweep_expired(2.5).len(), 1);
        assert_eq!(c.value(&strength(), &defs, 2.5), 3.0);

        assert_eq!(c.remove_from_source("item:sword").len(), 2);
        assert_eq!(c.modifier_count(), 0);
    }

    #[test]
    fn test_conditional_stats_are_not_cached() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let defs = defs();
        let flag = Arc::new(AtomicBool::new(true));
        let gate = Arc::clone(&flag);
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.add_modifier(
            Modifier::flat("wet", "strength", -2.0)
                .with_condition(move |_e: EntityId| gate.load(Ordering::Relaxed)),
            0.0,
        );

        assert_eq!(c.value(&strength(), &defs, 0.0), -2.0);
        flag.store(false, Ordering::Relaxed);
        assert_eq!(c.value(&strength(), &defs, 0.0), 0.0);
        assert!(!c.is_cached(&strength()));
    }

    #[test]
    fn test_breakdown_is_phase_ordered() {
        let defs = defs();
        let mut c = StatContainer::new(EntityId::from_raw(1));
        c.set_base(&strength(), 10.0, &defs);
        c.add_modifier(Modifier::multiply("m", "strength", 2.0), 0.0);
        c.add_modifier(Modifier::percent("p", "strength", 50.0), 0.0);
        c.add_modifier(Modifier::flat("f2", "strength", 1.0).with_order(5), 0.0);
        c.add_modifier(Modifier::flat("f1", "strength", 4.0).with_order(-5), 0.0);

        let b = c.breakdown(&strength(), &defs, 0.0);
        let ids: Vec<&str> = b.contributions.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "p", "m"]);
        assert_eq!(b.after_flat, 15.0);
        assert_eq!(b.after_percent, 22.5);
        assert_eq!(b.value, 45.0);
        assert_eq!(b.phase(ModifierKind::Flat).count(), 2);
        assert!(b.to_json().is_ok_and(|json| json.contains("\"after_flat\"")));
    }

    proptest! {
        #[test]
        fn prop_resolution_ignores_insertion_order(
            base in -100.0f32..100.0,
            flats in prop::collection::vec(-20.0f32..20.0, 0..5),
            percents in prop::collection::vec(-50.0f32..50.0, 0..5),
            mults in prop::collection::vec(0.5f32..2.0, 0..4),
            seed in any::<u64>(),
        ) {
            let defs = defs();
            let mut mods = Vec::new();
            for (i, v) in flats.iter().enumerate() {
                mods.push(Modifier::flat(format!("f{i}").as_str(), "strength", *v));
            }
            for (i, v) in percents.iter().enumerate() {
                mods.push(Modifier::percent(format!("p{i}").as_str(), "strength", *v));
            }
            for (i, v) in mults.iter().enumerate() {
                mods.push(Modifier::multiply(format!("m{i}").as_str(), "strength", *v));
            }

            let mut forward = StatContainer::new(EntityId::from_raw(1));
            forward.set_base(&strength(), base, &defs);
            for m in mods.iter().cloned() {
                forward.add_modifier(m, 0.0);
            }

            let mut shuffled = mods.clone();
            fastrand::Rng::with_seed(seed).shuffle(&mut shuffled);
            let mut backward = StatContainer::new(EntityId::from_raw(2));
            backward.set_base(&strength(), base, &defs);
            for m in shuffled {
                backward.add_modifier(m, 0.0);
            }

            let expected = (base + flats.iter().sum::<f32>())
                * (1.0 + percents.iter().sum::<f32>() / 100.0)
                * mults.iter().product::<f32>();
            let a = forward.value(&strength(), &defs, 0.0);
            let b = backward.value(&strength(), &defs, 0.0);
            prop_assert_eq!(a, b);
            prop_assert!((a - expected).abs() <= 1e-3 * expected.abs().max(1.0));
        }
    }
}
