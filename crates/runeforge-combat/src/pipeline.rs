//! Ten-phase damage pipeline.
//!
//! Phases:
//! 1. Pre-damage hooks (may cancel)
//! 2. Attacker bonuses (physical spread, elemental, strength scaling)
//! 3. Crit roll
//! 4. Crit multiplier
//! 5. Mitigation (true damage, armor, resistances, block)
//! 6. Final damage
//! 7. Post-damage hooks
//! 8. Attacker on-hit / on-crit procs
//! 9. Target on-damage-taken procs
//! 10. Kill check

use std::sync::Arc;

use fastrand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use runeforge_common::{EntityId, HandlerResult, StatId};

use crate::config::CombatConfig;
use crate::damage::{DamageInstance, DamageType};
use crate::definitions::stats;
use crate::events::{CombatEvent, EventBus};
use crate::formulas::Formulas;
use crate::guard::isolate;
use crate::stat_engine::StatEngine;

/// Which phases a hit runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageMode {
    /// All ten phases.
    Full,
    /// No attacker bonuses or crit roll (phases 1, 5-10).
    Direct,
    /// Only the true-damage entry counts, unmitigated (phases 1, 7-10).
    True,
}

/// Proc dispatch points reached by a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcEvent {
    /// Attacker landed a hit.
    Hit,
    /// Attacker landed a critical hit.
    Crit,
    /// Target took damage.
    DamageTaken,
    /// Attacker killed the target.
    Kill,
}

impl ProcEvent {
    /// Entity whose procs this event triggers.
    #[must_use]
    pub fn owner(self, hit: &DamageInstance) -> EntityId {
        match self {
            Self::Hit | Self::Crit | Self::Kill => hit.attacker,
            Self::DamageTaken => hit.target,
        }
    }

    /// The other party of the hit.
    #[must_use]
    pub fn counterpart(self, hit: &DamageInstance) -> EntityId {
        match self {
            Self::Hit | Self::Crit | Self::Kill => hit.target,
            Self::DamageTaken => hit.attacker,
        }
    }
}

/// Receiver of proc dispatches (phases 8-10).
pub trait ProcSink {
    /// Dispatch one event for one hit.
    fn dispatch(&mut self, event: ProcEvent, stats: &StatEngine, rng: &mut Rng, hit: &DamageInstance);
}

/// A sink that drops every dispatch.
#[derive(Debug, Default)]
pub struct NoProcs;

impl ProcSink for NoProcs {
    fn dispatch(&mut self, _event: ProcEvent, _stats: &StatEngine, _rng: &mut Rng, _hit: &DamageInstance) {}
}

/// Externally supplied logic run before and after mitigation.
pub trait DamageHook: Send + Sync {
    /// Phase 1. May mutate or cancel the hit.
    fn pre_damage(&self, _stats: &StatEngine, _hit: &mut DamageInstance) -> HandlerResult {
        Ok(())
    }

    /// Phase 7. `hit.final_damage` is set.
    fn post_damage(&self, _stats: &StatEngine, _hit: &DamageInstance) -> HandlerResult {
        Ok(())
    }
}

/// Parameters the pipeline reads from [`CombatConfig`].
#[derive(Debug, Clone, PartialEq)]
struct Tuning {
    armor_scaling: f32,
    resist_min: f32,
    resist_max: f32,
    strength_scaling: f32,
    crit_secondary: Option<StatId>,
    crit_per_point: f32,
}

impl From<&CombatConfig> for Tuning {
    fn from(config: &CombatConfig) -> Self {
        Self {
            armor_scaling: config.armor_scaling,
            resist_min: config.resist_min,
            resist_max: config.resist_max,
            strength_scaling: config.strength_scaling,
            crit_secondary: config.crit_secondary_stat.as_deref().map(StatId::from),
            crit_per_point: config.crit_chance_per_point,
        }
    }
}

/// The damage pipeline.
pub struct DamagePipeline {
    tuning: Tuning,
    formulas: Formulas,
    hooks: Vec<(String, Arc<dyn DamageHook>)>,
    events: EventBus,
}

impl std::fmt::Debug for DamagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DamagePipeline")
            .field("tuning", &self.tuning)
            .field("hooks", &self.hooks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DamagePipeline {
    /// Create a pipeline with built-in formulas and no hooks.
    #[must_use]
    pub fn new(config: &CombatConfig, events: EventBus) -> Self {
        Self {
            tuning: Tuning::from(config),
            formulas: Formulas::new(),
            hooks: Vec::new(),
            events,
        }
    }

    /// Formula registry.
    #[must_use]
    pub fn formulas(&self) -> &Formulas {
        &self.formulas
    }

    /// Mutable formula registry.
    pub fn formulas_mut(&mut self) -> &mut Formulas {
        &mut self.formulas
    }

    /// Register a hook. Hooks run in registration order.
    pub fn add_hook(&mut self, name: impl Into<String>, hook: impl DamageHook + 'static) {
        self.hooks.push((name.into(), Arc::new(hook)));
    }

    /// Remove hooks by name. Returns how many were removed.
    pub fn remove_hook(&mut self, name: &str) -> usize {
        let before = self.hooks.len();
        self.hooks.retain(|(n, _)| n != name);
        before - self.hooks.len()
    }

    /// Run a hit through the phases selected by `mode`. Returns final damage.
    pub fn process(
        &self,
        stats: &mut StatEngine,
        rng: &mut Rng,
        procs: &mut dyn ProcSink,
        hit: &mut DamageInstance,
        mode: DamageMode,
    ) -> f32 {
        // Phase 1
        self.run_pre_hooks(stats, hit);
        if hit.cancelled {
            hit.final_damage = 0.0;
            let reason = hit.cancel_reason.clone().unwrap_or_default();
            debug!(attacker = %hit.attacker, target = %hit.target, %reason, "damage cancelled");
            self.events.publish(CombatEvent::DamageCancelled {
                attacker: hit.attacker,
                target: hit.target,
                reason,
            });
            return 0.0;
        }

        match mode {
            DamageMode::Full => {
                self.apply_attacker_bonuses(stats, hit); // Phase 2
                self.resolve_crit(stats, rng, hit); // Phases 3-4
                self.mitigate(stats, hit); // Phase 5
            },
            DamageMode::Direct => self.mitigate(stats, hit),
            DamageMode::True => hit.retain_only(DamageType::True),
        }

        // Phase 6
        hit.final_damage = hit.total().max(0.0);
        trace!(attacker = %hit.attacker, target = %hit.target, damage = hit.final_damage, "damage resolved");

        // Phase 7
        self.run_post_hooks(stats, hit);
        self.events.publish(CombatEvent::DamageResolved {
            attacker: hit.attacker,
            target: hit.target,
            amount: hit.final_damage,
            critical: hit.critical,
        });

        // Phases 8-9
        if hit.may_proc {
            procs.dispatch(ProcEvent::Hit, stats, rng, hit);
            if hit.critical {
                procs.dispatch(ProcEvent::Crit, stats, rng, hit);
            }
            procs.dispatch(ProcEvent::DamageTaken, stats, rng, hit);
        }

        // Phase 10
        if hit.final_damage > 0.0 {
            let health = stats.get(hit.target, &StatId::from(stats::HEALTH));
            if health <= hit.final_damage {
                debug!(attacker = %hit.attacker, target = %hit.target, "lethal hit");
                self.events.publish(CombatEvent::Killed {
                    attacker: hit.attacker,
                    target: hit.target,
                    amount: hit.final_damage,
                });
                if hit.may_proc {
                    procs.dispatch(ProcEvent::Kill, stats, rng, hit);
                }
            }
        }

        hit.final_damage
    }

    /// Roll a crit for `attacker`. Returns the multiplier on success.
    pub fn roll_crit(
        &self,
        stats: &mut StatEngine,
        rng: &mut Rng,
        attacker: EntityId,
        backstab: Option<f32>,
    ) -> Option<f32> {
        let base_chance = stats.get(attacker, &StatId::from(stats::CRIT_CHANCE));
        let points = self
            .tuning
            .crit_secondary
            .as_ref()
            .map_or(0.0, |stat| stats.get(attacker, stat));
        let chance = self
            .formulas
            .crit_chance(base_chance, points, self.tuning.crit_per_point);
        if chance <= 0.0 || rng.f32() >= chance {
            return None;
        }
        Some(self.crit_multiplier(stats, attacker, backstab))
    }

    fn crit_multiplier(&self, stats: &mut StatEngine, attacker: EntityId, backstab: Option<f32>) -> f32 {
        let crit_damage = stats.get(attacker, &StatId::from(stats::CRIT_DAMAGE));
        self.formulas.crit_multiplier(crit_damage, backstab)
    }

    fn run_pre_hooks(&self, stats: &StatEngine, hit: &mut DamageInstance) {
        for (name, hook) in &self.hooks {
            let _ = isolate(name, || hook.pre_damage(stats, hit));
            if hit.cancelled {
                break;
            }
        }
    }

    fn run_post_hooks(&self, stats: &StatEngine, hit: &DamageInstance) {
        for (name, hook) in &self.hooks {
            let _ = isolate(name, || hook.post_damage(stats, hit));
        }
    }

    fn apply_attacker_bonuses(&self, stats: &mut StatEngine, hit: &mut DamageInstance) {
        let attacker = hit.attacker;

        // Physical bonus is spread over existing physical entries only.
        let physical: Vec<DamageType> = hit.types().into_iter().filter(|t| t.is_physical()).collect();
        if !physical.is_empty() {
            let bonus = stats.get(attacker, &StatId::from(stats::PHYSICAL_DAMAGE_BONUS));
            if bonus != 0.0 {
                #[allow(clippy::cast_precision_loss)]
                let share = bonus / physical.len() as f32;
                for damage_type in physical {
                    hit.add(damage_type, share);
                }
            }
        }

        // Elemental bonuses create entries.
        for element in DamageType::ELEMENTAL {
            if let Some(stat) = element.bonus_stat() {
                let bonus = stats.get(attacker, &stat);
                if bonus > 0.0 {
                    hit.add(element, bonus);
                }
            }
        }

        if self.tuning.strength_scaling != 0.0 {
            let strength = stats.get(attacker, &StatId::from(stats::STRENGTH));
            hit.scale((1.0 + strength * self.tuning.strength_scaling).max(0.0));
        }
    }

    fn resolve_crit(&self, stats: &mut StatEngine, rng: &mut Rng, hit: &mut DamageInstance) {
        let backstab = hit.backstab.then_some(hit.backstab_multiplier);
        if hit.critical {
            // Pre-set by a hook; keep its multiplier if it chose one.
            if hit.crit_multiplier <= 1.0 {
                hit.crit_multiplier = self.crit_multiplier(stats, hit.attacker, backstab);
            }
        } else if let Some(multiplier) = self.roll_crit(stats, rng, hit.attacker, backstab) {
            hit.critical = true;
            hit.crit_multiplier = multiplier;
        }

        if hit.critical {
            hit.scale(hit.crit_multiplier);
            self.events.publish(CombatEvent::CriticalHit {
                attacker: hit.attacker,
                target: hit.target,
                multiplier: hit.crit_multiplier,
            });
        }
    }

    fn mitigate(&self, stats: &mut StatEngine, hit: &mut DamageInstance) {
        if hit.has_true_damage() {
            hit.retain_only(DamageType::True);
            return;
        }

        let target = hit.target;
        let armor = stats.get(target, &StatId::from(stats::ARMOR));
        let armor_factor = 1.0 - self.formulas.armor_reduction(armor, self.tuning.armor_scaling);

        for (damage_type, amount) in hit.amounts().collect::<Vec<_>>() {
            let resist = damage_type
                .resist_stat()
                .map_or(0.0, |stat| stats.get(target, &stat));
            let resist_factor =
                self.formulas
                    .resist_multiplier(resist, self.tuning.resist_min, self.tuning.resist_max);
            let factor = if damage_type.is_physical() {
                armor_factor * resist_factor
            } else {
                resist_factor
            };
            hit.set(damage_type, amount * factor);
        }

        if hit.blocked && hit.block_amount > 0.0 {
            let total = hit.total();
            if total > 0.0 {
                let absorbed = hit.block_amount.min(total);
                hit.scale((total - absorbed) / total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::StatRegistry;
    use crate::modifier::Modifier;
    use proptest::prelude::*;
    use runeforge_common::HandlerError;

    const EPS: f32 = 1e-3;

    fn setup() -> (StatEngine, DamagePipeline, Rng) {
        let bus = EventBus::new(256);
        let stats = StatEngine::new(StatRegistry::with_core_stats(), bus.clone());
        let pipeline = DamagePipeline::new(&CombatConfig::default(), bus);
        (stats, pipeline, Rng::with_seed(7))
    }

    fn ids() -> (EntityId, EntityId) {
        (EntityId::from_raw(1), EntityId::from_raw(2))
    }

    fn set(stats: &mut StatEngine, entity: EntityId, stat: &str, value: f32) {
        stats.set_base(entity, &StatId::from(stat), value).expect("valid base");
    }

    #[derive(Default)]
    struct Recorder(Vec<ProcEvent>);

    impl ProcSink for Recorder {
        fn dispatch(&mut self, event: ProcEvent, _: &StatEngine, _: &mut Rng, _: &DamageInstance) {
            self.0.push(event);
        }
    }

    #[test]
    fn test_armor_halves_and_quarters() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, t, stats::ARMOR, 100.0);

        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Slash, 100.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Full);
        assert!((dealt - 50.0).abs() < EPS);

        set(&mut stats, t, stats::ARMOR, 300.0);
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Pierce, 100.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct);
        assert!((dealt - 25.0).abs() < EPS);
    }

    #[test]
    fn test_resistance_bounds() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();

        set(&mut stats, t, "fire_resist", -100.0);
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Fire, 10.0);
        assert!((pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct) - 20.0).abs() < EPS);

        set(&mut stats, t, "fire_resist", 95.0);
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Fire, 10.0);
        assert!((pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_true_damage_ignores_mitigation() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, t, stats::ARMOR, 500.0);
        set(&mut stats, t, stats::PHYSICAL_RESIST, 90.0);

        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::True, 50.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::True);
        assert!((dealt - 50.0).abs() < EPS);

        // True strips other entries in the full path too.
        let mut hit = DamageInstance::new(a, t)
            .with_damage(DamageType::True, 50.0)
            .with_damage(DamageType::Blunt, 40.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Full);
        assert!((dealt - 50.0).abs() < EPS);
    }

    #[test]
    fn test_physical_bonus_spreads_without_creating() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, a, stats::PHYSICAL_DAMAGE_BONUS, 10.0);
        set(&mut stats, a, "frost_damage_bonus", 4.0);

        let mut hit = DamageInstance::new(a, t)
            .with_damage(DamageType::Slash, 20.0)
            .with_damage(DamageType::Pierce, 20.0);
        pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Full);
        assert!((hit.amount(DamageType::Slash) - 25.0).abs() < EPS);
        assert!((hit.amount(DamageType::Pierce) - 25.0).abs() < EPS);
        assert_eq!(hit.amount(DamageType::Blunt), 0.0);
        assert!((hit.amount(DamageType::Frost) - 4.0).abs() < EPS);

        // A pure elemental hit gains no physical entry.
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Fire, 5.0);
        pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Full);
        assert!(hit.physical_total() == 0.0);
    }

    #[test]
    fn test_strength_scaling() {
        let config = CombatConfig {
            strength_scaling: 0.01,
            ..CombatConfig::default()
        };
        let bus = EventBus::new(64);
        let mut stats = StatEngine::new(StatRegistry::with_core_stats(), bus.clone());
        let pipeline = DamagePipeline::new(&config, bus);
        let (a, t) = ids();
        set(&mut stats, a, stats::STRENGTH, 50.0);

        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Blunt, 10.0);
        let dealt = pipeline.process(&mut stats, &mut Rng::with_seed(1), &mut NoProcs, &mut hit, DamageMode::Full);
        assert!((dealt - 15.0).abs() < EPS);
    }

    #[test]
    fn test_guaranteed_crit_with_backstab() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, a, stats::CRIT_CHANCE, 1.0);
        set(&mut stats, a, stats::CRIT_DAMAGE, 2.0);

        let mut procs = Recorder::default();
        let mut hit = DamageInstance::new(a, t)
            .with_damage(DamageType::Slash, 10.0)
            .with_backstab(3.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut procs, &mut hit, DamageMode::Full);
        assert!(hit.critical);
        assert!((dealt - 60.0).abs() < EPS);
        assert_eq!(procs.0, vec![ProcEvent::Hit, ProcEvent::Crit, ProcEvent::DamageTaken]);
    }

    #[test]
    fn test_direct_path_skips_crit() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, a, stats::CRIT_CHANCE, 1.0);
        set(&mut stats, a, stats::PHYSICAL_DAMAGE_BONUS, 100.0);

        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Slash, 10.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct);
        assert!(!hit.critical);
        assert!((dealt - 10.0).abs() < EPS);
    }

    #[test]
    fn test_block_after_resistances() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, t, stats::ARMOR, 100.0);

        let mut hit = DamageInstance::new(a, t)
            .with_damage(DamageType::Blunt, 40.0)
            .with_block(15.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct);
        assert!((dealt - 5.0).abs() < EPS);

        let mut hit = DamageInstance::new(a, t)
            .with_damage(DamageType::Blunt, 10.0)
            .with_block(100.0);
        assert_eq!(pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct), 0.0);
    }

    #[test]
    fn test_cancel_hook_returns_zero() {
        struct Parry;
        impl DamageHook for Parry {
            fn pre_damage(&self, _: &StatEngine, hit: &mut DamageInstance) -> HandlerResult {
                hit.cancel("parried");
                Ok(())
            }
        }

        let (mut stats, mut pipeline, mut rng) = setup();
        pipeline.add_hook("parry", Parry);
        let (a, t) = ids();
        let mut procs = Recorder::default();
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Slash, 10.0);
        assert_eq!(pipeline.process(&mut stats, &mut rng, &mut procs, &mut hit, DamageMode::Full), 0.0);
        assert!(procs.0.is_empty());
        assert_eq!(pipeline.remove_hook("parry"), 1);
    }

    #[test]
    fn test_failing_hooks_are_contained() {
        struct Exploding;
        impl DamageHook for Exploding {
            fn pre_damage(&self, _: &StatEngine, _: &mut DamageInstance) -> HandlerResult {
                panic!("hook bug")
            }
            fn post_damage(&self, _: &StatEngine, _: &DamageInstance) -> HandlerResult {
                Err(HandlerError::failed("post failed"))
            }
        }
        struct Doubler;
        impl DamageHook for Doubler {
            fn pre_damage(&self, _: &StatEngine, hit: &mut DamageInstance) -> HandlerResult {
                hit.scale(2.0);
                Ok(())
            }
        }

        let (mut stats, mut pipeline, mut rng) = setup();
        pipeline.add_hook("exploding", Exploding);
        pipeline.add_hook("doubler", Doubler);
        let (a, t) = ids();
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Slash, 10.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct);
        assert!((dealt - 20.0).abs() < EPS);
    }

    #[test]
    fn test_kill_check() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        set(&mut stats, t, stats::HEALTH, 30.0);
        stats.events().drain();

        let mut procs = Recorder::default();
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Slash, 30.0);
        pipeline.process(&mut stats, &mut rng, &mut procs, &mut hit, DamageMode::Direct);
        assert_eq!(procs.0.last(), Some(&ProcEvent::Kill));
        assert!(stats
            .events()
            .drain()
            .iter()
            .any(|e| matches!(e, CombatEvent::Killed { target, .. } if *target == t)));
    }

    #[test]
    fn test_no_procs_when_suppressed() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        let mut procs = Recorder::default();
        let mut hit = DamageInstance::new(a, t)
            .with_damage(DamageType::Poison, 500.0)
            .without_procs();
        pipeline.process(&mut stats, &mut rng, &mut procs, &mut hit, DamageMode::Direct);
        assert!(procs.0.is_empty());
    }

    #[test]
    fn test_modifiers_feed_mitigation() {
        let (mut stats, pipeline, mut rng) = setup();
        let (a, t) = ids();
        stats
            .add_modifier(t, Modifier::flat("iron_skin", stats::ARMOR, 100.0))
            .expect("valid modifier");
        let mut hit = DamageInstance::new(a, t).with_damage(DamageType::Chop, 80.0);
        let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Direct);
        assert!((dealt - 40.0).abs() < EPS);
    }

    proptest! {
        #[test]
        fn test_damage_never_negative(
            amount in 0.0f32..10_000.0,
            armor in -100.0f32..5_000.0,
            resist in -500.0f32..500.0,
            block in 0.0f32..10_000.0,
        ) {
            let (mut stats, pipeline, mut rng) = setup();
            let (a, t) = ids();
            set(&mut stats, t, stats::ARMOR, armor);
            set(&mut stats, t, stats::PHYSICAL_RESIST, resist);
            set(&mut stats, t, "spirit_resist", resist);
            let mut hit = DamageInstance::new(a, t)
                .with_damage(DamageType::Slash, amount)
                .with_damage(DamageType::Spirit, amount)
                .with_block(block);
            let dealt = pipeline.process(&mut stats, &mut rng, &mut NoProcs, &mut hit, DamageMode::Full);
            prop_assert!(dealt >= 0.0);
            prop_assert!(dealt.is_finite());
        }
    }
}
