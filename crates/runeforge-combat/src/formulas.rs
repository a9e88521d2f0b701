//! Mitigation and critical-hit formulas.
//!
//! Each formula kind is a strategy trait with one registered implementation.
//! Hosts may swap an implementation; a failing override falls back to the
//! built-in formula for that call.

use std::fmt;
use std::sync::Arc;

use crate::guard::isolate_value;

// ============================================================================
// Formula Traits
// ============================================================================

/// Fraction of physical damage removed by armor.
pub trait ArmorFormula: Send + Sync {
    /// Reduction in 0.0-1.0.
    fn reduction(&self, armor: f32, scaling: f32) -> f32;
}

/// Damage multiplier from a percentage resistance.
pub trait ResistFormula: Send + Sync {
    /// Multiplier applied to damage of the resisted type.
    fn multiplier(&self, resist_percent: f32, min: f32, max: f32) -> f32;
}

/// Crit chance and multiplier.
pub trait CritFormula: Send + Sync {
    /// Chance in 0.0-1.0.
    fn chance(&self, crit_chance: f32, secondary_points: f32, per_point: f32) -> f32;

    /// Multiplier applied to a critical hit.
    fn multiplier(&self, crit_damage: f32, backstab: Option<f32>) -> f32;
}

// ============================================================================
// Built-in Formulas
// ============================================================================

/// `armor / (armor + scaling)`: 100 armor halves, 300 leaves a quarter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiminishingArmor;

impl ArmorFormula for DiminishingArmor {
    fn reduction(&self, armor: f32, scaling: f32) -> f32 {
        if armor <= 0.0 {
            0.0
        } else {
            armor / (armor + scaling.max(f32::EPSILON))
        }
    }
}

/// `1 - clamp(resist) / 100`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClampedResist;

impl ResistFormula for ClampedResist {
    fn multiplier(&self, resist_percent: f32, min: f32, max: f32) -> f32 {
        (1.0 - resist_percent.clamp(min, max) / 100.0).max(0.0)
    }
}

/// Additive chance; crit damage times backstab.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCrit;

impl CritFormula for StandardCrit {
    fn chance(&self, crit_chance: f32, secondary_points: f32, per_point: f32) -> f32 {
        (crit_chance + secondary_points * per_point).clamp(0.0, 1.0)
    }

    fn multiplier(&self, crit_damage: f32, backstab: Option<f32>) -> f32 {
        crit_damage.max(1.0) * backstab.unwrap_or(1.0).max(1.0)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// One implementation per formula kind.
#[derive(Clone)]
pub struct Formulas {
    armor: Arc<dyn ArmorFormula>,
    resist: Arc<dyn ResistFormula>,
    crit: Arc<dyn CritFormula>,
}

impl Default for Formulas {
    fn default() -> Self {
        Self {
            armor: Arc::new(DiminishingArmor),
            resist: Arc::new(ClampedResist),
            crit: Arc::new(StandardCrit),
        }
    }
}

impl fmt::Debug for Formulas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formulas").finish_non_exhaustive()
    }
}

impl Formulas {
    /// Built-in formulas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the armor formula.
    pub fn set_armor(&mut self, formula: impl ArmorFormula + 'static) {
        self.armor = Arc::new(formula);
    }

    /// Replace the resistance formula.
    pub fn set_resist(&mut self, formula: impl ResistFormula + 'static) {
        self.resist = Arc::new(formula);
    }

    /// Replace the crit formula.
    pub fn set_crit(&mut self, formula: impl CritFormula + 'static) {
        self.crit = Arc::new(formula);
    }

    /// Armor reduction, clamped to 0.0-1.0.
    #[must_use]
    pub fn armor_reduction(&self, armor: f32, scaling: f32) -> f32 {
        let fallback = DiminishingArmor.reduction(armor, scaling);
        let value = isolate_value("armor formula", fallback, || {
            Ok(self.armor.reduction(armor, scaling))
        });
        sanitize(value, fallback).clamp(0.0, 1.0)
    }

    /// Resistance multiplier, never negative.
    #[must_use]
    pub fn resist_multiplier(&self, resist_percent: f32, min: f32, max: f32) -> f32 {
        let fallback = ClampedResist.multiplier(resist_percent, min, max);
        let value = isolate_value("resist formula", fallback, || {
            Ok(self.resist.multiplier(resist_percent, min, max))
        });
        sanitize(value, fallback).max(0.0)
    }

    /// Crit chance, clamped to 0.0-1.0.
    #[must_use]
    pub fn crit_chance(&self, crit_chance: f32, secondary_points: f32, per_point: f32) -> f32 {
        let fallback = StandardCrit.chance(crit_chance, secondary_points, per_point);
        let value = isolate_value("crit chance formula", fallback, || {
            Ok(self.crit.chance(crit_chance, secondary_points, per_point))
        });
        sanitize(value, fallback).clamp(0.0, 1.0)
    }

    /// Crit multiplier, at least 1.
    #[must_use]
    pub fn crit_multiplier(&self, crit_damage: f32, backstab: Option<f32>) -> f32 {
        let fallback = StandardCrit.multiplier(crit_damage, backstab);
        let value = isolate_value("crit multiplier formula", fallback, || {
            Ok(self.crit.multiplier(crit_damage, backstab))
        });
        sanitize(value, fallback).max(1.0)
    }
}

fn sanitize(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
