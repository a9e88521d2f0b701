//! Stat modifiers.
//!
//! This module provides:
//! - The four modifier kinds and their resolution phases
//! - Stacking policies shared by modifiers and effects
//! - Timed and conditional modifiers

use runeforge_common::{
    has_elapsed, ContractError, EntityId, HandlerError, ModifierId, StatId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Modifier Kinds
// ============================================================================

/// How a modifier is applied. Kinds resolve in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Added to the base.
    Flat,
    /// Summed, then applied as `1 + sum / 100`.
    Percent,
    /// Multiplied together.
    Multiply,
    /// Replaces the value; the highest `order` wins.
    Override,
}

impl ModifierKind {
    /// All kinds in resolution order.
    pub const PHASES: [Self; 4] = [Self::Flat, Self::Percent, Self::Multiply, Self::Override];
}

// ============================================================================
// Stacking
// ============================================================================

/// What happens when an entry with the same id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StackPolicy {
    /// Delete the existing entry and insert the new one.
    #[default]
    Replace,
    /// Keep the existing entry, reject the new one.
    Ignore,
    /// Keep value and stacks, reset the timestamp.
    Refresh,
    /// Add a stack up to the cap and reset the timestamp.
    Stack,
    /// Insert alongside under a derived id.
    Independent,
}

/// Resolution of an id collision under a [`StackPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    /// Reject without mutation.
    Reject,
    /// Remove the old entry and insert the new one.
    Replace,
    /// Reset the old entry's timestamp.
    Refresh,
    /// Add one stack and reset the timestamp.
    AddStack,
    /// At the cap: reset the timestamp only.
    StackCapped,
    /// Insert under a derived id.
    Coexist,
}

impl StackPolicy {
    /// Decides how an application collides with an entry holding `current` stacks.
    #[must_use]
    pub fn on_collision(self, current: u32, max: u32) -> Collision {
        match self {
            Self::Ignore => Collision::Reject,
            Self::Replace => Collision::Replace,
            Self::Refresh => Collision::Refresh,
            Self::Stack if current < max => Collision::AddStack,
            Self::Stack => Collision::StackCapped,
            Self::Independent => Collision::Coexist,
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Runtime predicate deciding whether a modifier currently contributes.
pub trait ModifierCondition: Send + Sync {
    /// Returns whether the modifier applies to `entity` right now.
    fn holds(&self, entity: EntityId) -> Result<bool, HandlerError>;
}

impl<F> ModifierCondition for F
where
    F: Fn(EntityId) -> bool + Send + Sync,
{
    fn holds(&self, entity: EntityId) -> Result<bool, HandlerError> {
        Ok(self(entity))
    }
}

/// Shared handle to a [`ModifierCondition`].
#[derive(Clone)]
pub struct Condition(Arc<dyn ModifierCondition>);

impl Condition {
    /// Wraps a condition.
    pub fn new(condition: impl ModifierCondition + 'static) -> Self {
        Self(Arc::new(condition))
    }

    /// Evaluates the condition; failures count as "does not hold".
    #[must_use]
    pub fn evaluate(&self, entity: EntityId) -> bool {
        crate::guard::isolate_value("modifier condition", false, || self.0.holds(entity))
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(..)")
    }
}

// ============================================================================
// Modifier
// ============================================================================

/// One adjustment to one stat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modifier {
    /// Identifier, unique within one entity+stat slot.
    pub id: ModifierId,
    /// Stat being modified.
    pub stat: StatId,
    /// How the value is applied.
    pub kind: ModifierKind,
    /// Raw value (per stack for [`StackPolicy::Stack`]).
    pub value: f32,
    /// Tie-break within a kind; for overrides, the highest wins.
    pub order: i32,
    /// Optional source label for bulk removal.
    pub source: Option<String>,
    /// Lifetime in seconds (None = permanent).
    pub duration: Option<f64>,
    /// When the modifier was (re)applied.
    pub applied_at: Timestamp,
    /// Collision policy.
    pub stack_policy: StackPolicy,
    /// Stack cap for [`StackPolicy::Stack`].
    pub max_stacks: u32,
    /// Current stack count.
    pub stacks: u32,
    /// Optional runtime predicate.
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl Modifier {
    /// Creates a permanent modifier with order 0 and the `Replace` policy.
    pub fn new(
        id: impl Into<ModifierId>,
        stat: impl Into<StatId>,
        kind: ModifierKind,
        value: f32,
    ) -> Self {
        Self {
            id: id.into(),
            stat: stat.into(),
            kind,
            value,
            order: 0,
            source: None,
            duration: None,
            applied_at: 0.0,
            stack_policy: StackPolicy::Replace,
            max_stacks: 1,
            stacks: 1,
            condition: None,
        }
    }

    /// Creates a flat modifier.
    pub fn flat(id: impl Into<ModifierId>, stat: impl Into<StatId>, value: f32) -> Self {
        Self::new(id, stat, ModifierKind::Flat, value)
    }

    /// Creates a percent modifier (`50.0` = +50%).
    pub fn percent(id: impl Into<ModifierId>, stat: impl Into<StatId>, value: f32) -> Self {
        Self::new(id, stat, ModifierKind::Percent, value)
    }

    /// Creates a multiplicative modifier.
    pub fn multiply(id: impl Into<ModifierId>, stat: impl Into<StatId>, value: f32) -> Self {
        Self::new(id, stat, ModifierKind::Multiply, value)
    }

    /// Creates an override modifier.
    pub fn override_with(id: impl Into<ModifierId>, stat: impl Into<StatId>, value: f32) -> Self {
        Self::new(id, stat, ModifierKind::Override, value)
    }

    /// Set order.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Set source label.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set duration in seconds.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Set stacking policy and cap.
    #[must_use]
    pub fn with_stacking(mut self, policy: StackPolicy, max_stacks: u32) -> Self {
        self.stack_policy = policy;
        self.max_stacks = max_stacks;
        self
    }

    /// Set runtime condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl ModifierCondition + 'static) -> Self {
        self.condition = Some(Condition::new(condition));
        self
    }

    /// Checks the modifier against the API contract.
    pub fn validate(&self) -> Result<(), ContractError> {
        self.id.validate()?;
        self.stat.validate()?;
        ContractError::check_finite("modifier value", f64::from(self.value))?;
        if let Some(duration) = self.duration {
            ContractError::check_finite("modifier duration", duration)?;
            if duration < 0.0 {
                return Err(ContractError::NegativeDuration {
                    id: self.id.to_string(),
                    duration,
                });
            }
        }
        if self.max_stacks == 0 {
            return Err(ContractError::ZeroStackLimit {
                id: self.id.to_string(),
            });
        }
        Ok(())
    }

    /// Check if expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.duration
            .is_some_and(|d| has_elapsed(now, self.applied_at, d))
    }

    /// Seconds left before expiry (None = permanent).
    #[must_use]
    pub fn remaining(&self, now: Timestamp) -> Option<f64> {
        self.duration
            .map(|d| (d - (now - self.applied_at)).max(0.0))
    }

    /// Value contributed after stacking.
    #[must_use]
    pub fn effective_value(&self) -> f32 {
        if self.stack_policy == StackPolicy::Stack {
            self.value * self.stacks as f32
        } else {
            self.value
        }
    }

    /// Whether the modifier contributes to `entity` at `now`.
    #[must_use]
    pub fn is_active(&self, entity: EntityId, now: Timestamp) -> bool {
        !self.is_expired(now)
            && self
                .condition
                .as_ref()
                .map_or(true, |condition| condition.evaluate(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_modifier_expiry() {
        let modifier = Modifier::flat("well_rested", "stamina_regen", 10.0).with_duration(6.0);

        assert!(!modifier.is_expired(5.9));
        assert!(modifier.is_expired(6.1));
        assert!((modifier.remaining(4.0).unwrap_or_default() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_permanent_modifier_never_expires() {
        let modifier = Modifier::flat("belt", "carry_weight", 150.0);
        assert!(!modifier.is_expired(1.0e9));
        assert_eq!(modifier.remaining(5.0), None);
    }

    #[test]
    fn test_stack_effective_value() {
        let mut modifier =
            Modifier::flat("rage", "strength", 2.0).with_stacking(StackPolicy::Stack, 5);
        modifier.stacks = 3;
        assert_eq!(modifier.effective_value(), 6.0);

        let mut replace = Modifier::flat("rage", "strength", 2.0);
        replace.stacks = 3;
        assert_eq!(replace.effective_value(), 2.0);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(Modifier::flat("", "armor", 1.0).validate().is_err());
        assert!(Modifier::flat("a", " ", 1.0).validate().is_err());
        assert!(Modifier::flat("a", "armor", f32::NAN).validate().is_err());
        assert!(Modifier::flat("a", "armor", 1.0)
            .with_duration(-1.0)
            .validate()
            .is_err());
        assert!(Modifier::flat("a", "armor", 1.0)
            .with_stacking(StackPolicy::Stack, 0)
            .validate()
            .is_err());
        assert!(Modifier::flat("a", "armor", 1.0).validate().is_ok());
    }

    #[test]
    fn test_collision_policies() {
        assert_eq!(StackPolicy::Ignore.on_collision(1, 3), Collision::Reject);
        assert_eq!(StackPolicy::Replace.on_collision(1, 3), Collision::Replace);
        assert_eq!(StackPolicy::Refresh.on_collision(1, 3), Collision::Refresh);
        assert_eq!(StackPolicy::Stack.on_collision(2, 3), Collision::AddStack);
        assert_eq!(StackPolicy::Stack.on_collision(3, 3), Collision::StackCapped);
        assert_eq!(StackPolicy::Independent.on_collision(1, 1), Collision::Coexist);
    }

    #[test]
    fn test_condition_gates_activity() {
        let owner = EntityId::from_raw(7);
        let modifier = Modifier::flat("night_bonus", "stealth", 5.0)
            .with_condition(move |entity: EntityId| entity == owner);

        assert!(modifier.is_active(owner, 0.0));
        assert!(!modifier.is_active(EntityId::from_raw(8), 0.0));
    }

    #[test]
    fn test_panicking_condition_does_not_hold() {
        let modifier = Modifier::flat("cursed", "armor", 5.0)
            .with_condition(|_entity: EntityId| -> bool { panic!("content bug") });
        assert!(!modifier.is_active(EntityId::from_raw(1), 0.0));
    }
}
