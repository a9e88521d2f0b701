//! ID types for entities and content identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ContractError;

/// Global counter for entity IDs.
static ENTITY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a live simulation entity.
///
/// Identity is owned by the host; the core only keys its state by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new unique entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an entity ID from a host-side raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) entity ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declares a case-insensitive string identifier.
///
/// Keys are trimmed and lowercased on construction so `"Armor"` and `"armor"`
/// address the same slot. The backing `Arc<str>` keeps clones cheap.
macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            /// Human-readable name of this identifier kind.
            pub const KIND: &'static str = $kind;

            /// Creates a normalized identifier.
            ///
            /// Never fails; use [`Self::parse`] where an empty id is a caller bug.
            #[must_use]
            pub fn new(raw: &str) -> Self {
                Self(Arc::from(raw.trim().to_lowercase()))
            }

            /// Creates an identifier, rejecting empty or blank input.
            pub fn parse(raw: &str) -> Result<Self, ContractError> {
                let key = Self::new(raw);
                key.validate()?;
                Ok(key)
            }

            /// Fails if this identifier is empty.
            pub fn validate(&self) -> Result<(), ContractError> {
                if self.0.is_empty() {
                    Err(ContractError::EmptyId { kind: $kind })
                } else {
                    Ok(())
                }
            }

            /// Returns the normalized string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), &*self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::new(&raw)
            }
        }

        impl From<&String> for $name {
            fn from(raw: &String) -> Self {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0.to_string()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_key!(
    /// Identifier of a stat (`"strength"`, `"fire_resist"`, ...).
    StatId,
    "stat"
);

string_key!(
    /// Identifier of a modifier within one entity+stat slot.
    ModifierId,
    "modifier"
);

string_key!(
    /// Identifier of an effect definition.
    EffectId,
    "effect"
);

string_key!(
    /// Identifier of an ability definition.
    AbilityId,
    "ability"
);

string_key!(
    /// Identifier of an equipped item carrying procs.
    ItemId,
    "item"
);
