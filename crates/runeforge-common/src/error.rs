//! Error types shared by the Runeforge crates.

use thiserror::Error;

/// A caller broke an API contract.
///
/// These are programming errors in the calling content module and are always
/// surfaced to the caller; the core never absorbs them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    /// An identifier was empty or blank.
    #[error("empty {kind} id")]
    EmptyId {
        /// Identifier kind (`"stat"`, `"modifier"`, ...)
        kind: &'static str,
    },

    /// A numeric input was NaN or infinite.
    #[error("non-finite {what}: {value}")]
    NonFinite {
        /// Name of the offending field
        what: &'static str,
        /// Value supplied
        value: f64,
    },

    /// A negative duration was supplied.
    #[error("negative duration for {id}: {duration}")]
    NegativeDuration {
        /// Id of the modifier or effect
        id: String,
        /// Duration supplied
        duration: f64,
    },

    /// A stacking limit of zero was supplied.
    #[error("max stacks must be at least 1 for {id}")]
    ZeroStackLimit {
        /// Id of the modifier or effect
        id: String,
    },

    /// The null entity was used as an owner or target.
    #[error("null entity id passed to {operation}")]
    NullEntity {
        /// Operation that received it
        operation: &'static str,
    },
}

impl ContractError {
    /// Checks that a value is finite.
    pub fn check_finite(what: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(Self::NonFinite { what, value })
        }
    }
}

/// Failure reported by externally supplied logic (proc handlers, tick
/// callbacks, conditions, pipeline hooks).
///
/// The core logs these at the call site and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler panicked; the payload message is kept when it is a string.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a failure from any displayable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for externally supplied callbacks.
pub type HandlerResult = Result<(), HandlerError>;

/// Result type for operations that validate caller input.
pub type ContractResult<T> = Result<T, ContractError>;
