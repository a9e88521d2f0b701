//! # Runeforge Common
//!
//! Common types shared by the Runeforge crates:
//! - ID types (`EntityId` and case-insensitive content keys)
//! - Contract and handler error types
//! - Clock abstractions
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod clock;
pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;
