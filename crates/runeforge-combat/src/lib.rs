//! # Runeforge Combat
//!
//! Combat core for Runeforge.
//!
//! This crate provides the numeric engines content modules plug into:
//! - Stats and modifiers with cached four-phase resolution
//! - A ten-phase damage pipeline with pluggable formulas and hooks
//! - Timed and triggered effects, procs and per-item procs
//! - Ability cast and cooldown state machine
//! - Runtime orchestration, deferred commands and DoT
//! - Event bus for inter-system communication

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod ability;
pub mod command;
pub mod config;
pub mod damage;
pub mod definitions;
pub mod effect;
pub mod events;
pub mod formulas;
pub mod guard;
pub mod item_proc;
pub mod modifier;
pub mod pipeline;
pub mod runtime;
pub mod stat_container;
pub mod stat_engine;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::ability::*;
    pub use crate::command::*;
    pub use crate::config::*;
    pub use crate::damage::*;
    pub use crate::definitions::*;
    pub use crate::effect::*;
    pub use crate::events::*;
    pub use crate::formulas::*;
    pub use crate::item_proc::*;
    pub use crate::modifier::*;
    pub use crate::pipeline::*;
    pub use crate::runtime::*;
    pub use crate::stat_container::*;
    pub use crate::stat_engine::*;
    pub use runeforge_common::prelude::*;
}

pub use prelude::*;
