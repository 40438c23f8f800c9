//! # TD Core
//!
//! Deterministic simulation core for Bastion Defense.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (a seeded ChaCha stream only)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Headless batch runs and balance sweeps
//! - Snapshots and state-hash comparisons
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`data`] - Unit, turret and encounter descriptors (RON)
//! - [`ledger`], [`base`] - Currency and the defended objective
//! - [`unit`], [`turret`], [`projectile`] - Entities on the field
//! - [`targeting`] - Candidate ranking policies
//! - [`waves`] - Wave scheduler
//! - [`construction`] - Placement and upgrade gate
//! - [`events`] - Deferred event bus
//! - [`simulation`] - Core simulation loop
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod base;
pub mod combat;
pub mod components;
pub mod construction;
pub mod data;
pub mod error;
pub mod events;
pub mod ledger;
pub mod math;
pub mod projectile;
pub mod simulation;
pub mod targeting;
pub mod turret;
pub mod unit;
pub mod waves;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::base::BaseHealth;
    pub use crate::combat::{calculate_damage, DamageEvent, DamageOutcome};
    pub use crate::components::*;
    pub use crate::construction::{PlacementError, Site, UpgradeError};
    pub use crate::data::{
        BaseAttackerPolicy, Catalog, EncounterConfig, TurretData, TurretKind, UnitData, UnitKind,
        WaveData,
    };
    pub use crate::error::{GameError, Result};
    pub use crate::events::{EventKind, SimEvent, SubscriptionId};
    pub use crate::ledger::Ledger;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::targeting::{TargetAcquisition, TargetingPolicy};
    pub use crate::waves::SchedulerPhase;
}
