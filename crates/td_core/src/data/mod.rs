//! Data structures for encounter configuration.
//!
//! This module contains pure data structures that define enemies, turrets
//! and encounters. All structs are designed to be deserialized from RON.
//!
//! **Note:** This module contains no IO - it only defines data types.
//! File loading is handled by `td_headless`.

mod catalog;
mod encounter;
mod turret_data;
mod unit_data;

pub use catalog::Catalog;
pub use encounter::{
    BaseAttackerPolicy, EncounterConfig, EnemyGroup, PointData, SchedulerSettings, SiteData,
    SpawnPointData, WaveData, MAX_COORDINATE,
};
pub use turret_data::{
    TurretData, TurretKind, DEFAULT_BUILD_COST, DEFAULT_PROJECTILE_SPEED, DEFAULT_TURN_RATE,
};
pub use unit_data::{UnitData, UnitKind};
