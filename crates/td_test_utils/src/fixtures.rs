//! Test fixtures and helpers.
//!
//! Pre-built encounters and simulations for consistent testing.

use fixed::types::I32F32;
use td_core::data::{
    BaseAttackerPolicy, Catalog, EncounterConfig, EnemyGroup, PointData, SchedulerSettings,
    SiteData, SpawnPointData, TurretKind, UnitKind, WaveData,
};
use td_core::simulation::Simulation;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// A wave of one group.
#[must_use]
pub fn single_group_wave(kind: UnitKind, count: u32, spawn_rate: i32) -> WaveData {
    WaveData {
        groups: vec![EnemyGroup { kind, count }],
        spawn_rate: fixed(spawn_rate),
    }
}

/// A straight lane: one spawn point at the origin, a path running north
/// to `(0, length)`, and one site three units east of the lane midpoint.
///
/// Waves do not auto-start; call [`Simulation::start_waves`].
#[must_use]
pub fn lane_encounter(length: i32, waves: Vec<WaveData>) -> EncounterConfig {
    EncounterConfig {
        name: "lane".to_string(),
        seed: 7,
        starting_gold: 100,
        base_health: 100,
        spawn_points: vec![SpawnPointData {
            name: "origin".to_string(),
            position: PointData::from_ints(0, 0),
        }],
        path: vec![PointData::from_ints(0, length)],
        sites: vec![SiteData {
            name: "lane side".to_string(),
            position: PointData::from_ints(3, length / 2),
            capacity: 1,
        }],
        waves,
        scheduler: SchedulerSettings {
            auto_start: false,
            ..SchedulerSettings::default()
        },
        base_attackers: BaseAttackerPolicy::Persistent,
        catalog: Catalog::default(),
    }
}

/// The built-in standard encounter with a given seed.
#[must_use]
pub fn standard_encounter(seed: u64) -> EncounterConfig {
    EncounterConfig {
        seed,
        ..EncounterConfig::standard()
    }
}

/// The standard encounter with one turret on each of the first two sites.
///
/// # Panics
///
/// Panics if the standard encounter cannot afford the turrets.
#[must_use]
pub fn defended_standard(seed: u64) -> Simulation {
    let mut config = standard_encounter(seed);
    config.starting_gold = 500;
    let mut sim = Simulation::new(&config).expect("standard encounter is valid");
    sim.construct(TurretKind::Basic, 0)
        .expect("site 0 is free");
    sim.construct(TurretKind::Slow, 1).expect("site 1 is free");
    sim
}

/// Advance a simulation `ticks` times by `dt`.
pub fn run_ticks(sim: &mut Simulation, ticks: u32, dt: I32F32) {
    for _ in 0..ticks {
        sim.tick(dt);
    }
}
