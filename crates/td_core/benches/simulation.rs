//! Simulation benchmarks for td_core.
//!
//! Run with: `cargo bench -p td_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use td_core::data::{EncounterConfig, TurretKind};
use td_core::math::Fixed;
use td_core::simulation::Simulation;

fn defended() -> Simulation {
    let mut config = EncounterConfig::standard();
    config.starting_gold = 1000;
    let mut sim = Simulation::new(&config).expect("standard encounter is valid");
    for (site, kind) in [
        TurretKind::Basic,
        TurretKind::Slow,
        TurretKind::LongRange,
        TurretKind::ShortRange,
    ]
    .into_iter()
    .enumerate()
    {
        let site = u32::try_from(site).expect("four sites");
        sim.construct(kind, site).expect("site is free");
    }
    sim
}

/// Runs simulation benchmarks for the td_core crate.
pub fn simulation_benchmark(c: &mut Criterion) {
    let dt = Fixed::from_num(1) / Fixed::from_num(16);

    c.bench_function("tick_defended_standard_x400", |b| {
        b.iter_batched(
            defended,
            |mut sim| {
                for _ in 0..400 {
                    black_box(sim.tick(dt));
                }
                sim
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("state_hash", |b| {
        let mut sim = defended();
        for _ in 0..200 {
            sim.tick(dt);
        }
        b.iter(|| black_box(sim.state_hash()));
    });

    c.bench_function("snapshot_restore", |b| {
        let mut sim = defended();
        for _ in 0..200 {
            sim.tick(dt);
        }
        b.iter(|| {
            let bytes = sim.snapshot().expect("snapshot");
            black_box(Simulation::from_snapshot(&bytes).expect("restore"))
        });
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
