//! End-to-end encounter tests for td_core.
//!
//! These drive a full [`Simulation`] through its public commands and
//! check the observable behaviour: balances, health, events, ordering.

use std::sync::{Arc, Mutex};

use td_core::components::SlowSpec;
use td_core::data::{TurretKind, UnitKind};
use td_core::events::{EventKind, SimEvent};
use td_core::prelude::*;
use td_test_utils::fixtures::{fixed, fixed_f, lane_encounter, run_ticks, single_group_wave};

fn record(sim: &mut Simulation, kind: Option<EventKind>) -> Arc<Mutex<Vec<SimEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = move |event: &SimEvent| sink.lock().unwrap().push(event.clone());
    match kind {
        Some(kind) => sim.subscribe(kind, listener),
        None => sim.subscribe_all(listener),
    };
    seen
}

// =============================================================================
// Damage & Death
// =============================================================================

mod damage {
    use super::*;

    #[test]
    fn test_three_hits_kill_and_pay_once() {
        let mut sim =
            Simulation::new(&lane_encounter(100, vec![single_group_wave(UnitKind::Standard, 1, 1)]))
                .unwrap();
        let deaths = record(&mut sim, Some(EventKind::UnitDied));
        let unit = sim.start_waves()[0];

        let healths: Vec<i32> = (0..3)
            .filter_map(|_| sim.damage_unit(unit, 40))
            .map(|o| o.health.current)
            .collect();
        assert_eq!(healths, vec![60, 20, -20]);

        assert!(sim.unit_health(unit).is_none());
        assert_eq!(sim.balance(), 110);
        assert_eq!(deaths.lock().unwrap().len(), 1);

        sim.tick(fixed(1));
        assert_eq!(sim.balance(), 110);
        assert_eq!(deaths.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_death_wins_over_arrival() {
        let mut config = lane_encounter(10, vec![single_group_wave(UnitKind::Standard, 1, 1)]);
        for turret in &mut config.catalog.turrets {
            turret.damage = 500;
        }
        let mut sim = Simulation::new(&config).unwrap();
        sim.construct(TurretKind::Basic, 0).unwrap();
        let seen = record(&mut sim, None);
        let unit = sim.start_waves()[0];

        // Tick 1: unit halfway, turret fires. Tick 2: unit finishes the
        // path and the projectile lands in the same tick.
        sim.tick(fixed(1));
        let events = sim.tick(fixed(1));

        assert_eq!(events.deaths, vec![unit]);
        assert!(events.arrivals.is_empty());
        let seen = seen.lock().unwrap();
        assert!(!seen
            .iter()
            .any(|e| matches!(e, SimEvent::UnitReachedBase { .. })));
        assert_eq!(sim.base_health().current(), 100);
        assert_eq!(sim.balance(), 60);
    }

    #[test]
    fn test_projectile_to_removed_target_fizzles() {
        let mut sim =
            Simulation::new(&lane_encounter(40, vec![single_group_wave(UnitKind::Heavy, 1, 1)]))
                .unwrap();
        sim.construct(TurretKind::Basic, 0).unwrap();
        let fizzles = record(&mut sim, Some(EventKind::ProjectileFizzled));
        let unit = sim.start_waves()[0];

        // Heavy walks 3 per second; the site at (3, 20) sees it from tick 4.
        let mut fired = false;
        for _ in 0..8 {
            sim.tick(fixed(1));
            if !sim.projectiles().is_empty() {
                fired = true;
                break;
            }
        }
        assert!(fired);

        assert!(sim.despawn_unit(unit));
        sim.tick(fixed(1));
        assert!(sim.projectiles().is_empty());
        assert_eq!(fizzles.lock().unwrap().len(), 1);
        assert_eq!(sim.balance(), 50);
    }
}

// =============================================================================
// Slows
// =============================================================================

mod slows {
    use super::*;

    #[test]
    fn test_second_slow_replaces_first_and_expiry_restores_base() {
        let mut sim =
            Simulation::new(&lane_encounter(100, vec![single_group_wave(UnitKind::Standard, 1, 1)]))
                .unwrap();
        let unit = sim.start_waves()[0];

        assert!(sim.slow_unit(unit, SlowSpec::new(fixed_f(0.5), fixed(4))));
        assert!(sim.slow_unit(unit, SlowSpec::new(fixed_f(0.25), fixed(2))));
        assert_eq!(sim.unit(unit).unwrap().effective_speed(), fixed_f(3.75));

        run_ticks(&mut sim, 2, fixed(1));
        let unit = sim.unit(unit).unwrap();
        assert!(unit.slow().is_none());
        assert_eq!(unit.effective_speed(), fixed(5));
    }

    #[test]
    fn test_slow_turret_projectile_slows_its_target() {
        let mut sim =
            Simulation::new(&lane_encounter(40, vec![single_group_wave(UnitKind::Standard, 1, 1)]))
                .unwrap();
        sim.construct(TurretKind::Slow, 0).unwrap();
        let unit = sim.start_waves()[0];

        let mut hit = false;
        for _ in 0..40 {
            sim.tick(fixed_f(0.25));
            if sim.unit(unit).unwrap().slow().is_some() {
                hit = true;
                break;
            }
        }
        assert!(hit);

        let slowed = sim.unit(unit).unwrap();
        assert_eq!(slowed.slow().unwrap().factor, fixed_f(0.5));
        assert_eq!(slowed.health().current, 98);
        assert_eq!(slowed.effective_speed(), fixed_f(2.5));

        let before = slowed.position.y;
        sim.tick(fixed_f(0.25));
        let step = sim.unit(unit).unwrap().position.y - before;
        assert!((step - fixed_f(0.625)).abs() < fixed_f(0.001), "moved {step}");
    }

    #[test]
    fn test_invalid_slow_is_ignored() {
        let mut sim =
            Simulation::new(&lane_encounter(100, vec![single_group_wave(UnitKind::Standard, 1, 1)]))
                .unwrap();
        let unit = sim.start_waves()[0];
        assert!(!sim.slow_unit(unit, SlowSpec::new(fixed(1), fixed(2))));
        assert!(!sim.slow_unit(999, SlowSpec::new(fixed_f(0.5), fixed(2))));
        assert_eq!(sim.unit(unit).unwrap().effective_speed(), fixed(5));
    }
}

// =============================================================================
// Targeting
// =============================================================================

mod targeting {
    use super::*;

    #[test]
    fn test_nearest_first_and_promotion_after_removal() {
        let mut sim =
            Simulation::new(&lane_encounter(40, vec![single_group_wave(UnitKind::Standard, 2, 1)]))
                .unwrap();
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();
        let lead = sim.start_waves()[0];
        let trailer = sim.tick(fixed(1)).spawned[0];

        // Tick 4: lead at (0, 20), trailer at (0, 15). Turret at (3, 20).
        run_ticks(&mut sim, 3, fixed(1));
        assert_eq!(sim.turret(turret).unwrap().targets().ids(), &[lead, trailer]);

        sim.despawn_unit(lead);
        sim.tick(fixed(1));
        assert_eq!(sim.turret(turret).unwrap().targets().first(), Some(trailer));
    }

    #[test]
    fn test_zone_feed_matches_radius_scan() {
        let waves = vec![single_group_wave(UnitKind::Fast, 4, 2)];
        let scan_config = lane_encounter(40, waves.clone());
        let mut zone_config = lane_encounter(40, waves);
        for turret in &mut zone_config.catalog.turrets {
            turret.acquisition = TargetAcquisition::ZoneFeed;
        }

        let mut scan = Simulation::new(&scan_config).unwrap();
        let mut zone = Simulation::new(&zone_config).unwrap();
        let scan_turret = scan.construct(TurretKind::LongRange, 0).unwrap();
        let zone_turret = zone.construct(TurretKind::LongRange, 0).unwrap();
        scan.start_waves();
        zone.start_waves();

        let mut engaged = false;
        for _ in 0..24 {
            scan.tick(fixed_f(0.25));
            zone.tick(fixed_f(0.25));
            let a = scan.turret(scan_turret).unwrap().targets().ids().to_vec();
            let b = zone.turret(zone_turret).unwrap().targets().ids().to_vec();
            assert_eq!(a, b);
            engaged |= !a.is_empty();
        }
        assert!(engaged);
    }

    #[test]
    fn test_volley_fires_once_per_ranked_target() {
        let mut sim =
            Simulation::new(&lane_encounter(40, vec![single_group_wave(UnitKind::Standard, 4, 4)]))
                .unwrap();
        let turret = sim.construct(TurretKind::LongRange, 0).unwrap();
        assert_eq!(sim.turret(turret).unwrap().max_targets(), 3);
        sim.start_waves();

        let mut volleys = Vec::new();
        for _ in 0..30 {
            let events = sim.tick(fixed_f(0.25));
            let targets: Vec<EntityId> = events
                .events
                .iter()
                .filter_map(|e| match e {
                    SimEvent::ProjectileFired { target, .. } => Some(*target),
                    _ => None,
                })
                .collect();
            if !targets.is_empty() {
                volleys.push(targets);
            }
        }

        assert!(volleys.iter().all(|v| v.len() <= 3));
        let full = volleys.iter().find(|v| v.len() == 3).expect("a full volley");
        let mut distinct = full.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_lowest_health_policy_fires_at_weakest() {
        let mut sim =
            Simulation::new(&lane_encounter(40, vec![single_group_wave(UnitKind::Standard, 2, 1)]))
                .unwrap();
        let lead = sim.start_waves()[0];
        let trailer = sim.tick(fixed(1)).spawned[0];
        sim.damage_unit(trailer, 50).unwrap();
        run_ticks(&mut sim, 2, fixed(1));

        // Built late so the first volley sees both units: lead at
        // (0, 20) is nearer the turret, trailer at (0, 15) is weaker.
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();
        assert!(sim.set_targeting(turret, TargetingPolicy::LowestHealth));
        let events = sim.tick(fixed(1));

        assert_eq!(sim.turret(turret).unwrap().targets().ids(), &[trailer, lead]);
        let fired: Vec<EntityId> = events
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::ProjectileFired { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(fired, vec![trailer]);
    }

    #[test]
    fn test_random_policy_is_seeded() {
        let run = || {
            let mut sim = Simulation::new(&lane_encounter(
                60,
                vec![single_group_wave(UnitKind::Heavy, 6, 4)],
            ))
            .unwrap();
            let turret = sim.construct(TurretKind::LongRange, 0).unwrap();
            sim.set_targeting(turret, TargetingPolicy::Random);
            sim.start_waves();
            let mut orders = Vec::new();
            for _ in 0..40 {
                sim.tick(fixed_f(0.25));
                orders.push(sim.turret(turret).unwrap().targets().ids().to_vec());
            }
            orders
        };
        assert_eq!(run(), run());
    }
}

// =============================================================================
// Waves
// =============================================================================

mod waves {
    use super::*;

    #[test]
    fn test_early_start_grants_whole_seconds() {
        let waves = vec![
            single_group_wave(UnitKind::Standard, 1, 1),
            single_group_wave(UnitKind::Standard, 1, 1),
        ];
        let mut sim = Simulation::new(&lane_encounter(100, waves)).unwrap();
        sim.start_waves();
        assert_eq!(sim.countdown_remaining(), Some(fixed(15)));

        run_ticks(&mut sim, 5, fixed(1));
        assert_eq!(sim.countdown_remaining(), Some(fixed(10)));

        assert_eq!(sim.request_early_wave(), Some(10));
        assert_eq!(sim.balance(), 110);
        assert_eq!(sim.current_wave(), 2);
        assert_eq!(sim.units().len(), 2);
        assert!(sim.waves_completed());
    }

    #[test]
    fn test_fractional_remaining_is_floored() {
        let waves = vec![
            single_group_wave(UnitKind::Standard, 1, 1),
            single_group_wave(UnitKind::Standard, 1, 1),
        ];
        let mut sim = Simulation::new(&lane_encounter(100, waves)).unwrap();
        sim.start_waves();
        sim.tick(fixed_f(0.75));
        assert_eq!(sim.request_early_wave(), Some(14));
    }

    #[test]
    fn test_early_start_while_spawning_is_noop() {
        let mut sim =
            Simulation::new(&lane_encounter(100, vec![single_group_wave(UnitKind::Standard, 3, 1)]))
                .unwrap();
        sim.start_waves();
        assert!(matches!(sim.scheduler_phase(), SchedulerPhase::Spawning(_)));
        assert_eq!(sim.request_early_wave(), None);
        assert_eq!(sim.balance(), 100);
        assert_eq!(sim.units().len(), 1);
    }

    #[test]
    fn test_trigger_cancels_countdown() {
        let waves = vec![
            single_group_wave(UnitKind::Standard, 1, 1),
            single_group_wave(UnitKind::Fast, 1, 1),
            single_group_wave(UnitKind::Heavy, 1, 1),
        ];
        let mut sim = Simulation::new(&lane_encounter(100, waves)).unwrap();
        let countdowns = record(&mut sim, Some(EventKind::CountdownTick));
        sim.start_waves();

        sim.tick(fixed(1));
        assert!(sim.trigger_next_wave());
        assert_eq!(sim.current_wave(), 2);
        assert_eq!(sim.countdown_remaining(), Some(fixed(15)));

        let seen = countdowns.lock().unwrap();
        assert_eq!(
            seen.last(),
            Some(&SimEvent::CountdownTick {
                remaining: Fixed::ZERO
            })
        );
    }

    #[test]
    fn test_completion_is_announced_once() {
        let mut sim =
            Simulation::new(&lane_encounter(100, vec![single_group_wave(UnitKind::Fast, 2, 2)]))
                .unwrap();
        let done = record(&mut sim, Some(EventKind::WavesCompleted));
        sim.start_waves();
        run_ticks(&mut sim, 4, fixed(1));

        assert!(sim.waves_completed());
        assert!(!sim.trigger_next_wave());
        assert_eq!(sim.request_early_wave(), None);
        assert_eq!(done.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_auto_start_events_arrive_with_first_tick() {
        let mut config = lane_encounter(100, vec![single_group_wave(UnitKind::Standard, 2, 1)]);
        config.scheduler.auto_start = true;
        let mut sim = Simulation::new(&config).unwrap();
        let started = record(&mut sim, Some(EventKind::WaveStarted));
        assert_eq!(sim.current_wave(), 1);

        sim.tick(fixed(1));
        assert_eq!(
            *started.lock().unwrap(),
            vec![SimEvent::WaveStarted { wave: 1 }]
        );
    }
}

// =============================================================================
// Economy & Construction
// =============================================================================

mod economy {
    use super::*;

    #[test]
    fn test_occupied_site_rejected_regardless_of_funds() {
        let mut config = lane_encounter(40, vec![]);
        config.starting_gold = 50;
        let mut sim = Simulation::new(&config).unwrap();
        sim.construct(TurretKind::Basic, 0).unwrap();
        assert_eq!(sim.balance(), 0);

        assert_eq!(
            sim.construct(TurretKind::Basic, 0),
            Err(PlacementError::SiteUnavailable(0))
        );
        assert_eq!(sim.balance(), 0);
    }

    #[test]
    fn test_rejected_construction_changes_nothing() {
        let mut config = lane_encounter(40, vec![]);
        config.starting_gold = 30;
        let mut sim = Simulation::new(&config).unwrap();
        let balance = record(&mut sim, Some(EventKind::BalanceChanged));
        let hash = sim.state_hash();

        assert_eq!(
            sim.construct(TurretKind::Slow, 0),
            Err(PlacementError::InsufficientFunds {
                cost: 50,
                balance: 30
            })
        );
        assert_eq!(sim.construct(TurretKind::Slow, 3), Err(PlacementError::UnknownSite(3)));
        assert_eq!(sim.state_hash(), hash);
        assert!(balance.lock().unwrap().is_empty());
    }

    #[test]
    fn test_upgrade_checks_level_before_funds() {
        let mut config = lane_encounter(40, vec![]);
        config.starting_gold = 170;
        let mut sim = Simulation::new(&config).unwrap();
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();
        assert_eq!(sim.upgrade(turret), Ok(1));
        assert_eq!(sim.upgrade(turret), Ok(2));
        assert_eq!(sim.balance(), 0);
        assert_eq!(
            sim.upgrade(turret),
            Err(UpgradeError::MaxLevelReached { turret, level: 2 })
        );
    }
}

// =============================================================================
// Base
// =============================================================================

mod base {
    use super::*;

    #[test]
    fn test_undefended_lane_falls_and_freezes() {
        let mut config = lane_encounter(10, vec![single_group_wave(UnitKind::Heavy, 2, 1)]);
        config.base_health = 100;
        let mut sim = Simulation::new(&config).unwrap();
        let failed = record(&mut sim, Some(EventKind::DefenseFailed));
        sim.start_waves();

        run_ticks(&mut sim, 20, fixed(1));
        assert!(sim.is_defense_failed());
        assert_eq!(sim.base_health().current(), 0);
        assert_eq!(failed.lock().unwrap().len(), 1);

        let tick = sim.get_tick();
        sim.tick(fixed(1));
        assert_eq!(sim.get_tick(), tick);
    }

    #[test]
    fn test_base_attackers_are_untargetable() {
        let mut sim =
            Simulation::new(&lane_encounter(5, vec![single_group_wave(UnitKind::Standard, 1, 1)]))
                .unwrap();
        let unit = sim.start_waves()[0];
        sim.tick(fixed(1));
        assert!(sim.unit(unit).unwrap().is_attacking_base());
        assert!(sim.damage_unit(unit, 1000).is_none());
        assert!(!sim.slow_unit(unit, SlowSpec::new(fixed_f(0.5), fixed(2))));
    }
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use proptest::prelude::*;
    use td_core::events::EventBus;
    use td_core::ledger::Ledger;
    use td_test_utils::determinism::compute_hash;
    use td_test_utils::determinism::strategies::{
        arb_damage, arb_dt, arb_ledger_ops, arb_turret_kind, arb_unit_kind,
    };
    use td_test_utils::fixtures::defended_standard;

    use super::*;

    proptest! {
        #[test]
        fn damage_is_never_below_one(amount in arb_damage(), defense in 0i32..50) {
            prop_assert!(calculate_damage(amount, defense) >= 1);
        }

        #[test]
        fn ledger_never_goes_negative(ops in arb_ledger_ops()) {
            let mut bus = EventBus::new();
            let mut ledger = Ledger::new(100);
            for op in ops {
                if op >= 0 {
                    ledger.grant(op, &mut bus);
                } else {
                    let before = ledger.balance();
                    let spent = ledger.try_spend(-op, &mut bus);
                    prop_assert_eq!(spent, -op <= before);
                }
                prop_assert!(ledger.balance() >= 0);
            }
            let before = ledger.balance();
            prop_assert!(!ledger.try_spend(before + 1, &mut bus));
            prop_assert_eq!(ledger.balance(), before);
        }

        #[test]
        fn construction_reports_its_cost_once(kind in arb_turret_kind()) {
            let config = lane_encounter(40, vec![]);
            let cost = config.catalog.turret(kind).unwrap().build_cost;
            let mut sim = Simulation::new(&config).unwrap();
            sim.construct(kind, 0).unwrap();

            let spent: Vec<SimEvent> = sim
                .flush_events()
                .into_iter()
                .filter(|e| matches!(e, SimEvent::GoldSpent { .. }))
                .collect();
            prop_assert_eq!(spent, vec![SimEvent::GoldSpent { amount: cost }]);
            prop_assert_eq!(sim.balance(), 100 - cost);
        }

        #[test]
        fn kill_pays_the_unit_bounty(kind in arb_unit_kind()) {
            let mut sim =
                Simulation::new(&lane_encounter(40, vec![single_group_wave(kind, 1, 1)])).unwrap();
            let unit = sim.start_waves()[0];
            let bounty = sim.unit(unit).unwrap().bounty();

            sim.damage_unit(unit, 100_000).unwrap();
            prop_assert!(sim.unit(unit).is_none());
            prop_assert_eq!(sim.balance(), 100 + bounty);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn same_inputs_same_hash(dts in prop::collection::vec(arb_dt(), 1..60), seed in 0u64..1000) {
            let mut a = defended_standard(seed);
            let mut b = defended_standard(seed);
            for dt in dts {
                let events_a = a.tick(dt).events;
                let events_b = b.tick(dt).events;
                prop_assert_eq!(compute_hash(&events_a), compute_hash(&events_b));
            }
            prop_assert_eq!(a.state_hash(), b.state_hash());
        }
    }
}
