//! Core simulation loop.
//!
//! One [`Simulation`] owns everything an encounter needs: the ledger, the
//! base, the wave scheduler, the entity registries and the event bus. It
//! is advanced by [`Simulation::tick`] with an explicit time step.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - Randomness comes from a ChaCha8 stream seeded by the encounter
//! - Consistent iteration order (sorted entity IDs)
//! - Same inputs always produce same outputs
//!
//! # Example
//!
//! ```
//! use td_core::data::{EncounterConfig, TurretKind};
//! use td_core::math::Fixed;
//! use td_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new(&EncounterConfig::standard()).unwrap();
//! let turret = sim.construct(TurretKind::Basic, 0).unwrap();
//!
//! for _ in 0..20 {
//!     sim.tick(Fixed::from_num(0.5));
//! }
//! assert!(sim.turret(turret).is_some());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::base::BaseHealth;
use crate::combat::{DamageEvent, DamageOutcome};
use crate::components::{EntityId, Health, SiteId, SlowSpec};
use crate::construction::{check_placement, check_upgrade, PlacementError, Site, UpgradeError};
use crate::data::{BaseAttackerPolicy, Catalog, EncounterConfig, TurretKind, UnitKind};
use crate::error::{GameError, Result};
use crate::events::{EventBus, EventKind, SimEvent, SubscriptionId};
use crate::ledger::Ledger;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::projectile::{Projectile, ProjectileStep};
use crate::targeting::{CandidateInfo, TargetAcquisition, TargetingPolicy};
use crate::turret::Turret;
use crate::unit::Unit;
use crate::waves::{SchedulerPhase, WaveScheduler};

/// Storage for one kind of entity.
///
/// Uses a `HashMap` for O(1) entity lookup by ID, with deterministic
/// iteration via sorted keys when processing systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStorage<T> {
    entities: HashMap<EntityId, T>,
}

impl<T> Default for EntityStorage<T> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
}

impl<T> EntityStorage<T> {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity under an already-allocated id.
    pub fn insert(&mut self, id: EntityId, entity: T) {
        self.entities.insert(id, entity);
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in ascending id order.
    pub fn sorted(&self) -> Vec<&T> {
        self.sorted_ids()
            .into_iter()
            .filter_map(|id| self.entities.get(&id))
            .collect()
    }
}

impl<T: Hash> EntityStorage<T> {
    fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        let ids = self.sorted_ids();
        ids.len().hash(hasher);
        for id in ids {
            id.hash(hasher);
            if let Some(entity) = self.entities.get(&id) {
                entity.hash(hasher);
            }
        }
    }
}

/// Events generated during a simulation tick.
///
/// `events` holds every [`SimEvent`] dispatched at the end of the tick, in
/// emission order, preceded by any events from commands issued since the
/// previous tick or [`Simulation::flush_events`]. The other fields are
/// convenience views.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Tick number after this step.
    pub tick: u64,
    /// Units spawned this tick.
    pub spawned: Vec<EntityId>,
    /// Projectile hits.
    pub damage_events: Vec<DamageEvent>,
    /// Units that died this tick.
    pub deaths: Vec<EntityId>,
    /// Units that started attacking the base this tick.
    pub arrivals: Vec<EntityId>,
    /// Everything dispatched on the bus.
    pub events: Vec<SimEvent>,
}

/// Serializable simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct World {
    tick: u64,
    #[serde(with = "fixed_serde")]
    elapsed: Fixed,
    next_id: EntityId,
    seed: u64,
    ledger: Ledger,
    base: BaseHealth,
    scheduler: WaveScheduler,
    units: EntityStorage<Unit>,
    turrets: EntityStorage<Turret>,
    projectiles: EntityStorage<Projectile>,
    sites: Vec<Site>,
    spawn_points: Vec<Vec2Fixed>,
    path: Vec<Vec2Fixed>,
    catalog: Catalog,
    base_attackers: BaseAttackerPolicy,
    rng: ChaCha8Rng,
}

impl World {
    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// The tower-defense simulation.
///
/// # System Execution Order
///
/// Each tick, systems run in this order:
/// 1. **Movement & aim** - units walk, slows count down, trigger zones
///    update, turrets rank and aim, projectiles home
/// 2. **Damage** - projectile contact, turret volleys, base strikes
/// 3. **Death cleanup** - remove dead and expired units
/// 4. **Economy** - credit bounties
/// 5. **Arrivals** - surviving units at the path's end start attacking
/// 6. **Scheduler** - countdown and spawn cadence
///
/// Once the base falls the simulation is frozen and `tick` does nothing.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    bus: EventBus,
    /// Events already delivered by commands, not yet handed to a caller.
    delivered: Vec<SimEvent>,
}

impl Simulation {
    /// Create a simulation for an encounter.
    ///
    /// If the encounter auto-starts, the first wave begins immediately and
    /// its events are delivered with the first dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if the encounter fails
    /// validation.
    pub fn new(config: &EncounterConfig) -> Result<Self> {
        config.ensure_valid()?;

        let sites = config
            .sites
            .iter()
            .enumerate()
            .map(|(index, data)| {
                SiteId::try_from(index)
                    .map(|id| Site::from_data(id, data))
                    .map_err(|_| GameError::InvalidConfig("too many sites".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let world = World {
            tick: 0,
            elapsed: Fixed::ZERO,
            next_id: 1,
            seed: config.seed,
            ledger: Ledger::new(config.starting_gold),
            base: BaseHealth::new(config.base_health),
            scheduler: WaveScheduler::new(config.waves.clone(), config.scheduler),
            units: EntityStorage::new(),
            turrets: EntityStorage::new(),
            projectiles: EntityStorage::new(),
            sites,
            spawn_points: config
                .spawn_points
                .iter()
                .map(|s| s.position.to_vec())
                .collect(),
            path: config.path.iter().map(|p| p.to_vec()).collect(),
            catalog: config.catalog.clone(),
            base_attackers: config.base_attackers,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        };

        let mut sim = Self {
            world,
            bus: EventBus::new(),
            delivered: Vec::new(),
        };
        tracing::info!(
            encounter = %config.name,
            seed = config.seed,
            waves = config.waves.len(),
            "Simulation created"
        );

        if config.scheduler.auto_start {
            let spawns = sim.world.scheduler.start(&mut sim.bus);
            sim.spawn_units(&spawns);
        }
        Ok(sim)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Number of completed ticks.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.world.tick
    }

    /// Simulated seconds so far.
    #[must_use]
    pub const fn elapsed(&self) -> Fixed {
        self.world.elapsed
    }

    /// Seed the run was created with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.world.seed
    }

    /// Spendable currency.
    #[must_use]
    pub const fn balance(&self) -> i32 {
        self.world.ledger.balance()
    }

    /// Base health state.
    #[must_use]
    pub const fn base_health(&self) -> &BaseHealth {
        &self.world.base
    }

    /// Whether the base has fallen.
    #[must_use]
    pub const fn is_defense_failed(&self) -> bool {
        self.world.base.is_defense_failed()
    }

    /// 1-based number of the most recently started wave, 0 before the first.
    #[must_use]
    pub fn current_wave(&self) -> u32 {
        self.world.scheduler.current_wave()
    }

    /// Number of configured waves.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.world.scheduler.wave_count()
    }

    /// Seconds until the next wave, if a countdown is running.
    #[must_use]
    pub const fn countdown_remaining(&self) -> Option<Fixed> {
        self.world.scheduler.countdown_remaining()
    }

    /// Scheduler phase.
    #[must_use]
    pub const fn scheduler_phase(&self) -> SchedulerPhase {
        self.world.scheduler.phase()
    }

    /// Whether every wave has been released.
    #[must_use]
    pub const fn waves_completed(&self) -> bool {
        self.world.scheduler.is_completed()
    }

    /// Health of a unit.
    #[must_use]
    pub fn unit_health(&self, id: EntityId) -> Option<Health> {
        self.world.units.get(id).map(Unit::health)
    }

    /// A unit by id.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.world.units.get(id)
    }

    /// All units, ascending by id.
    #[must_use]
    pub fn units(&self) -> Vec<&Unit> {
        self.world.units.sorted()
    }

    /// A turret by id.
    #[must_use]
    pub fn turret(&self, id: EntityId) -> Option<&Turret> {
        self.world.turrets.get(id)
    }

    /// All turrets, ascending by id.
    #[must_use]
    pub fn turrets(&self) -> Vec<&Turret> {
        self.world.turrets.sorted()
    }

    /// Projectiles in flight, ascending by id.
    #[must_use]
    pub fn projectiles(&self) -> Vec<&Projectile> {
        self.world.projectiles.sorted()
    }

    /// Placement sites.
    #[must_use]
    pub fn sites(&self) -> &[Site] {
        &self.world.sites
    }

    /// Unit and turret definitions in use.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.world.catalog
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Listen for one kind of event.
    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.bus.subscribe(kind, listener)
    }

    /// Listen for every event.
    pub fn subscribe_all<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.bus.subscribe_all(listener)
    }

    /// Listen for one kind of event about one entity. Released when the
    /// entity is destroyed.
    pub fn subscribe_entity<F>(
        &mut self,
        entity: EntityId,
        kind: EventKind,
        listener: F,
    ) -> SubscriptionId
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.bus.subscribe_entity(entity, kind, listener)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.bus.subscription_count()
    }

    /// Deliver any queued events now and return everything dispatched
    /// since the last tick or flush, including events from commands.
    pub fn flush_events(&mut self) -> Vec<SimEvent> {
        let mut events = std::mem::take(&mut self.delivered);
        events.extend(self.bus.dispatch());
        events
    }

    /// Dispatch a command's events and keep them for the next tick or flush.
    fn dispatch_command(&mut self) {
        let events = self.bus.dispatch();
        self.delivered.extend(events);
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    ///
    /// A negative `dt`, or any call after the base has fallen, is a no-op.
    pub fn tick(&mut self, dt: Fixed) -> TickEvents {
        let mut events = TickEvents {
            tick: self.world.tick,
            ..TickEvents::default()
        };
        if self.is_defense_failed() || dt < Fixed::ZERO {
            return events;
        }

        // 1. Movement & aim
        self.run_unit_movement(dt);
        self.run_trigger_zones();
        self.run_targeting(dt);
        let resolved = self.run_projectile_movement(dt);

        // 2. Damage
        self.run_projectile_impacts(&resolved, &mut events);
        self.run_turret_fire(dt);
        let expired = self.run_base_attacks(dt);

        // 3. Death cleanup
        let bounties = self.run_death_cleanup(&expired, &mut events);

        // 4. Economy
        for bounty in bounties {
            self.world.ledger.grant(bounty, &mut self.bus);
        }

        if !self.is_defense_failed() {
            // 5. Arrivals
            self.commit_arrivals(&mut events);

            // 6. Scheduler
            let spawns = self.world.scheduler.tick(dt, &mut self.bus);
            events.spawned = self.spawn_units(&spawns);
        }

        self.world.tick += 1;
        self.world.elapsed += dt;
        events.tick = self.world.tick;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.world.tick, state_hash = hash, "Simulation state hash");
        }

        #[cfg(feature = "debug-validation")]
        self.check_invariants();

        events.events = self.flush_events();
        events
    }

    #[cfg(feature = "debug-validation")]
    fn check_invariants(&self) {
        let world = &self.world;
        debug_assert!(world.ledger.balance() >= 0, "negative balance");
        let base = &world.base;
        debug_assert!(
            (0..=base.max()).contains(&base.current()),
            "base health out of bounds"
        );
        for turret in world.turrets.sorted() {
            for id in turret.targets().ids() {
                debug_assert!(
                    world.units.contains(*id),
                    "turret {} holds removed unit {id}",
                    turret.id
                );
            }
        }
        for site in &world.sites {
            for id in site.occupants() {
                debug_assert!(world.turrets.contains(*id), "site holds removed turret {id}");
            }
        }
    }

    fn run_unit_movement(&mut self, dt: Fixed) {
        let units = &mut self.world.units;
        for id in units.sorted_ids() {
            if let Some(unit) = units.get_mut(id) {
                unit.tick_slow(dt);
                if unit.advance(dt) {
                    tracing::debug!(unit = id, "Unit finished path");
                }
            }
        }
    }

    /// Diff each zone-fed turret's membership against its range.
    fn run_trigger_zones(&mut self) {
        let World { turrets, units, .. } = &mut self.world;
        let unit_ids = units.sorted_ids();
        for turret_id in turrets.sorted_ids() {
            let Some(turret) = turrets.get_mut(turret_id) else {
                continue;
            };
            if turret.acquisition() != TargetAcquisition::ZoneFeed {
                continue;
            }
            let members: Vec<EntityId> = turret.zone_members().collect();
            for id in members {
                let inside = units
                    .get(id)
                    .is_some_and(|u| u.is_targetable() && turret.in_range(u.position));
                if !inside {
                    turret.zone_exit(id);
                }
            }
            for &id in &unit_ids {
                let inside = units
                    .get(id)
                    .is_some_and(|u| u.is_targetable() && turret.in_range(u.position));
                if inside {
                    turret.zone_enter(id);
                }
            }
        }
    }

    fn run_targeting(&mut self, dt: Fixed) {
        let World {
            turrets,
            units,
            rng,
            ..
        } = &mut self.world;
        let unit_ids = units.sorted_ids();

        for turret_id in turrets.sorted_ids() {
            let Some(turret) = turrets.get_mut(turret_id) else {
                continue;
            };

            let pool: Vec<EntityId> = match turret.acquisition() {
                TargetAcquisition::RadiusScan => unit_ids
                    .iter()
                    .copied()
                    .filter(|&id| {
                        units
                            .get(id)
                            .is_some_and(|u| u.is_targetable() && turret.in_range(u.position))
                    })
                    .collect(),
                TargetAcquisition::ZoneFeed => turret
                    .zone_members()
                    .filter(|&id| units.get(id).is_some_and(Unit::is_targetable))
                    .collect(),
            };

            let candidates: Vec<CandidateInfo> = pool
                .into_iter()
                .filter_map(|id| {
                    units.get(id).map(|u| CandidateInfo {
                        id,
                        distance_sq: turret.position.distance_squared(u.position),
                        health: Some(u.health().current),
                    })
                })
                .collect();

            turret.refresh_targets(candidates, &mut *rng);

            let aim_point = turret
                .targets()
                .first()
                .and_then(|id| units.get(id))
                .map(|u| u.position);
            turret.aim(aim_point, dt);
        }
    }

    fn run_projectile_movement(&mut self, dt: Fixed) -> Vec<(EntityId, ProjectileStep)> {
        let World {
            projectiles, units, ..
        } = &mut self.world;
        let mut resolved = Vec::new();

        for id in projectiles.sorted_ids() {
            let Some(projectile) = projectiles.get_mut(id) else {
                continue;
            };
            let goal = units
                .get(projectile.target)
                .filter(|u| u.is_targetable())
                .map(|u| u.position);
            match projectile.step(goal, dt) {
                ProjectileStep::InFlight => {}
                step => resolved.push((id, step)),
            }
        }
        resolved
    }

    fn run_projectile_impacts(
        &mut self,
        resolved: &[(EntityId, ProjectileStep)],
        events: &mut TickEvents,
    ) {
        for &(id, step) in resolved {
            let Some(projectile) = self.world.projectiles.remove(id) else {
                continue;
            };
            let outcome = match step {
                ProjectileStep::Contact => self.world.units.get_mut(projectile.target).and_then(
                    |unit| {
                        let outcome = unit.take_damage(projectile.damage, &mut self.bus)?;
                        if let Some(slow) = projectile.slow {
                            unit.apply_slow(slow);
                        }
                        Some(outcome)
                    },
                ),
                ProjectileStep::InFlight | ProjectileStep::Fizzled => None,
            };

            match outcome {
                Some(outcome) => {
                    self.bus.emit(SimEvent::ProjectileHit {
                        projectile: id,
                        target: projectile.target,
                        damage: outcome.dealt,
                    });
                    events.damage_events.push(DamageEvent {
                        source: projectile.source,
                        target: projectile.target,
                        damage: outcome.dealt,
                    });
                }
                None => {
                    self.bus
                        .emit(SimEvent::ProjectileFizzled { projectile: id });
                }
            }
            self.bus.release_entity(id);
        }
    }

    fn run_turret_fire(&mut self, dt: Fixed) {
        let World {
            turrets,
            units,
            projectiles,
            next_id,
            ..
        } = &mut self.world;

        for turret_id in turrets.sorted_ids() {
            let Some(turret) = turrets.get_mut(turret_id) else {
                continue;
            };
            let Some(volley) = turret.tick_fire(dt) else {
                continue;
            };

            for target in volley.targets {
                if !units.get(target).is_some_and(Unit::is_targetable) {
                    continue;
                }
                let id = *next_id;
                *next_id += 1;
                projectiles.insert(
                    id,
                    Projectile {
                        id,
                        source: turret_id,
                        target,
                        position: turret.position,
                        speed: turret.projectile_speed(),
                        damage: volley.damage,
                        slow: volley.slow,
                    },
                );
                self.bus.emit(SimEvent::ProjectileFired {
                    projectile: id,
                    turret: turret_id,
                    target,
                });
            }
        }
    }

    /// Strike the base. Returns units whose strike allowance ran out.
    fn run_base_attacks(&mut self, dt: Fixed) -> Vec<EntityId> {
        let World {
            units,
            base,
            base_attackers,
            ..
        } = &mut self.world;
        let mut expired = Vec::new();

        for id in units.sorted_ids() {
            let Some(unit) = units.get_mut(id) else {
                continue;
            };
            let made_before = unit.attacks_made();
            let strikes = unit.tick_base_attack(dt);
            let allowed = match *base_attackers {
                BaseAttackerPolicy::Persistent => strikes,
                BaseAttackerPolicy::Expire { attacks } => {
                    strikes.min(attacks.saturating_sub(made_before))
                }
            };
            for _ in 0..allowed {
                base.take_damage(unit.attack_damage(), &mut self.bus);
            }
            if let BaseAttackerPolicy::Expire { attacks } = *base_attackers {
                if unit.is_attacking_base() && unit.attacks_made() >= attacks {
                    expired.push(id);
                }
            }
        }
        expired
    }

    /// Remove dead and expired units. Returns bounties to credit.
    fn run_death_cleanup(&mut self, expired: &[EntityId], events: &mut TickEvents) -> Vec<i32> {
        let mut bounties = Vec::new();
        for id in self.world.units.sorted_ids() {
            let dead = self.world.units.get(id).is_some_and(Unit::is_dead);
            if dead {
                if let Some(bounty) = self.remove_dead_unit(id) {
                    bounties.push(bounty);
                    events.deaths.push(id);
                }
            } else if expired.contains(&id) {
                self.remove_unit(id);
                self.bus.emit(SimEvent::UnitDespawned { unit: id });
            }
        }
        bounties
    }

    fn remove_dead_unit(&mut self, id: EntityId) -> Option<i32> {
        let unit = self.remove_unit(id)?;
        let bounty = unit.bounty().max(0);
        tracing::debug!(unit = id, kind = %unit.kind, bounty, "Unit died");
        self.bus.emit(SimEvent::UnitDied { unit: id, bounty });
        Some(bounty)
    }

    /// Drop a unit and everything that refers to it.
    fn remove_unit(&mut self, id: EntityId) -> Option<Unit> {
        let unit = self.world.units.remove(id)?;
        for turret_id in self.world.turrets.sorted_ids() {
            if let Some(turret) = self.world.turrets.get_mut(turret_id) {
                turret.forget(id);
            }
        }
        self.bus.release_entity(id);
        Some(unit)
    }

    fn commit_arrivals(&mut self, events: &mut TickEvents) {
        let World { units, turrets, .. } = &mut self.world;
        for id in units.sorted_ids() {
            let Some(unit) = units.get_mut(id) else {
                continue;
            };
            if !unit.has_finished_path() || unit.is_attacking_base() {
                continue;
            }
            unit.begin_base_attack();
            for turret_id in turrets.sorted_ids() {
                if let Some(turret) = turrets.get_mut(turret_id) {
                    turret.forget(id);
                }
            }
            tracing::debug!(unit = id, "Unit reached the base");
            self.bus.emit(SimEvent::UnitReachedBase { unit: id });
            events.arrivals.push(id);
        }
    }

    fn spawn_units(&mut self, kinds: &[UnitKind]) -> Vec<EntityId> {
        let mut spawned = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let Some(data) = self.world.catalog.unit(kind).cloned() else {
                tracing::warn!(%kind, "Wave references a unit missing from the catalog");
                continue;
            };
            if self.world.spawn_points.is_empty() {
                continue;
            }
            let point = self.world.rng.gen_range(0..self.world.spawn_points.len());
            let position = self.world.spawn_points[point];
            let id = self.world.allocate_id();
            let unit = Unit::spawn(id, &data, position, self.world.path.clone());
            self.world.units.insert(id, unit);
            self.bus.emit(SimEvent::UnitSpawned {
                unit: id,
                kind,
                spawn_point: point,
            });
            spawned.push(id);
        }
        spawned
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Build a turret on a site.
    ///
    /// # Errors
    ///
    /// Unknown site, unknown tier, site at capacity (checked before
    /// funds), or insufficient funds. Nothing changes on error.
    pub fn construct(
        &mut self,
        kind: TurretKind,
        site_id: SiteId,
    ) -> std::result::Result<EntityId, PlacementError> {
        let site_index = usize::try_from(site_id).unwrap_or(usize::MAX);
        let data = self.world.catalog.turret(kind).cloned();
        let cost = check_placement(
            site_id,
            self.world.sites.get(site_index),
            data.as_ref(),
            kind,
            &self.world.ledger,
        )
        .map_err(|err| {
            tracing::warn!(%kind, site = site_id, error = %err, "Construction rejected");
            err
        })?;
        let Some(data) = data else {
            return Err(PlacementError::UnknownTurretType(kind));
        };

        if cost > 0 && !self.world.ledger.try_spend(cost, &mut self.bus) {
            return Err(PlacementError::InsufficientFunds {
                cost,
                balance: self.world.ledger.balance(),
            });
        }

        let id = self.world.allocate_id();
        let Some(site) = self.world.sites.get_mut(site_index) else {
            return Err(PlacementError::UnknownSite(site_id));
        };
        site.occupy(id);
        let turret = Turret::build(id, &data, site_id, site.position);
        self.world.turrets.insert(id, turret);

        tracing::info!(turret = id, %kind, site = site_id, cost, "Turret constructed");
        self.bus.emit(SimEvent::TurretConstructed {
            turret: id,
            kind,
            site: site_id,
        });
        self.dispatch_command();
        Ok(id)
    }

    /// Upgrade a turret by one level.
    ///
    /// # Errors
    ///
    /// Unknown turret, max level (checked before funds), or insufficient
    /// funds. Nothing changes on error.
    pub fn upgrade(&mut self, turret_id: EntityId) -> std::result::Result<u8, UpgradeError> {
        let turret = self.world.turrets.get(turret_id);
        let data = turret.and_then(|t| self.world.catalog.turret(t.kind)).cloned();
        let cost = check_upgrade(turret_id, turret, data.as_ref(), &self.world.ledger).map_err(
            |err| {
                tracing::warn!(turret = turret_id, error = %err, "Upgrade rejected");
                err
            },
        )?;
        let damage_per_level = data.map_or(0, |d| d.damage_per_level);

        if cost > 0 && !self.world.ledger.try_spend(cost, &mut self.bus) {
            return Err(UpgradeError::InsufficientFunds {
                cost,
                balance: self.world.ledger.balance(),
            });
        }
        let Some(turret) = self.world.turrets.get_mut(turret_id) else {
            return Err(UpgradeError::UnknownTurret(turret_id));
        };
        turret.apply_upgrade(damage_per_level);
        let level = turret.level();

        tracing::info!(turret = turret_id, level, cost, "Turret upgraded");
        self.bus.emit(SimEvent::TurretUpgraded {
            turret: turret_id,
            level,
        });
        self.dispatch_command();
        Ok(level)
    }

    /// Demolish a turret and free its site. Returns `false` for unknown ids.
    pub fn destroy_turret(&mut self, turret_id: EntityId) -> bool {
        let Some(turret) = self.world.turrets.remove(turret_id) else {
            return false;
        };
        if let Some(site) = self
            .world
            .sites
            .get_mut(usize::try_from(turret.site).unwrap_or(usize::MAX))
        {
            site.vacate(turret_id);
        }
        tracing::info!(turret = turret_id, site = turret.site, "Turret destroyed");
        self.bus.emit(SimEvent::TurretDestroyed {
            turret: turret_id,
            site: turret.site,
        });
        self.dispatch_command();
        self.bus.release_entity(turret_id);
        true
    }

    /// Change a turret's targeting policy. Returns `false` for unknown ids.
    pub fn set_targeting(&mut self, turret_id: EntityId, policy: TargetingPolicy) -> bool {
        match self.world.turrets.get_mut(turret_id) {
            Some(turret) => {
                turret.set_targeting(policy);
                true
            }
            None => false,
        }
    }

    /// Remove a unit without death or bounty. Returns `false` for unknown ids.
    pub fn despawn_unit(&mut self, unit_id: EntityId) -> bool {
        if self.remove_unit(unit_id).is_none() {
            return false;
        }
        self.bus.emit(SimEvent::UnitDespawned { unit: unit_id });
        self.dispatch_command();
        true
    }

    /// Apply damage to a unit from outside the turret pipeline.
    ///
    /// A lethal hit removes the unit and credits its bounty at once.
    /// Returns `None` for unknown or untargetable units.
    pub fn damage_unit(&mut self, unit_id: EntityId, amount: i32) -> Option<DamageOutcome> {
        let outcome = self
            .world
            .units
            .get_mut(unit_id)?
            .take_damage(amount, &mut self.bus)?;
        if outcome.lethal {
            if let Some(bounty) = self.remove_dead_unit(unit_id) {
                self.world.ledger.grant(bounty, &mut self.bus);
            }
        }
        self.dispatch_command();
        Some(outcome)
    }

    /// Slow a unit from outside the turret pipeline.
    pub fn slow_unit(&mut self, unit_id: EntityId, slow: SlowSpec) -> bool {
        self.world
            .units
            .get_mut(unit_id)
            .is_some_and(|unit| unit.apply_slow(slow))
    }

    /// Begin the first wave if the scheduler is idle.
    pub fn start_waves(&mut self) -> Vec<EntityId> {
        let spawns = self.world.scheduler.start(&mut self.bus);
        let spawned = self.spawn_units(&spawns);
        self.dispatch_command();
        spawned
    }

    /// Skip the countdown for a bonus of whole seconds remaining times
    /// the bonus rate. Returns the bonus, or `None` outside a countdown.
    pub fn request_early_wave(&mut self) -> Option<i32> {
        let Some(early) = self.world.scheduler.request_early_wave(&mut self.bus) else {
            tracing::warn!("Early wave requested outside countdown");
            return None;
        };
        self.world.ledger.grant(early.bonus, &mut self.bus);
        self.spawn_units(&early.spawns);
        self.dispatch_command();
        Some(early.bonus)
    }

    /// Start the next wave now, cancelling any countdown or spawn sequence.
    /// Returns `false` if no wave remains.
    pub fn trigger_next_wave(&mut self) -> bool {
        let before = self.world.scheduler.current_wave();
        let spawns = self.world.scheduler.trigger_next_wave(&mut self.bus);
        self.spawn_units(&spawns);
        self.dispatch_command();
        self.world.scheduler.current_wave() != before
    }

    /// A unit entered a zone-fed turret's trigger volume.
    pub fn notify_zone_enter(&mut self, turret_id: EntityId, unit_id: EntityId) -> bool {
        if !self
            .world
            .units
            .get(unit_id)
            .is_some_and(Unit::is_targetable)
        {
            return false;
        }
        self.world
            .turrets
            .get_mut(turret_id)
            .is_some_and(|turret| turret.zone_enter(unit_id))
    }

    /// A unit left a zone-fed turret's trigger volume.
    pub fn notify_zone_exit(&mut self, turret_id: EntityId, unit_id: EntityId) -> bool {
        self.world
            .turrets
            .get_mut(turret_id)
            .is_some_and(|turret| turret.zone_exit(unit_id))
    }

    /// Restore the base to full health and lift the defense-failed freeze.
    pub fn reset_base(&mut self) {
        self.world.base.reset(&mut self.bus);
        self.dispatch_command();
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Calculate a hash of the current simulation state.
    ///
    /// Two simulations with identical state will produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        let world = &self.world;

        world.tick.hash(&mut hasher);
        world.elapsed.to_bits().hash(&mut hasher);
        world.next_id.hash(&mut hasher);
        world.ledger.hash(&mut hasher);
        world.base.hash(&mut hasher);
        world.scheduler.hash(&mut hasher);
        world.units.hash_into(&mut hasher);
        world.turrets.hash_into(&mut hasher);
        world.projectiles.hash_into(&mut hasher);
        world.sites.hash(&mut hasher);
        world.rng.get_seed().hash(&mut hasher);
        world.rng.get_word_pos().hash(&mut hasher);

        hasher.finish()
    }

    /// Serialize the simulation state.
    ///
    /// Subscriptions are not part of the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.world)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Replace the simulation state with a snapshot, keeping subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails; the state is untouched.
    pub fn restore(&mut self, data: &[u8]) -> Result<()> {
        let world = bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {e}"))
        })?;
        self.world = world;
        self.dispatch_command();
        Ok(())
    }

    /// Build a simulation from a snapshot, with no subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_snapshot(data: &[u8]) -> Result<Self> {
        let world = bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {e}"))
        })?;
        Ok(Self {
            world,
            bus: EventBus::new(),
            delivered: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::data::{
        EnemyGroup, PointData, SchedulerSettings, SiteData, SpawnPointData, WaveData,
    };

    /// One spawn point at the origin, a straight path north, one site next
    /// to the path, and no auto start.
    fn config(waves: Vec<WaveData>) -> EncounterConfig {
        EncounterConfig {
            name: "test".to_string(),
            seed: 1,
            starting_gold: 100,
            base_health: 100,
            spawn_points: vec![SpawnPointData {
                name: "origin".to_string(),
                position: PointData::from_ints(0, 0),
            }],
            path: vec![PointData::from_ints(0, 20)],
            sites: vec![SiteData {
                name: "side".to_string(),
                position: PointData::from_ints(3, 10),
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

    fn one_wave(kind: UnitKind, count: u32) -> Vec<WaveData> {
        vec![WaveData {
            groups: vec![EnemyGroup { kind, count }],
            spawn_rate: Fixed::ONE,
        }]
    }

    fn recorder(sim: &mut Simulation) -> Arc<Mutex<Vec<SimEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.subscribe_all(move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut bad = config(vec![]);
        bad.path.clear();
        assert!(matches!(
            Simulation::new(&bad),
            Err(GameError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_start_spawns_first_unit() {
        let mut sim = Simulation::new(&config(one_wave(UnitKind::Standard, 2))).unwrap();
        assert!(sim.units().is_empty());

        let spawned = sim.start_waves();
        assert_eq!(spawned.len(), 1);
        assert_eq!(sim.current_wave(), 1);
        assert_eq!(sim.unit(spawned[0]).unwrap().position, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_tick_increments() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        let events = sim.tick(Fixed::ONE);
        assert_eq!(events.tick, 1);
        assert_eq!(sim.get_tick(), 1);
        assert_eq!(sim.elapsed(), Fixed::ONE);
    }

    #[test]
    fn test_negative_dt_is_ignored() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        sim.tick(Fixed::from_num(-1));
        assert_eq!(sim.get_tick(), 0);
    }

    #[test]
    fn test_wide_map_ticks_without_overflow() {
        let mut cfg = config(one_wave(UnitKind::Standard, 1));
        cfg.path = vec![PointData::from_ints(50_000, 0)];
        let mut sim = Simulation::new(&cfg).unwrap();
        sim.construct(TurretKind::LongRange, 0).unwrap();
        let unit = sim.start_waves()[0];

        sim.tick(Fixed::ONE);
        let position = sim.unit(unit).unwrap().position;
        let epsilon = Fixed::ONE / Fixed::from_num(10000);
        assert!((position.x - Fixed::from_num(5)).abs() < epsilon);
        assert_eq!(position.y, Fixed::ZERO);
    }

    #[test]
    fn test_construct_spends_and_occupies() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();
        assert_eq!(sim.balance(), 50);
        assert_eq!(sim.sites()[0].occupants(), &[turret]);

        let again = sim.construct(TurretKind::Basic, 0);
        assert_eq!(again, Err(PlacementError::SiteUnavailable(0)));
        assert_eq!(sim.balance(), 50);
    }

    #[test]
    fn test_command_events_reach_flush_once() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        sim.construct(TurretKind::Basic, 0).unwrap();

        let flushed = sim.flush_events();
        assert!(flushed.contains(&SimEvent::GoldSpent { amount: 50 }));
        assert!(sim.flush_events().is_empty());

        let events = sim.tick(Fixed::ONE);
        assert!(!events.events.contains(&SimEvent::GoldSpent { amount: 50 }));
    }

    #[test]
    fn test_command_events_lead_next_tick() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();
        assert!(sim.destroy_turret(turret));

        let events = sim.tick(Fixed::ONE);
        let spent = events
            .events
            .iter()
            .position(|e| *e == SimEvent::GoldSpent { amount: 50 });
        assert_eq!(spent, Some(0));
        assert!(sim.tick(Fixed::ONE).events.is_empty());
    }

    #[test]
    fn test_destroy_turret_frees_site() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();
        assert!(sim.destroy_turret(turret));
        assert!(sim.sites()[0].occupants().is_empty());
        assert!(!sim.destroy_turret(turret));
        assert!(sim.construct(TurretKind::Slow, 0).is_ok());
    }

    #[test]
    fn test_upgrade_spends_and_raises_damage() {
        let mut cfg = config(vec![]);
        cfg.starting_gold = 200;
        let mut sim = Simulation::new(&cfg).unwrap();
        let turret = sim.construct(TurretKind::Basic, 0).unwrap();

        assert_eq!(sim.upgrade(turret), Ok(1));
        assert_eq!(sim.balance(), 110);
        assert_eq!(sim.turret(turret).unwrap().damage(), 15);

        assert_eq!(sim.upgrade(turret), Ok(2));
        assert_eq!(
            sim.upgrade(turret),
            Err(UpgradeError::MaxLevelReached { turret, level: 2 })
        );
        assert_eq!(sim.upgrade(999), Err(UpgradeError::UnknownTurret(999)));
    }

    #[test]
    fn test_turret_kills_unit_and_bounty_credited_once() {
        let mut cfg = config(one_wave(UnitKind::Fast, 1));
        for turret in &mut cfg.catalog.turrets {
            if turret.kind == TurretKind::ShortRange {
                turret.damage = 60;
            }
        }
        let mut sim = Simulation::new(&cfg).unwrap();
        sim.construct(TurretKind::ShortRange, 0).unwrap();
        let seen = recorder(&mut sim);
        sim.start_waves();

        for _ in 0..20 {
            sim.tick(Fixed::from_num(0.25));
        }

        let deaths: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SimEvent::UnitDied { bounty, .. } => Some(*bounty),
                _ => None,
            })
            .collect();
        assert_eq!(deaths, vec![8]);
        assert_eq!(sim.balance(), 58);
        assert!(sim.units().is_empty());
    }

    #[test]
    fn test_external_damage_three_hits() {
        let mut sim = Simulation::new(&config(one_wave(UnitKind::Standard, 1))).unwrap();
        let unit = sim.start_waves()[0];

        assert_eq!(sim.damage_unit(unit, 40).map(|o| o.health.current), Some(60));
        assert_eq!(sim.damage_unit(unit, 40).map(|o| o.health.current), Some(20));
        assert!(sim.damage_unit(unit, 40).is_some_and(|o| o.lethal));
        assert!(sim.unit(unit).is_none());
        assert_eq!(sim.balance(), 110);
        assert!(sim.damage_unit(unit, 40).is_none());
        assert_eq!(sim.balance(), 110);
    }

    #[test]
    fn test_unit_reaches_base_and_attacks() {
        let mut cfg = config(one_wave(UnitKind::Standard, 1));
        cfg.path = vec![PointData::from_ints(0, 5)];
        let mut sim = Simulation::new(&cfg).unwrap();
        let unit = sim.start_waves()[0];

        let events = sim.tick(Fixed::ONE);
        assert_eq!(events.arrivals, vec![unit]);
        assert_eq!(sim.base_health().current(), 100);

        sim.tick(Fixed::ONE);
        assert_eq!(sim.base_health().current(), 90);
        sim.tick(Fixed::ONE);
        assert_eq!(sim.base_health().current(), 80);
        assert!(sim.unit(unit).is_some());
    }

    #[test]
    fn test_expiring_attackers_are_removed_without_bounty() {
        let mut cfg = config(one_wave(UnitKind::Standard, 1));
        cfg.path = vec![PointData::from_ints(0, 5)];
        cfg.base_attackers = BaseAttackerPolicy::Expire { attacks: 2 };
        let mut sim = Simulation::new(&cfg).unwrap();
        let unit = sim.start_waves()[0];

        for _ in 0..4 {
            sim.tick(Fixed::ONE);
        }
        assert!(sim.unit(unit).is_none());
        assert_eq!(sim.base_health().current(), 80);
        assert_eq!(sim.balance(), 100);
    }

    #[test]
    fn test_defense_failure_freezes_simulation() {
        let mut cfg = config(one_wave(UnitKind::Boss, 1));
        cfg.path = vec![PointData::from_ints(0, 2)];
        let mut sim = Simulation::new(&cfg).unwrap();
        let seen = recorder(&mut sim);
        sim.start_waves();

        sim.tick(Fixed::ONE);
        sim.tick(Fixed::ONE);
        assert!(sim.is_defense_failed());

        let hash = sim.state_hash();
        let events = sim.tick(Fixed::ONE);
        assert!(events.events.is_empty());
        assert_eq!(sim.state_hash(), hash);
        assert!(seen.lock().unwrap().contains(&SimEvent::DefenseFailed));

        sim.reset_base();
        assert!(!sim.is_defense_failed());
        assert_eq!(sim.base_health().current(), 100);
    }

    #[test]
    fn test_early_wave_outside_countdown_is_noop() {
        let mut sim = Simulation::new(&config(one_wave(UnitKind::Standard, 3))).unwrap();
        assert_eq!(sim.request_early_wave(), None);
        sim.start_waves();
        assert_eq!(sim.request_early_wave(), None);
        assert_eq!(sim.balance(), 100);
    }

    #[test]
    fn test_entity_subscription_released_on_death() {
        let mut sim = Simulation::new(&config(one_wave(UnitKind::Standard, 1))).unwrap();
        let unit = sim.start_waves()[0];
        sim.subscribe_entity(unit, EventKind::UnitHealthChanged, |_| {});
        assert_eq!(sim.subscription_count(), 1);

        sim.damage_unit(unit, 1000);
        assert_eq!(sim.subscription_count(), 0);
    }

    #[test]
    fn test_despawn_grants_nothing() {
        let mut sim = Simulation::new(&config(one_wave(UnitKind::Standard, 1))).unwrap();
        let unit = sim.start_waves()[0];
        assert!(sim.despawn_unit(unit));
        assert!(!sim.despawn_unit(unit));
        assert_eq!(sim.balance(), 100);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut sim = Simulation::new(&config(one_wave(UnitKind::Standard, 3))).unwrap();
        sim.construct(TurretKind::Basic, 0).unwrap();
        sim.start_waves();
        for _ in 0..4 {
            sim.tick(Fixed::from_num(0.5));
        }

        let bytes = sim.snapshot().unwrap();
        let mut restored = Simulation::from_snapshot(&bytes).unwrap();
        assert_eq!(restored.state_hash(), sim.state_hash());

        for _ in 0..4 {
            sim.tick(Fixed::from_num(0.5));
            restored.tick(Fixed::from_num(0.5));
        }
        assert_eq!(restored.state_hash(), sim.state_hash());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let mut sim = Simulation::new(&config(vec![])).unwrap();
        let hash = sim.state_hash();
        assert!(sim.restore(&[1, 2, 3]).is_err());
        assert_eq!(sim.state_hash(), hash);
    }
}
