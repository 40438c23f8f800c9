//! Enemy units.
//!
//! A unit walks its waypoint path one step per tick, then turns into a
//! base attacker. The transition is one-way:
//!
//! ```text
//! Advancing --(passed last waypoint)--> AttackingBase
//! ```
//!
//! Base attackers are out of play for turrets: they cannot be targeted or
//! damaged.

use serde::{Deserialize, Serialize};

use crate::combat::{calculate_damage, DamageOutcome};
use crate::components::{EntityId, Health, SlowEffect, SlowSpec};
use crate::data::{UnitData, UnitKind};
use crate::events::{EventBus, SimEvent};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Distance at which a waypoint counts as reached.
pub fn waypoint_epsilon() -> Fixed {
    Fixed::from_num(0.1)
}

/// Seconds between strikes against the base.
pub const BASE_ATTACK_INTERVAL: i32 = 1;

/// Movement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    /// Following the path.
    Advancing,
    /// Parked at the end of the path, striking the base periodically.
    AttackingBase {
        /// Seconds until the next strike.
        #[serde(with = "fixed_serde")]
        cooldown: Fixed,
        /// Strikes delivered so far.
        attacks_made: u32,
    },
}

/// An enemy on the field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Entity id.
    pub id: EntityId,
    /// Tier.
    pub kind: UnitKind,
    /// World position.
    pub position: Vec2Fixed,
    /// Unit facing, pointing at the current waypoint.
    pub facing: Vec2Fixed,
    health: Health,
    defense: i32,
    #[serde(with = "fixed_serde")]
    base_speed: Fixed,
    attack_damage: i32,
    bounty: i32,
    waypoints: Vec<Vec2Fixed>,
    waypoint_index: usize,
    slow: Option<SlowEffect>,
    state: UnitState,
    path_finished: bool,
}

impl Unit {
    /// Create a unit at `position` heading for the first of `waypoints`.
    #[must_use]
    pub fn spawn(
        id: EntityId,
        data: &UnitData,
        position: Vec2Fixed,
        waypoints: Vec<Vec2Fixed>,
    ) -> Self {
        let facing = waypoints
            .first()
            .map(|&w| (w - position).normalize())
            .filter(|f| *f != Vec2Fixed::ZERO)
            .unwrap_or(Vec2Fixed::FORWARD);
        Self {
            id,
            kind: data.kind,
            position,
            facing,
            health: Health::new(data.health),
            defense: data.defense,
            base_speed: data.speed,
            attack_damage: data.attack_damage,
            bounty: data.bounty,
            waypoints,
            waypoint_index: 0,
            slow: None,
            state: UnitState::Advancing,
            path_finished: false,
        }
    }

    /// Current and maximum health.
    #[must_use]
    pub const fn health(&self) -> Health {
        self.health
    }

    /// Flat damage reduction.
    #[must_use]
    pub const fn defense(&self) -> i32 {
        self.defense
    }

    /// Damage per base strike.
    #[must_use]
    pub const fn attack_damage(&self) -> i32 {
        self.attack_damage
    }

    /// Currency granted on death.
    #[must_use]
    pub const fn bounty(&self) -> i32 {
        self.bounty
    }

    /// Movement state.
    #[must_use]
    pub const fn state(&self) -> UnitState {
        self.state
    }

    /// Index of the waypoint being walked to.
    #[must_use]
    pub const fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    /// Active slow, if any.
    #[must_use]
    pub const fn slow(&self) -> Option<SlowEffect> {
        self.slow
    }

    /// Speed captured at creation.
    #[must_use]
    pub const fn base_speed(&self) -> Fixed {
        self.base_speed
    }

    /// Speed after the active slow.
    #[must_use]
    pub fn effective_speed(&self) -> Fixed {
        match self.slow {
            Some(slow) => self.base_speed * (Fixed::ONE - slow.factor),
            None => self.base_speed,
        }
    }

    /// Health at or below zero.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.health.is_dead()
    }

    /// Whether the unit passed its last waypoint this tick and is waiting
    /// for the arrival to be committed.
    #[must_use]
    pub const fn has_finished_path(&self) -> bool {
        self.path_finished
    }

    /// Whether the unit is attacking the base.
    #[must_use]
    pub const fn is_attacking_base(&self) -> bool {
        matches!(self.state, UnitState::AttackingBase { .. })
    }

    /// Alive and still on the path.
    #[must_use]
    pub const fn is_targetable(&self) -> bool {
        !self.is_dead() && matches!(self.state, UnitState::Advancing)
    }

    /// Apply a hit.
    ///
    /// No-op for dead or base-attacking units. Emits
    /// [`SimEvent::UnitHealthChanged`] whether or not the hit is lethal;
    /// removal and bounty are the caller's job.
    pub fn take_damage(&mut self, amount: i32, bus: &mut EventBus) -> Option<DamageOutcome> {
        if !self.is_targetable() {
            return None;
        }
        let dealt = calculate_damage(amount, self.defense);
        self.health.apply_damage(dealt);
        bus.emit(SimEvent::UnitHealthChanged {
            unit: self.id,
            current: self.health.current,
            max: self.health.max,
        });
        Some(DamageOutcome {
            dealt,
            health: self.health,
            lethal: self.health.is_dead(),
        })
    }

    /// Start a slow, replacing any running one.
    ///
    /// Invalid descriptors are ignored.
    pub fn apply_slow(&mut self, spec: SlowSpec) -> bool {
        if !spec.is_valid() || !self.is_targetable() {
            return false;
        }
        self.slow = Some(SlowEffect {
            factor: spec.factor,
            remaining: spec.duration,
        });
        true
    }

    /// Count down the active slow.
    pub fn tick_slow(&mut self, dt: Fixed) {
        if let Some(slow) = self.slow.as_mut() {
            slow.remaining -= dt;
            if slow.remaining <= Fixed::ZERO {
                self.slow = None;
            }
        }
    }

    /// Walk one step along the path.
    ///
    /// Returns `true` on the tick the last waypoint is passed. The unit
    /// stays `Advancing` until [`Unit::begin_base_attack`] is called.
    pub fn advance(&mut self, dt: Fixed) -> bool {
        if !matches!(self.state, UnitState::Advancing) || self.path_finished {
            return false;
        }
        let Some(&target) = self.waypoints.get(self.waypoint_index) else {
            self.path_finished = true;
            return true;
        };

        self.position = self
            .position
            .move_towards(target, self.effective_speed() * dt);

        let epsilon = waypoint_epsilon();
        if self.position.distance_squared(target) > epsilon * epsilon {
            return false;
        }

        self.waypoint_index += 1;
        match self.waypoints.get(self.waypoint_index) {
            Some(&next) => {
                let heading = (next - self.position).normalize();
                if heading != Vec2Fixed::ZERO {
                    self.facing = heading;
                }
                false
            }
            None => {
                self.path_finished = true;
                true
            }
        }
    }

    /// Commit the arrival: stop pathing and start striking the base.
    ///
    /// The first strike lands on the next [`Unit::tick_base_attack`].
    pub fn begin_base_attack(&mut self) {
        if matches!(self.state, UnitState::Advancing) {
            self.state = UnitState::AttackingBase {
                cooldown: Fixed::ZERO,
                attacks_made: 0,
            };
            self.slow = None;
        }
    }

    /// Advance the strike timer. Returns how many strikes land this tick.
    pub fn tick_base_attack(&mut self, dt: Fixed) -> u32 {
        let UnitState::AttackingBase {
            cooldown,
            attacks_made,
        } = &mut self.state
        else {
            return 0;
        };
        let interval = Fixed::from_num(BASE_ATTACK_INTERVAL);
        let mut strikes = 0;
        while *cooldown <= Fixed::ZERO {
            strikes += 1;
            *cooldown += interval;
        }
        *cooldown -= dt;
        *attacks_made = attacks_made.saturating_add(strikes);
        strikes
    }

    /// Strikes delivered while attacking the base.
    #[must_use]
    pub const fn attacks_made(&self) -> u32 {
        match self.state {
            UnitState::AttackingBase { attacks_made, .. } => attacks_made,
            UnitState::Advancing => 0,
        }
    }
}
