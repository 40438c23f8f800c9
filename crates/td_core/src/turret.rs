//! Stationary engagement units.
//!
//! A turret does three independent things each tick:
//!
//! 1. refreshes and ranks its candidate list ([`Turret::refresh_targets`]),
//! 2. turns its pivot toward the best candidate ([`Turret::aim`]),
//! 3. runs its fire loop ([`Turret::tick_fire`]).
//!
//! The fire loop does not wait for the pivot to line up.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::{EntityId, SiteId, SlowSpec};
use crate::data::{TurretData, TurretKind};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::targeting::{CandidateInfo, TargetAcquisition, TargetList, TargetingPolicy};

/// Fire loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FireState {
    /// No volley pending. The next candidate triggers an immediate volley.
    Idle,
    /// Waiting for the next volley.
    Cycling {
        /// Seconds until the next volley.
        #[serde(with = "fixed_serde")]
        cooldown: Fixed,
    },
}

/// A volley released by the fire loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volley {
    /// Targets snapshotted at the moment of firing, best first.
    pub targets: Vec<EntityId>,
    /// Damage per effect.
    pub damage: i32,
    /// Slow carried by each effect.
    pub slow: Option<SlowSpec>,
}

/// A built turret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turret {
    /// Entity id.
    pub id: EntityId,
    /// Tier.
    pub kind: TurretKind,
    /// Hosting site.
    pub site: SiteId,
    /// Anchor position.
    pub position: Vec2Fixed,
    /// Pivot facing (unit vector).
    pub facing: Vec2Fixed,
    #[serde(with = "fixed_serde")]
    range: Fixed,
    #[serde(with = "fixed_serde")]
    fire_interval: Fixed,
    damage: i32,
    max_targets: u8,
    slow: Option<SlowSpec>,
    level: u8,
    targeting: TargetingPolicy,
    acquisition: TargetAcquisition,
    #[serde(with = "fixed_serde")]
    turn_rate: Fixed,
    #[serde(with = "fixed_serde")]
    projectile_speed: Fixed,
    targets: TargetList,
    zone: BTreeSet<EntityId>,
    fire: FireState,
}

impl Turret {
    /// Create a level-0 turret from catalog stats.
    #[must_use]
    pub fn build(id: EntityId, data: &TurretData, site: SiteId, position: Vec2Fixed) -> Self {
        Self {
            id,
            kind: data.kind,
            site,
            position,
            facing: Vec2Fixed::FORWARD,
            range: data.range,
            fire_interval: data.fire_interval,
            damage: data.damage,
            max_targets: data.max_targets.max(1),
            slow: data.slow,
            level: 0,
            targeting: data.targeting,
            acquisition: data.acquisition,
            turn_rate: data.turn_rate,
            projectile_speed: data.projectile_speed,
            targets: TargetList::new(),
            zone: BTreeSet::new(),
            fire: FireState::Idle,
        }
    }

    /// Detection radius.
    #[must_use]
    pub const fn range(&self) -> Fixed {
        self.range
    }

    /// Whether `point` lies inside the detection radius.
    #[must_use]
    pub fn in_range(&self, point: Vec2Fixed) -> bool {
        self.position.distance_squared(point) <= self.range.saturating_mul(self.range)
    }

    /// Seconds between volleys.
    #[must_use]
    pub const fn fire_interval(&self) -> Fixed {
        self.fire_interval
    }

    /// Current damage per effect, including upgrades.
    #[must_use]
    pub const fn damage(&self) -> i32 {
        self.damage
    }

    /// Targets engaged per volley.
    #[must_use]
    pub const fn max_targets(&self) -> u8 {
        self.max_targets
    }

    /// Upgrade level, 0 at construction.
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    /// Candidate ordering.
    #[must_use]
    pub const fn targeting(&self) -> TargetingPolicy {
        self.targeting
    }

    /// Switch candidate ordering. Takes effect on the next refresh.
    pub fn set_targeting(&mut self, policy: TargetingPolicy) {
        self.targeting = policy;
    }

    /// Candidate discovery strategy.
    #[must_use]
    pub const fn acquisition(&self) -> TargetAcquisition {
        self.acquisition
    }

    /// Speed of fired projectiles.
    #[must_use]
    pub const fn projectile_speed(&self) -> Fixed {
        self.projectile_speed
    }

    /// Ranked candidates.
    #[must_use]
    pub const fn targets(&self) -> &TargetList {
        &self.targets
    }

    /// Fire loop state.
    #[must_use]
    pub const fn fire_state(&self) -> FireState {
        self.fire
    }

    /// Units currently inside the trigger zone, ascending by id.
    pub fn zone_members(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.zone.iter().copied()
    }

    /// A unit entered the trigger zone.
    pub fn zone_enter(&mut self, unit: EntityId) -> bool {
        self.zone.insert(unit)
    }

    /// A unit left the trigger zone.
    pub fn zone_exit(&mut self, unit: EntityId) -> bool {
        self.zone.remove(&unit)
    }

    /// Forget a unit entirely (destroyed or no longer targetable).
    pub fn forget(&mut self, unit: EntityId) {
        self.zone.remove(&unit);
        self.targets.remove(unit);
    }

    /// Re-rank candidates. `candidates` must already be purged of stale
    /// references. Returns `true` if the candidate set changed.
    pub fn refresh_targets<R: Rng + ?Sized>(
        &mut self,
        candidates: Vec<CandidateInfo>,
        rng: &mut R,
    ) -> bool {
        self.targets.refresh(candidates, self.targeting, rng)
    }

    /// Turn the pivot toward `target`, or back home when there is none,
    /// by at most `turn_rate * dt` radians.
    pub fn aim(&mut self, target: Option<Vec2Fixed>, dt: Fixed) {
        let desired = match target {
            Some(point) => (point - self.position).normalize(),
            None => Vec2Fixed::FORWARD,
        };
        if desired == Vec2Fixed::ZERO {
            return;
        }
        self.facing = self.facing.rotate_towards(desired, dt * self.turn_rate);
    }

    /// Advance the fire loop. Returns a volley when one is released.
    ///
    /// From `Idle` the first candidate fires at once. While cycling, the
    /// cooldown runs out even if the candidates vanish and return; on
    /// expiry an empty list ends the loop.
    pub fn tick_fire(&mut self, dt: Fixed) -> Option<Volley> {
        match self.fire {
            FireState::Idle => {
                if self.targets.is_empty() {
                    return None;
                }
                self.fire = FireState::Cycling {
                    cooldown: self.fire_interval,
                };
                Some(self.volley())
            }
            FireState::Cycling { cooldown } => {
                let cooldown = cooldown - dt;
                if cooldown > Fixed::ZERO {
                    self.fire = FireState::Cycling { cooldown };
                    return None;
                }
                if self.targets.is_empty() {
                    self.fire = FireState::Idle;
                    return None;
                }
                self.fire = FireState::Cycling {
                    cooldown: (cooldown + self.fire_interval).max(Fixed::ZERO),
                };
                Some(self.volley())
            }
        }
    }

    fn volley(&self) -> Volley {
        Volley {
            targets: self.targets.snapshot(usize::from(self.max_targets)),
            damage: self.damage,
            slow: self.slow,
        }
    }

    /// Raise the level by one and add `damage_per_level`.
    pub fn apply_upgrade(&mut self, damage_per_level: i32) {
        self.level = self.level.saturating_add(1);
        self.damage = self.damage.saturating_add(damage_per_level);
    }
}
