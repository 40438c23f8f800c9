//! Homing engagement effects.
//!
//! A projectile is bound to one target at creation and never retargets.
//! It homes on the target's live position; contact means the projectile
//! reached that position exactly, which [`Vec2Fixed::move_towards`]
//! guarantees once the remaining distance fits in one step.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, SlowSpec};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Result of one projectile step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileStep {
    /// Still travelling.
    InFlight,
    /// Reached the target this step.
    Contact,
    /// Target is gone; terminate without effect.
    Fizzled,
}

/// A single-use, target-bound damage carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity id.
    pub id: EntityId,
    /// Turret that fired it.
    pub source: EntityId,
    /// Bound target.
    pub target: EntityId,
    /// Current position.
    pub position: Vec2Fixed,
    /// Travel speed in units per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Damage applied on contact, before defense.
    pub damage: i32,
    /// Slow applied on contact.
    pub slow: Option<SlowSpec>,
}

impl Projectile {
    /// Move toward the target.
    ///
    /// `target_position` is `None` when the target no longer exists or can
    /// no longer be hit.
    pub fn step(&mut self, target_position: Option<Vec2Fixed>, dt: Fixed) -> ProjectileStep {
        let Some(goal) = target_position else {
            return ProjectileStep::Fizzled;
        };
        self.position = self.position.move_towards(goal, self.speed * dt);
        if self.position == goal {
            ProjectileStep::Contact
        } else {
            ProjectileStep::InFlight
        }
    }
}
