//! Shared component data.
//!
//! Components are small plain-data pieces used by more than one entity
//! kind. Entity-specific state lives with the entity type
//! ([`crate::unit::Unit`], [`crate::turret::Turret`], ...).

use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, fixed_serde, Fixed};

/// Unique identifier for entities.
///
/// Ids come from a single counter shared by units, turrets and projectiles
/// and are never reused, so a stale id can only ever miss.
pub type EntityId = u64;

/// Identifier of a placement site (index into the encounter's site list).
pub type SiteId = u32;

/// Health pool for damageable entities.
///
/// `current` is signed: a lethal hit may drive it below zero, and the
/// death check is `current <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: i32,
    /// Maximum health points.
    pub max: i32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health at or below zero).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current <= 0
    }

    /// Check if entity is at full health.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Subtract already-resolved damage.
    pub fn apply_damage(&mut self, amount: i32) {
        self.current = self.current.saturating_sub(amount);
    }

    /// Get health as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> i32 {
        if self.max <= 0 {
            0
        } else {
            (self.current.max(0) * 100) / self.max
        }
    }
}

/// Slow payload carried by an engagement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlowSpec {
    /// Fraction of base speed removed, in `[0, 1)`.
    #[serde(with = "decimal_serde")]
    pub factor: Fixed,
    /// Seconds the slow lasts.
    #[serde(with = "decimal_serde")]
    pub duration: Fixed,
}

impl SlowSpec {
    /// Create a slow descriptor.
    #[must_use]
    pub const fn new(factor: Fixed, duration: Fixed) -> Self {
        Self { factor, duration }
    }

    /// Whether the factor lies in `[0, 1)`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.factor >= Fixed::ZERO && self.factor < Fixed::ONE && self.duration >= Fixed::ZERO
    }
}

/// An active slow on a unit.
///
/// Only one exists per unit; applying a new slow overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlowEffect {
    /// Fraction of base speed removed.
    #[serde(with = "fixed_serde")]
    pub factor: Fixed,
    /// Seconds until the slow expires.
    #[serde(with = "fixed_serde")]
    pub remaining: Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_death_threshold() {
        let mut health = Health::new(10);
        health.apply_damage(10);
        assert!(health.is_dead());
        assert_eq!(health.current, 0);

        let mut overkill = Health::new(10);
        overkill.apply_damage(25);
        assert!(overkill.is_dead());
        assert_eq!(overkill.current, -15);
    }

    #[test]
    fn test_health_percentage_clamps_negative() {
        let mut health = Health::new(50);
        health.apply_damage(60);
        assert_eq!(health.percentage(), 0);
    }

    #[test]
    fn test_slow_spec_validity() {
        assert!(SlowSpec::new(Fixed::from_num(0.5), Fixed::from_num(2)).is_valid());
        assert!(SlowSpec::new(Fixed::ZERO, Fixed::from_num(2)).is_valid());
        assert!(!SlowSpec::new(Fixed::ONE, Fixed::from_num(2)).is_valid());
        assert!(!SlowSpec::new(Fixed::from_num(-0.1), Fixed::from_num(2)).is_valid());
    }
}
