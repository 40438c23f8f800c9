//! The defended objective.
//!
//! Health only goes down until [`BaseHealth::reset`]. Reaching zero flips
//! the one-way `defense_failed` flag, which freezes the simulation.

use serde::{Deserialize, Serialize};

use crate::components::Health;
use crate::events::{EventBus, SimEvent};

/// Default base health when an encounter does not specify one.
pub const DEFAULT_BASE_HEALTH: i32 = 1000;

/// Damageable state of the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseHealth {
    health: Health,
    defense_failed: bool,
}

impl BaseHealth {
    /// Create a base at full health.
    #[must_use]
    pub fn new(max: i32) -> Self {
        Self {
            health: Health::new(max.max(1)),
            defense_failed: false,
        }
    }

    /// Current health, never below zero.
    #[must_use]
    pub const fn current(&self) -> i32 {
        self.health.current
    }

    /// Maximum health.
    #[must_use]
    pub const fn max(&self) -> i32 {
        self.health.max
    }

    /// Whether the base has fallen.
    #[must_use]
    pub const fn is_defense_failed(&self) -> bool {
        self.defense_failed
    }

    /// Apply damage from a base attacker.
    ///
    /// Ignored once the base has fallen or when `amount` is non-positive.
    /// Returns `true` if this hit caused the defense to fail.
    pub fn take_damage(&mut self, amount: i32, bus: &mut EventBus) -> bool {
        if self.defense_failed || amount <= 0 {
            return false;
        }
        self.health.current = self.health.current.saturating_sub(amount).max(0);
        bus.emit(SimEvent::BaseHealthChanged {
            current: self.health.current,
            max: self.health.max,
        });

        if self.health.current == 0 {
            self.defense_failed = true;
            tracing::info!("Base destroyed - defense failed");
            bus.emit(SimEvent::DefenseFailed);
            return true;
        }
        false
    }

    /// Restore full health and clear the failed state.
    pub fn reset(&mut self, bus: &mut EventBus) {
        self.health.current = self.health.max;
        self.defense_failed = false;
        bus.emit(SimEvent::BaseHealthChanged {
            current: self.health.current,
            max: self.health.max,
        });
    }
}

impl Default for BaseHealth {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_HEALTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_is_monotonic_and_clamped() {
        let mut bus = EventBus::new();
        let mut base = BaseHealth::new(30);
        assert!(!base.take_damage(10, &mut bus));
        assert_eq!(base.current(), 20);
        assert!(base.take_damage(50, &mut bus));
        assert_eq!(base.current(), 0);
        assert!(base.is_defense_failed());
    }

    #[test]
    fn test_damage_after_failure_ignored() {
        let mut bus = EventBus::new();
        let mut base = BaseHealth::new(10);
        base.take_damage(10, &mut bus);
        bus.dispatch();

        assert!(!base.take_damage(5, &mut bus));
        assert!(bus.pending().is_empty());
    }

    #[test]
    fn test_failure_emits_once() {
        let mut bus = EventBus::new();
        let mut base = BaseHealth::new(10);
        base.take_damage(10, &mut bus);
        base.take_damage(10, &mut bus);
        let failures = bus
            .dispatch()
            .into_iter()
            .filter(|e| *e == SimEvent::DefenseFailed)
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn test_non_positive_damage_ignored() {
        let mut bus = EventBus::new();
        let mut base = BaseHealth::new(10);
        assert!(!base.take_damage(0, &mut bus));
        assert!(!base.take_damage(-3, &mut bus));
        assert_eq!(base.current(), 10);
    }

    #[test]
    fn test_reset_restores() {
        let mut bus = EventBus::new();
        let mut base = BaseHealth::new(10);
        base.take_damage(10, &mut bus);
        base.reset(&mut bus);
        assert_eq!(base.current(), 10);
        assert!(!base.is_defense_failed());
    }
}
