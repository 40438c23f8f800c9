//! Flat-defense damage resolution.
//!
//! Every hit is reduced by the target's flat `defense`, but an attack
//! always lands for at least [`MIN_DAMAGE`]. There is no immunity.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Health};

/// Minimum damage floor - defense can never fully negate an attack.
pub const MIN_DAMAGE: i32 = 1;

/// Calculate final damage after flat defense.
///
/// ```text
/// Final Damage = max(MIN_DAMAGE, amount - defense)
/// ```
#[must_use]
pub fn calculate_damage(amount: i32, defense: i32) -> i32 {
    amount.saturating_sub(defense).max(MIN_DAMAGE)
}

/// Outcome of applying a hit to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageOutcome {
    /// Damage actually subtracted after defense.
    pub dealt: i32,
    /// Health after the hit.
    pub health: Health,
    /// Whether this hit took the unit to zero or below.
    pub lethal: bool,
}

/// A resolved hit, recorded for the game layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Turret that fired the effect.
    pub source: EntityId,
    /// Unit that was hit.
    pub target: EntityId,
    /// Damage dealt after defense.
    pub damage: i32,
}
