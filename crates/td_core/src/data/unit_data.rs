//! Enemy tier definitions.

use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, Fixed};

/// Enemy tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    /// Baseline walker.
    Standard,
    /// Fragile and quick.
    Fast,
    /// Armored and slow.
    Heavy,
    /// End-of-wave threat.
    Boss,
}

impl UnitKind {
    /// Every tier, in catalog order.
    pub const ALL: [Self; 4] = [Self::Standard, Self::Fast, Self::Heavy, Self::Boss];

    /// Lowercase identifier used by the headless protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Fast => "fast",
            Self::Heavy => "heavy",
            Self::Boss => "boss",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-driven enemy stats.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     kind: Heavy,
///     health: 250,
///     defense: 5,
///     speed: 3.0,
///     attack_damage: 25,
///     bounty: 25,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Tier these stats apply to.
    pub kind: UnitKind,

    /// Maximum health points.
    pub health: i32,

    /// Flat damage reduction per hit.
    #[serde(default)]
    pub defense: i32,

    /// Movement speed in world units per second.
    #[serde(with = "decimal_serde")]
    pub speed: Fixed,

    /// Damage dealt to the base per attack once the path is finished.
    pub attack_damage: i32,

    /// Currency granted when killed.
    #[serde(default)]
    pub bounty: i32,
}

impl UnitData {
    /// Built-in stats for a tier.
    #[must_use]
    pub fn default_for(kind: UnitKind) -> Self {
        let (health, defense, speed, attack_damage, bounty) = match kind {
            UnitKind::Standard => (100, 0, 5, 10, 10),
            UnitKind::Fast => (60, 0, 8, 5, 8),
            UnitKind::Heavy => (250, 5, 3, 25, 25),
            UnitKind::Boss => (1000, 10, 2, 100, 100),
        };
        Self {
            kind,
            health,
            defense,
            speed: Fixed::from_num(speed),
            attack_damage,
            bounty,
        }
    }

    /// Describe the first problem with these stats, if any.
    #[must_use]
    pub fn problem(&self) -> Option<String> {
        if self.health <= 0 {
            return Some(format!("{} health must be positive", self.kind));
        }
        if self.speed < Fixed::ZERO {
            return Some(format!("{} speed must not be negative", self.kind));
        }
        if self.defense < 0 {
            return Some(format!("{} defense must not be negative", self.kind));
        }
        None
    }
}
