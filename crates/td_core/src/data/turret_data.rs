//! Turret tier definitions.

use serde::{Deserialize, Serialize};

use crate::components::SlowSpec;
use crate::math::{decimal_serde, Fixed};
use crate::targeting::{TargetAcquisition, TargetingPolicy};

/// Default price of placing any turret.
pub const DEFAULT_BUILD_COST: i32 = 50;

/// Default pivot turn rate (interpolation factor per second).
pub const DEFAULT_TURN_RATE: i32 = 5;

/// Default projectile travel speed in world units per second.
pub const DEFAULT_PROJECTILE_SPEED: i32 = 20;

/// Turret tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TurretKind {
    /// Single target, medium range.
    Basic,
    /// Long reach, light hits.
    LongRange,
    /// Short reach, heavy hits.
    ShortRange,
    /// Rarely fires but slows everything it hits.
    Slow,
}

impl TurretKind {
    /// Every tier, in catalog order.
    pub const ALL: [Self; 4] = [Self::Basic, Self::LongRange, Self::ShortRange, Self::Slow];

    /// Snake-case identifier used by the headless protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::LongRange => "long_range",
            Self::ShortRange => "short_range",
            Self::Slow => "slow",
        }
    }

    /// Parse a protocol identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for TurretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_build_cost() -> i32 {
    DEFAULT_BUILD_COST
}

fn default_turn_rate() -> Fixed {
    Fixed::from_num(DEFAULT_TURN_RATE)
}

fn default_projectile_speed() -> Fixed {
    Fixed::from_num(DEFAULT_PROJECTILE_SPEED)
}

fn default_max_targets() -> u8 {
    1
}

/// Data-driven turret stats.
///
/// # Example RON
///
/// ```ron
/// TurretData(
///     kind: Slow,
///     range: 10.0,
///     fire_interval: 10.0,
///     damage: 2,
///     max_targets: 3,
///     slow: Some(SlowSpec(factor: 0.5, duration: 2.0)),
///     build_cost: 50,
///     upgrade_costs: [40, 80],
///     damage_per_level: 1,
///     targeting: Nearest,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretData {
    /// Tier these stats apply to.
    pub kind: TurretKind,

    /// Detection radius.
    #[serde(with = "decimal_serde")]
    pub range: Fixed,

    /// Seconds between volleys.
    #[serde(with = "decimal_serde")]
    pub fire_interval: Fixed,

    /// Damage per projectile at level 0.
    pub damage: i32,

    /// Targets engaged per volley.
    #[serde(default = "default_max_targets")]
    pub max_targets: u8,

    /// Slow applied by each projectile, if any.
    #[serde(default)]
    pub slow: Option<SlowSpec>,

    /// Price of construction.
    #[serde(default = "default_build_cost")]
    pub build_cost: i32,

    /// Price of each successive upgrade. The length is the max level.
    #[serde(default)]
    pub upgrade_costs: Vec<i32>,

    /// Damage added per upgrade level.
    #[serde(default)]
    pub damage_per_level: i32,

    /// Candidate ordering.
    #[serde(default)]
    pub targeting: TargetingPolicy,

    /// Candidate discovery.
    #[serde(default)]
    pub acquisition: TargetAcquisition,

    /// Pivot turn rate in radians per second.
    #[serde(with = "decimal_serde", default = "default_turn_rate")]
    pub turn_rate: Fixed,

    /// Speed of fired projectiles.
    #[serde(with = "decimal_serde", default = "default_projectile_speed")]
    pub projectile_speed: Fixed,
}

impl TurretData {
    /// Built-in stats for a tier.
    #[must_use]
    pub fn default_for(kind: TurretKind) -> Self {
        let (range, interval, damage, max_targets) = match kind {
            TurretKind::Basic => (10, 2, 10, 1),
            TurretKind::LongRange => (15, 3, 6, 3),
            TurretKind::ShortRange => (8, 3, 15, 3),
            TurretKind::Slow => (10, 10, 2, 3),
        };
        let slow = (kind == TurretKind::Slow)
            .then(|| SlowSpec::new(Fixed::from_num(0.5), Fixed::from_num(2)));
        Self {
            kind,
            range: Fixed::from_num(range),
            fire_interval: Fixed::from_num(interval),
            damage,
            max_targets,
            slow,
            build_cost: DEFAULT_BUILD_COST,
            upgrade_costs: vec![40, 80],
            damage_per_level: (damage / 2).max(1),
            targeting: TargetingPolicy::Nearest,
            acquisition: TargetAcquisition::RadiusScan,
            turn_rate: default_turn_rate(),
            projectile_speed: default_projectile_speed(),
        }
    }

    /// Highest reachable upgrade level.
    #[must_use]
    pub fn max_level(&self) -> u8 {
        u8::try_from(self.upgrade_costs.len()).unwrap_or(u8::MAX)
    }

    /// Price of going from `level` to `level + 1`, if that level exists.
    #[must_use]
    pub fn upgrade_cost(&self, level: u8) -> Option<i32> {
        self.upgrade_costs.get(usize::from(level)).copied()
    }

    /// Describe the first problem with these stats, if any.
    #[must_use]
    pub fn problem(&self) -> Option<String> {
        if self.range <= Fixed::ZERO {
            return Some(format!("{} range must be positive", self.kind));
        }
        if self.fire_interval <= Fixed::ZERO {
            return Some(format!("{} fire interval must be positive", self.kind));
        }
        if self.max_targets == 0 {
            return Some(format!("{} must engage at least one target", self.kind));
        }
        if self.projectile_speed <= Fixed::ZERO {
            return Some(format!("{} projectile speed must be positive", self.kind));
        }
        if let Some(slow) = self.slow {
            if !slow.is_valid() {
                return Some(format!("{} slow factor must lie in [0, 1)", self.kind));
            }
        }
        if self.build_cost < 0 || self.upgrade_costs.iter().any(|&c| c < 0) {
            return Some(format!("{} costs must not be negative", self.kind));
        }
        None
    }
}
