//! Encounter configuration: the map, the waves and the tunables.

use serde::{Deserialize, Serialize};

use super::{Catalog, UnitKind};
use crate::base::DEFAULT_BASE_HEALTH;
use crate::error::{GameError, Result};
use crate::math::{decimal_serde, Fixed, Vec2Fixed};

/// Largest absolute coordinate an encounter may place anything at.
pub const MAX_COORDINATE: i32 = 1_000_000;

/// A ground-plane position written as decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointData {
    /// X coordinate.
    #[serde(with = "decimal_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "decimal_serde")]
    pub y: Fixed,
}

impl PointData {
    /// Point from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self {
            x: Fixed::from_num(x),
            y: Fixed::from_num(y),
        }
    }

    /// Whether both coordinates lie within [`MAX_COORDINATE`].
    #[must_use]
    pub fn in_bounds(self) -> bool {
        let limit = Fixed::from_num(MAX_COORDINATE);
        self.x.abs() <= limit && self.y.abs() <= limit
    }

    /// Convert to a simulation vector.
    #[must_use]
    pub const fn to_vec(self) -> Vec2Fixed {
        Vec2Fixed::new(self.x, self.y)
    }
}

/// A named place where enemies enter the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPointData {
    /// Label for logs and tooling.
    pub name: String,
    /// World position.
    pub position: PointData,
}

const fn default_capacity() -> u8 {
    1
}

/// A place where turrets can be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteData {
    /// Label for logs and tooling.
    pub name: String,
    /// Turret anchor position.
    pub position: PointData,
    /// How many turrets the site can host.
    #[serde(default = "default_capacity")]
    pub capacity: u8,
}

/// A run of identical enemies inside a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnemyGroup {
    /// Enemy tier.
    pub kind: UnitKind,
    /// How many to spawn.
    pub count: u32,
}

/// One batch of enemies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveData {
    /// Groups, spawned in declared order.
    pub groups: Vec<EnemyGroup>,
    /// Units released per second.
    #[serde(with = "decimal_serde")]
    pub spawn_rate: Fixed,
}

impl WaveData {
    /// Total enemies in the wave.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.groups.iter().map(|g| g.count).sum()
    }
}

fn default_time_until_next_wave() -> Fixed {
    Fixed::from_num(15)
}

const fn default_bonus_per_second() -> i32 {
    1
}

const fn default_auto_start() -> bool {
    true
}

/// Wave pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Countdown between the end of one wave's spawning and the next wave.
    #[serde(with = "decimal_serde", default = "default_time_until_next_wave")]
    pub time_until_next_wave: Fixed,
    /// Currency per whole second skipped by an early start.
    #[serde(default = "default_bonus_per_second")]
    pub bonus_per_second: i32,
    /// Begin the first wave as soon as the simulation is created.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            time_until_next_wave: default_time_until_next_wave(),
            bonus_per_second: default_bonus_per_second(),
            auto_start: default_auto_start(),
        }
    }
}

/// What happens to enemies that reach the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BaseAttackerPolicy {
    /// Keep attacking until killed externally or the base falls.
    #[default]
    Persistent,
    /// Remove the unit (no bounty) after this many strikes.
    Expire {
        /// Strikes before removal.
        attacks: u32,
    },
}

const fn default_starting_gold() -> i32 {
    100
}

const fn default_base_health() -> i32 {
    DEFAULT_BASE_HEALTH
}

/// Complete description of one encounter.
///
/// # Example RON
///
/// ```ron
/// EncounterConfig(
///     name: "Crossroads",
///     seed: 7,
///     starting_gold: 150,
///     spawn_points: [(name: "north", position: (x: 0.0, y: 0.0))],
///     path: [(x: 0.0, y: 10.0), (x: 10.0, y: 10.0)],
///     sites: [(name: "a", position: (x: 5.0, y: 5.0))],
///     waves: [(groups: [(kind: Standard, count: 5)], spawn_rate: 1.0)],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterConfig {
    /// Display name.
    pub name: String,
    /// Seed for every random choice in the run.
    #[serde(default)]
    pub seed: u64,
    /// Initial ledger balance.
    #[serde(default = "default_starting_gold")]
    pub starting_gold: i32,
    /// Maximum base health.
    #[serde(default = "default_base_health")]
    pub base_health: i32,
    /// Enemy entry points.
    pub spawn_points: Vec<SpawnPointData>,
    /// Waypoints every enemy follows, in order.
    pub path: Vec<PointData>,
    /// Turret placement sites.
    #[serde(default)]
    pub sites: Vec<SiteData>,
    /// Waves, consumed in order.
    #[serde(default)]
    pub waves: Vec<WaveData>,
    /// Wave pacing.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Lifetime of enemies that reached the base.
    #[serde(default)]
    pub base_attackers: BaseAttackerPolicy,
    /// Unit and turret definitions.
    #[serde(default)]
    pub catalog: Catalog,
}

impl EncounterConfig {
    /// Parse an encounter from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid
    /// encounter document. The result is not validated.
    pub fn from_ron_str(src: &str) -> Result<Self> {
        ron::from_str(src).map_err(|e| GameError::DataParseError(e.to_string()))
    }

    /// Serialize to pretty RON.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if serialization fails.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::DataParseError(e.to_string()))
    }

    /// Check the encounter for problems.
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.spawn_points.is_empty() {
            errors.push("Encounter has no spawn points".to_string());
        }
        if self.path.is_empty() {
            errors.push("Encounter path has no waypoints".to_string());
        }
        if self.base_health <= 0 {
            errors.push(format!("Base health {} must be positive", self.base_health));
        }

        for site in &self.sites {
            if site.capacity == 0 {
                errors.push(format!("Site '{}' has zero capacity", site.name));
            }
        }

        let points = self
            .spawn_points
            .iter()
            .map(|s| (format!("Spawn point '{}'", s.name), s.position))
            .chain(
                self.path
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (format!("Waypoint {}", i + 1), *p)),
            )
            .chain(
                self.sites
                    .iter()
                    .map(|s| (format!("Site '{}'", s.name), s.position)),
            );
        for (label, point) in points {
            if !point.in_bounds() {
                errors.push(format!(
                    "{label} lies outside +/-{MAX_COORDINATE} at ({}, {})",
                    point.x, point.y
                ));
            }
        }

        for (index, wave) in self.waves.iter().enumerate() {
            let number = index + 1;
            if wave.spawn_rate <= Fixed::ZERO {
                errors.push(format!("Wave {number} spawn rate must be positive"));
            }
            for group in &wave.groups {
                if self.catalog.unit(group.kind).is_none() {
                    errors.push(format!(
                        "Wave {number} references unknown unit '{}'",
                        group.kind
                    ));
                }
            }
        }

        if self.scheduler.time_until_next_wave < Fixed::ZERO {
            errors.push("Countdown length must not be negative".to_string());
        }
        if let BaseAttackerPolicy::Expire { attacks: 0 } = self.base_attackers {
            errors.push("Expiring base attackers need at least one attack".to_string());
        }
        if let Some(problem) = self.catalog.problem() {
            errors.push(problem);
        }

        errors
    }

    /// Validate, folding every problem into one error.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] listing all problems.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GameError::InvalidConfig(errors.join("; ")))
        }
    }

    /// Built-in three-wave encounter on an L-shaped path.
    #[must_use]
    pub fn standard() -> Self {
        let wave = |groups: Vec<EnemyGroup>, rate: i32| WaveData {
            groups,
            spawn_rate: Fixed::from_num(rate),
        };
        let group = |kind, count| EnemyGroup { kind, count };
        let site = |name: &str, x, y| SiteData {
            name: name.to_string(),
            position: PointData::from_ints(x, y),
            capacity: 1,
        };

        Self {
            name: "Standard".to_string(),
            seed: 0,
            starting_gold: 150,
            base_health: DEFAULT_BASE_HEALTH,
            spawn_points: vec![
                SpawnPointData {
                    name: "west".to_string(),
                    position: PointData::from_ints(-2, 0),
                },
                SpawnPointData {
                    name: "east".to_string(),
                    position: PointData::from_ints(2, 0),
                },
            ],
            path: vec![
                PointData::from_ints(0, 10),
                PointData::from_ints(0, 30),
                PointData::from_ints(30, 30),
                PointData::from_ints(30, 50),
            ],
            sites: vec![
                site("gate", 5, 15),
                site("bend", 5, 25),
                site("corner", 25, 35),
                site("approach", 35, 45),
            ],
            waves: vec![
                wave(vec![group(UnitKind::Standard, 6)], 1),
                wave(
                    vec![group(UnitKind::Standard, 6), group(UnitKind::Fast, 4)],
                    2,
                ),
                wave(
                    vec![
                        group(UnitKind::Heavy, 3),
                        group(UnitKind::Fast, 6),
                        group(UnitKind::Boss, 1),
                    ],
                    1,
                ),
            ],
            scheduler: SchedulerSettings::default(),
            base_attackers: BaseAttackerPolicy::Persistent,
            catalog: Catalog::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_valid() {
        let config = EncounterConfig::standard();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(config.waves[1].unit_count(), 10);
    }

    #[test]
    fn test_minimal_ron_fills_defaults() {
        let src = r#"
            EncounterConfig(
                name: "Tiny",
                spawn_points: [(name: "s", position: (x: 0.0, y: 0.0))],
                path: [(x: 0.0, y: 10.0)],
            )
        "#;
        let config = EncounterConfig::from_ron_str(src).unwrap();
        assert_eq!(config.starting_gold, 100);
        assert_eq!(config.base_health, DEFAULT_BASE_HEALTH);
        assert_eq!(config.scheduler.time_until_next_wave, Fixed::from_num(15));
        assert_eq!(config.scheduler.bonus_per_second, 1);
        assert_eq!(config.base_attackers, BaseAttackerPolicy::Persistent);
        assert!(config.catalog.turret(super::super::TurretKind::Basic).is_some());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_ron_round_trip() {
        let config = EncounterConfig::standard();
        let text = config.to_ron_string().unwrap();
        let parsed = EncounterConfig::from_ron_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_error_reported() {
        let result = EncounterConfig::from_ron_str("EncounterConfig(name: ");
        assert!(matches!(result, Err(GameError::DataParseError(_))));
    }

    #[test]
    fn test_validate_catches_problems() {
        let mut config = EncounterConfig::standard();
        config.spawn_points.clear();
        config.path.clear();
        config.sites[0].capacity = 0;
        config.waves[0].spawn_rate = Fixed::ZERO;
        config.catalog.units.retain(|u| u.kind != UnitKind::Boss);

        let errors = config.validate();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_validate_bounds_coordinates() {
        let mut config = EncounterConfig::standard();
        config.path.push(PointData::from_ints(50_000, 0));
        assert!(config.validate().is_empty(), "{:?}", config.validate());

        config.path.push(PointData::from_ints(MAX_COORDINATE + 1, 0));
        config.sites[0].position = PointData::from_ints(0, -MAX_COORDINATE - 1);
        let errors = config.validate();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors[0].starts_with("Waypoint"));
        assert!(matches!(
            config.ensure_valid(),
            Err(GameError::InvalidConfig(_))
        ));
    }
}
