//! Scenario loading and configuration.
//!
//! A scenario wraps an encounter with everything a headless run needs on
//! top of it: how long to simulate, at what tick rate, and an optional
//! build plan that places turrets at scheduled times.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use td_core::components::SiteId;
use td_core::data::{EncounterConfig, TurretKind};
use td_core::math::Fixed;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Parsed, but the contents do not describe a playable run.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// A turret the run places on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBuild {
    /// Whole second of game time at which to build.
    #[serde(default)]
    pub at_second: u32,
    /// Turret tier.
    pub turret: TurretKind,
    /// Target site.
    pub site: SiteId,
    /// Upgrades to buy right after construction.
    #[serde(default)]
    pub upgrades: u8,
}

impl PlannedBuild {
    /// Build `turret` on `site` at `at_second`.
    #[must_use]
    pub const fn new(at_second: u32, turret: TurretKind, site: SiteId) -> Self {
        Self {
            at_second,
            turret,
            site,
            upgrades: 0,
        }
    }
}

fn default_duration_seconds() -> u32 {
    300
}

fn default_ticks_per_second() -> u32 {
    16
}

/// A complete headless run description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// The encounter to play.
    pub encounter: EncounterConfig,
    /// Turrets to place during the run.
    #[serde(default)]
    pub build_plan: Vec<PlannedBuild>,
    /// Game time limit in seconds.
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u32,
    /// Fixed tick rate.
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario = Self::from_ron_str(&contents)?;
        tracing::debug!(path = %path.display(), name = %scenario.name, "Scenario loaded");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.ensure_valid()?;
        Ok(scenario)
    }

    /// A built-in scenario name, or else a path to a RON file.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }

    /// Scenarios compiled into the binary.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::standard()),
            "undefended" => Some(Self {
                name: "undefended".to_string(),
                description: "The standard encounter with no turrets".to_string(),
                build_plan: Vec::new(),
                ..Self::standard()
            }),
            _ => None,
        }
    }

    /// The standard encounter with a modest opening build.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            description: "Three waves on an L-shaped path".to_string(),
            encounter: EncounterConfig::standard(),
            build_plan: vec![
                PlannedBuild::new(0, TurretKind::Basic, 0),
                PlannedBuild::new(0, TurretKind::Slow, 1),
                PlannedBuild::new(20, TurretKind::ShortRange, 2),
                PlannedBuild::new(40, TurretKind::LongRange, 3),
            ],
            duration_seconds: default_duration_seconds(),
            ticks_per_second: default_ticks_per_second(),
        }
    }

    /// The same scenario with a different encounter seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.encounter.seed = seed;
        self
    }

    /// Seconds per tick.
    #[must_use]
    pub fn dt(&self) -> Fixed {
        Fixed::ONE / Fixed::from_num(self.ticks_per_second.max(1))
    }

    /// Tick budget implied by the duration and tick rate.
    #[must_use]
    pub fn max_ticks(&self) -> u64 {
        u64::from(self.duration_seconds) * u64::from(self.ticks_per_second)
    }

    /// Check the scenario for problems.
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.encounter.validate();

        if self.ticks_per_second == 0 {
            errors.push("Tick rate must be positive".to_string());
        }
        for build in &self.build_plan {
            let known = usize::try_from(build.site).is_ok_and(|i| i < self.encounter.sites.len());
            if !known {
                errors.push(format!(
                    "Build plan references unknown site {} at {}s",
                    build.site, build.at_second
                ));
            }
        }

        errors
    }

    fn ensure_valid(&self) -> Result<(), ScenarioError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScenarioError::Invalid(errors.join("; ")))
        }
    }

    /// Planned builds due at `second`, in plan order.
    pub fn builds_at(&self, second: u32) -> impl Iterator<Item = &PlannedBuild> {
        self.build_plan
            .iter()
            .filter(move |build| build.at_second == second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scenario_is_valid() {
        let scenario = Scenario::standard();
        assert!(scenario.validate().is_empty(), "{:?}", scenario.validate());
        assert_eq!(scenario.max_ticks(), 300 * 16);
        assert_eq!(scenario.dt(), Fixed::from_num(0.0625));
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(Scenario::builtin("standard").is_some());
        assert!(Scenario::builtin("undefended").unwrap().build_plan.is_empty());
        assert!(Scenario::builtin("nope").is_none());
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                encounter: EncounterConfig(
                    name: "Lane",
                    spawn_points: [(name: "s", position: (x: 0.0, y: 0.0))],
                    path: [(x: 0.0, y: 40.0)],
                    sites: [(name: "a", position: (x: 3.0, y: 20.0))],
                    waves: [(groups: [(kind: Fast, count: 3)], spawn_rate: 2.0)],
                ),
                build_plan: [(turret: Basic, site: 0)],
                duration_seconds: 30,
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.ticks_per_second, 16);
        assert_eq!(scenario.build_plan[0], PlannedBuild::new(0, TurretKind::Basic, 0));
    }

    #[test]
    fn test_unknown_plan_site_rejected() {
        let mut scenario = Scenario::standard();
        scenario.build_plan.push(PlannedBuild::new(5, TurretKind::Basic, 9));
        let errors = scenario.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown site 9"));
    }

    #[test]
    fn test_missing_file() {
        let result = Scenario::load("/definitely/not/here.ron");
        assert!(matches!(result, Err(ScenarioError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_encounter_reported() {
        let ron = r#"
            Scenario(
                name: "Broken",
                encounter: EncounterConfig(name: "Empty", spawn_points: [], path: []),
            )
        "#;
        assert!(matches!(
            Scenario::from_ron_str(ron),
            Err(ScenarioError::Invalid(_))
        ));
    }
}
