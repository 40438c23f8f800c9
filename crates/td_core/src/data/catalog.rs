//! Lookup table of unit and turret definitions.

use serde::{Deserialize, Serialize};

use super::{TurretData, TurretKind, UnitData, UnitKind};

/// Every unit and turret definition an encounter can reference.
///
/// Entries are looked up by tier. When a tier appears twice the first
/// entry wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Enemy definitions.
    #[serde(default)]
    pub units: Vec<UnitData>,
    /// Turret definitions.
    #[serde(default)]
    pub turrets: Vec<TurretData>,
}

impl Catalog {
    /// Stats for an enemy tier.
    #[must_use]
    pub fn unit(&self, kind: UnitKind) -> Option<&UnitData> {
        self.units.iter().find(|u| u.kind == kind)
    }

    /// Stats for a turret tier.
    #[must_use]
    pub fn turret(&self, kind: TurretKind) -> Option<&TurretData> {
        self.turrets.iter().find(|t| t.kind == kind)
    }

    /// Describe the first invalid entry, if any.
    #[must_use]
    pub fn problem(&self) -> Option<String> {
        self.units
            .iter()
            .find_map(UnitData::problem)
            .or_else(|| self.turrets.iter().find_map(TurretData::problem))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            units: UnitKind::ALL.into_iter().map(UnitData::default_for).collect(),
            turrets: TurretKind::ALL
                .into_iter()
                .map(TurretData::default_for)
                .collect(),
        }
    }
}
