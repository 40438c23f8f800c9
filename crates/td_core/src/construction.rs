//! Placement sites and the construction gate.
//!
//! Checks run in a fixed order and nothing is mutated until all of them
//! pass:
//!
//! - placement: site exists, tier exists, site has room, funds cover cost;
//! - upgrade: turret exists, below max level, funds cover cost.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::{EntityId, SiteId};
use crate::data::{SiteData, TurretData, TurretKind};
use crate::ledger::Ledger;
use crate::math::Vec2Fixed;
use crate::turret::Turret;

/// Why a turret could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// No site with this id.
    #[error("Unknown site: {0}")]
    UnknownSite(SiteId),

    /// The catalog has no such turret tier.
    #[error("Unknown turret type: {0}")]
    UnknownTurretType(TurretKind),

    /// The site is at capacity.
    #[error("Site {0} is occupied")]
    SiteUnavailable(SiteId),

    /// The ledger cannot cover the build cost.
    #[error("Insufficient funds: need {cost}, have {balance}")]
    InsufficientFunds {
        /// Build cost.
        cost: i32,
        /// Balance at the time of the request.
        balance: i32,
    },
}

/// Why a turret could not be upgraded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// No turret with this id.
    #[error("Unknown turret: {0}")]
    UnknownTurret(EntityId),

    /// The turret is already at its last level.
    #[error("Turret {turret} is at max level {level}")]
    MaxLevelReached {
        /// Turret id.
        turret: EntityId,
        /// Its current level.
        level: u8,
    },

    /// The ledger cannot cover the upgrade cost.
    #[error("Insufficient funds: need {cost}, have {balance}")]
    InsufficientFunds {
        /// Upgrade cost.
        cost: i32,
        /// Balance at the time of the request.
        balance: i32,
    },
}

/// A placement location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    /// Site id (index in the encounter's site list).
    pub id: SiteId,
    /// Label.
    pub name: String,
    /// Turret anchor.
    pub position: Vec2Fixed,
    /// How many turrets fit.
    pub capacity: u8,
    occupants: Vec<EntityId>,
}

impl Site {
    /// Build a site from its descriptor.
    #[must_use]
    pub fn from_data(id: SiteId, data: &SiteData) -> Self {
        Self {
            id,
            name: data.name.clone(),
            position: data.position.to_vec(),
            capacity: data.capacity,
            occupants: Vec::new(),
        }
    }

    /// Turrets currently hosted.
    #[must_use]
    pub fn occupants(&self) -> &[EntityId] {
        &self.occupants
    }

    /// Whether another turret fits.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.occupants.len() < usize::from(self.capacity)
    }

    /// Record a turret on this site.
    pub fn occupy(&mut self, turret: EntityId) {
        self.occupants.push(turret);
    }

    /// Free the slot held by `turret`.
    pub fn vacate(&mut self, turret: EntityId) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|&t| t != turret);
        self.occupants.len() != before
    }
}

/// Validate a placement. Returns the build cost to debit.
///
/// # Errors
///
/// The first failing check, in the order documented on this module.
pub fn check_placement(
    site_id: SiteId,
    site: Option<&Site>,
    data: Option<&TurretData>,
    kind: TurretKind,
    ledger: &Ledger,
) -> Result<i32, PlacementError> {
    let site = site.ok_or(PlacementError::UnknownSite(site_id))?;
    let data = data.ok_or(PlacementError::UnknownTurretType(kind))?;
    if !site.has_room() {
        return Err(PlacementError::SiteUnavailable(site.id));
    }
    if !ledger.can_afford(data.build_cost) {
        return Err(PlacementError::InsufficientFunds {
            cost: data.build_cost,
            balance: ledger.balance(),
        });
    }
    Ok(data.build_cost)
}

/// Validate an upgrade. Returns the upgrade cost to debit.
///
/// # Errors
///
/// The first failing check, in the order documented on this module.
pub fn check_upgrade(
    turret_id: EntityId,
    turret: Option<&Turret>,
    data: Option<&TurretData>,
    ledger: &Ledger,
) -> Result<i32, UpgradeError> {
    let (turret, data) = turret
        .zip(data)
        .ok_or(UpgradeError::UnknownTurret(turret_id))?;
    let cost = data
        .upgrade_cost(turret.level())
        .ok_or(UpgradeError::MaxLevelReached {
            turret: turret_id,
            level: turret.level(),
        })?;
    if !ledger.can_afford(cost) {
        return Err(UpgradeError::InsufficientFunds {
            cost,
            balance: ledger.balance(),
        });
    }
    Ok(cost)
}
