//! Error types for the simulation core.
//!
//! Gameplay rejections that a caller is expected to handle (a failed
//! construction, an unaffordable upgrade) have their own enums next to the
//! operation that produces them. [`GameError`] covers configuration and
//! state problems.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for simulation setup and state handling.
#[derive(Debug, Error)]
pub enum GameError {
    /// Data file parsing error.
    #[error("Failed to parse encounter data: {0}")]
    DataParseError(String),

    /// Encounter configuration failed validation.
    #[error("Invalid encounter configuration: {0}")]
    InvalidConfig(String),

    /// Unknown unit type referenced by configuration.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// Unknown turret type referenced by configuration or command.
    #[error("Unknown turret type: {0}")]
    UnknownTurretType(String),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
