//! JSON protocol for headless encounter control.
//!
//! The runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** State updates and responses
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready","version":"1.0","tick":0}`
//! 2. Controller sends commands as JSON lines
//! 3. Runner answers every command; `tick` and `query` return full state
//! 4. When the base falls or the last enemy dies, outputs `game_over`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0}
//! -> {"cmd":"construct","turret":"basic","site":0}
//! <- {"type":"constructed","turret_id":1,"site":0,"balance":100}
//! -> {"cmd":"tick","count":16}
//! <- {"type":"state","tick":16,"balance":100,...}
//! -> {"cmd":"early_wave"}
//! <- {"type":"error","message":"No countdown running","cmd":"early_wave"}
//! -> {"cmd":"quit"}
//! <- {"type":"bye"}
//! ```

use serde::{Deserialize, Serialize};

use td_core::components::{EntityId, SiteId};
use td_core::simulation::Simulation;
use td_core::waves::SchedulerPhase;

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands that can be sent to the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Advance the simulation by N ticks (default: 1).
    Tick {
        /// Ticks to run.
        #[serde(default = "default_tick_count")]
        count: u32,
    },

    /// Query current state without advancing time.
    Query,

    /// Build a turret.
    Construct {
        /// Turret tier, e.g. `"long_range"`.
        turret: String,
        /// Target site.
        site: SiteId,
    },

    /// Upgrade a turret by one level.
    Upgrade {
        /// Turret to upgrade.
        turret_id: EntityId,
    },

    /// Demolish a turret.
    DestroyTurret {
        /// Turret to remove.
        turret_id: EntityId,
    },

    /// Skip the countdown for a bonus.
    EarlyWave,

    /// Report the state hash.
    Hash,

    /// Quit the session.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready {
        /// Protocol version.
        version: String,
        /// Current tick.
        tick: u64,
    },

    /// Acknowledgment of a command.
    Ack {
        /// Command name.
        cmd: String,
    },

    /// Error processing a command.
    Error {
        /// What went wrong.
        message: String,
        /// Command that failed, when it could be parsed.
        cmd: Option<String>,
    },

    /// Current encounter state.
    State(StateView),

    /// A turret was built.
    Constructed {
        /// New turret.
        turret_id: EntityId,
        /// Hosting site.
        site: SiteId,
        /// Balance after the purchase.
        balance: i32,
    },

    /// A turret was upgraded.
    Upgraded {
        /// Upgraded turret.
        turret_id: EntityId,
        /// Level after the upgrade.
        level: u8,
        /// Balance after the purchase.
        balance: i32,
    },

    /// The next wave was started early.
    EarlyWave {
        /// Currency granted.
        bonus: i32,
        /// Wave that started.
        wave: u32,
    },

    /// The encounter has ended.
    GameOver {
        /// How it ended.
        result: GameStatus,
        /// Tick at which it ended.
        tick: u64,
    },

    /// State hash for determinism verification.
    StateHash {
        /// Current tick.
        tick: u64,
        /// Hash of the full simulation state.
        hash: u64,
    },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// State Types
// ============================================================================

/// Snapshot of the encounter for controllers.
///
/// Positions and timers are converted to `f64` for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    /// Completed ticks.
    pub tick: u64,
    /// Game seconds elapsed.
    pub elapsed: f64,
    /// Spendable currency.
    pub balance: i32,
    /// Base health.
    pub base: HealthView,
    /// 1-based current wave, 0 before the first.
    pub wave: u32,
    /// Configured waves.
    pub wave_count: usize,
    /// Scheduler phase name.
    pub phase: String,
    /// Seconds until the next wave, during a countdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<f64>,
    /// Enemies on the field.
    pub units: Vec<UnitView>,
    /// Built turrets.
    pub turrets: Vec<TurretView>,
    /// Projectiles in flight.
    pub projectiles: usize,
    /// Encounter status.
    pub status: GameStatus,
    /// State hash.
    pub hash: u64,
}

/// Health pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthView {
    /// Current value.
    pub current: i32,
    /// Maximum value.
    pub max: i32,
}

/// One enemy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    /// Entity id.
    pub id: EntityId,
    /// Tier name.
    pub kind: String,
    /// X position.
    pub x: f64,
    /// Y position.
    pub y: f64,
    /// Health.
    pub health: HealthView,
    /// Whether it has reached the base.
    pub attacking_base: bool,
    /// Whether a slow is active.
    pub slowed: bool,
}

/// One turret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretView {
    /// Entity id.
    pub id: EntityId,
    /// Tier name.
    pub kind: String,
    /// Hosting site.
    pub site: SiteId,
    /// Upgrade level.
    pub level: u8,
    /// Damage per projectile.
    pub damage: i32,
    /// Ranked candidates.
    pub targets: Vec<EntityId>,
}

/// Current encounter status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Still running.
    InProgress,
    /// Every wave released and every enemy gone.
    Victory,
    /// The base fell.
    Defeat,
}

impl GameStatus {
    /// Status of a simulation.
    #[must_use]
    pub fn of(sim: &Simulation) -> Self {
        if sim.is_defense_failed() {
            Self::Defeat
        } else if sim.waves_completed() && sim.units().is_empty() {
            Self::Victory
        } else {
            Self::InProgress
        }
    }

    /// Whether the encounter is over.
    #[must_use]
    pub const fn is_over(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl StateView {
    /// Capture the state of a simulation.
    #[must_use]
    pub fn capture(sim: &Simulation) -> Self {
        let base = sim.base_health();
        let phase = match sim.scheduler_phase() {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Spawning(_) => "spawning",
            SchedulerPhase::Countdown { .. } => "countdown",
            SchedulerPhase::Completed => "completed",
        };

        Self {
            tick: sim.get_tick(),
            elapsed: sim.elapsed().to_num(),
            balance: sim.balance(),
            base: HealthView {
                current: base.current(),
                max: base.max(),
            },
            wave: sim.current_wave(),
            wave_count: sim.wave_count(),
            phase: phase.to_string(),
            countdown: sim.countdown_remaining().map(|r| r.to_num()),
            units: sim
                .units()
                .into_iter()
                .map(|unit| {
                    let health = unit.health();
                    UnitView {
                        id: unit.id,
                        kind: unit.kind.to_string(),
                        x: unit.position.x.to_num(),
                        y: unit.position.y.to_num(),
                        health: HealthView {
                            current: health.current,
                            max: health.max,
                        },
                        attacking_base: unit.is_attacking_base(),
                        slowed: unit.slow().is_some(),
                    }
                })
                .collect(),
            turrets: sim
                .turrets()
                .into_iter()
                .map(|turret| TurretView {
                    id: turret.id,
                    kind: turret.kind.to_string(),
                    site: turret.site,
                    level: turret.level(),
                    damage: turret.damage(),
                    targets: turret.targets().ids().to_vec(),
                })
                .collect(),
            projectiles: sim.projectiles().len(),
            status: GameStatus::of(sim),
            hash: sim.state_hash(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    #[must_use]
    pub fn ready(tick: u64) -> Self {
        Self::Ready {
            version: "1.0".to_string(),
            tick,
        }
    }

    /// Create an acknowledgment.
    #[must_use]
    pub fn ack(cmd: &str) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get command name for acknowledgment.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Query => "query",
            Self::Construct { .. } => "construct",
            Self::Upgrade { .. } => "upgrade",
            Self::DestroyTurret { .. } => "destroy_turret",
            Self::EarlyWave => "early_wave",
            Self::Hash => "hash",
            Self::Quit => "quit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick_command() {
        let cmd = Command::from_json(r#"{"cmd":"tick","count":60}"#).unwrap();
        assert_eq!(cmd, Command::Tick { count: 60 });
    }

    #[test]
    fn test_default_tick_count() {
        let cmd = Command::from_json(r#"{"cmd":"tick"}"#).unwrap();
        assert_eq!(cmd, Command::Tick { count: 1 });
    }

    #[test]
    fn test_parse_construct_command() {
        let cmd = Command::from_json(r#"{"cmd":"construct","turret":"long_range","site":2}"#)
            .unwrap();
        assert_eq!(
            cmd,
            Command::Construct {
                turret: "long_range".to_string(),
                site: 2
            }
        );
        assert_eq!(cmd.name(), "construct");
    }

    #[test]
    fn test_unit_variants_parse() {
        assert_eq!(
            Command::from_json(r#"{"cmd":"early_wave"}"#).unwrap(),
            Command::EarlyWave
        );
        assert_eq!(
            Command::from_json(r#"{"cmd":"destroy_turret","turret_id":4}"#).unwrap(),
            Command::DestroyTurret { turret_id: 4 }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Command::from_json(r#"{"cmd":"launch_nukes"}"#).is_err());
    }

    #[test]
    fn test_serialize_game_over() {
        let json = Response::GameOver {
            result: GameStatus::Defeat,
            tick: 90,
        }
        .to_json_line();
        assert!(json.contains(r#""type":"game_over""#));
        assert!(json.contains(r#""result":"defeat""#));
        assert!(json.ends_with('\n'));
    }
}
