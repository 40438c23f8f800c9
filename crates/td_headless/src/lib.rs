//! Headless encounter runner for balance sweeps and CI verification.
//!
//! This crate drives a [`td_core::simulation::Simulation`] without any
//! front end:
//!
//! - **Interactive**: a controller speaks JSON lines on stdin/stdout
//! - **Run**: simulate one encounter with a scripted build plan
//! - **Batch**: sweep many seeds in parallel and summarize outcomes
//! - **Verify**: run one seed repeatedly and compare state hashes
//!
//! # Protocol
//!
//! - **stdin**: Commands from controller (tick, construct, upgrade, etc.)
//! - **stdout**: State updates and responses (JSON)
//! - **stderr**: Debug logs (human-readable)
//!
//! See [`protocol`] module for the full command/response specification.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"tick","count":16}' | cargo run -p td_headless -- interactive
//!
//! # Run a scenario for two minutes of game time
//! cargo run -p td_headless -- run --scenario crates/td_headless/encounters/crossroads.ron
//!
//! # Verify determinism
//! cargo run -p td_headless -- verify --seed 42 --runs 5
//! ```

pub mod batch;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, BatchSummary};
pub use protocol::{Command, Response};
pub use runner::{run_scenario, HeadlessRunner, RunOutcome, RunSummary};
pub use scenario::{PlannedBuild, Scenario, ScenarioError};
