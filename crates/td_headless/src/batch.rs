//! Batch encounter runner for balance testing.
//!
//! Runs one scenario across many seeds in parallel using rayon and
//! aggregates the outcomes.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::runner::{run_scenario, RunOutcome, RunSummary};
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Built-in scenario name or RON path
    pub scenario: String,
    /// Number of runs
    pub run_count: u32,
    /// Maximum parallel runs (0 = use rayon default)
    pub parallel_runs: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Seed of the first run; run `i` uses `seed_start + i`
    pub seed_start: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "standard".to_string(),
            run_count: 100,
            parallel_runs: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    #[must_use]
    pub fn new(scenario: &str, run_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            run_count,
            ..Default::default()
        }
    }

    /// Set output directory
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }
}

/// Aggregate outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Runs that finished.
    pub total_runs: u32,
    /// Runs that ended in victory.
    pub victories: u32,
    /// Runs that ended with the base destroyed.
    pub defeats: u32,
    /// Runs that hit the time limit.
    pub timeouts: u32,
    /// Fraction of runs won.
    pub victory_rate: f64,
    /// Mean kills per run.
    pub avg_kills: f64,
    /// Mean leaks per run.
    pub avg_leaks: f64,
    /// Mean base health left at the end.
    pub avg_base_health: f64,
    /// Mean run length in game seconds.
    pub avg_elapsed_seconds: f64,
}

impl BatchSummary {
    /// Summarize a set of runs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_runs(runs: &[RunSummary]) -> Self {
        let mut summary = Self {
            total_runs: u32::try_from(runs.len()).unwrap_or(u32::MAX),
            ..Self::default()
        };
        if runs.is_empty() {
            return summary;
        }

        for run in runs {
            match run.outcome {
                RunOutcome::Victory => summary.victories += 1,
                RunOutcome::Defeat => summary.defeats += 1,
                RunOutcome::Timeout => summary.timeouts += 1,
            }
        }

        let n = runs.len() as f64;
        let mean = |f: fn(&RunSummary) -> f64| runs.iter().map(f).sum::<f64>() / n;
        summary.victory_rate = f64::from(summary.victories) / n;
        summary.avg_kills = mean(|r| f64::from(r.kills));
        summary.avg_leaks = mean(|r| f64::from(r.leaks));
        summary.avg_base_health = mean(|r| f64::from(r.base_health));
        summary.avg_elapsed_seconds = mean(|r| r.elapsed_seconds);
        summary
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual run summaries, in seed order
    pub runs: Vec<RunSummary>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total wall-clock runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    ///
    /// # Errors
    ///
    /// Returns any I/O or serialization error.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    ///
    /// # Errors
    ///
    /// Returns any I/O or deserialization error.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Run index
    pub run_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Run a batch of seeds
///
/// A scenario that cannot be resolved is reported once per run in
/// `errors`.
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        "Starting batch run: {} runs of '{}'",
        config.run_count, config.scenario
    );

    if config.parallel_runs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_runs as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let scenario = Scenario::resolve(&config.scenario).map_err(|e| e.to_string());

    let results: Vec<Result<RunSummary, BatchError>> = (0..config.run_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            let outcome = scenario.clone().and_then(|scenario| {
                run_scenario(&scenario.with_seed(seed)).map_err(|e| e.to_string())
            });
            match outcome {
                Ok(summary) => {
                    debug!(run = i, seed, outcome = ?summary.outcome, "Run complete");
                    Ok(summary)
                }
                Err(message) => {
                    warn!("Run {} failed: {}", i, message);
                    Err(BatchError {
                        run_index: i,
                        seed,
                        message,
                    })
                }
            }
        })
        .collect();

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<RunSummary> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_runs(&runs);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} runs in {:.1}s ({} victories, {} defeats, {} timeouts)",
        runs.len(),
        duration_seconds,
        summary.victories,
        summary.defeats,
        summary.timeouts
    );

    BatchResults {
        config,
        runs,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed multiple times.
///
/// Every run must end on the same tick with the same state hash.
#[must_use]
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> bool {
    let scenario = scenario.clone().with_seed(seed);
    let results: Vec<(u64, u64)> = (0..runs)
        .into_par_iter()
        .filter_map(|_| run_scenario(&scenario).ok())
        .map(|summary| (summary.ticks, summary.final_hash))
        .collect();

    if results.len() != runs as usize {
        warn!("Scenario '{}' failed to run", scenario.name);
        return false;
    }
    results.windows(2).all(|w| w[0] == w[1])
}
