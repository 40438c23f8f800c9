//! Headless tower-defense runner.
//!
//! Runs encounters without graphics, either scripted from a scenario's
//! build plan or controlled via JSON on stdin/stdout.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p td_headless
//!
//! # Play one scenario with its build plan
//! cargo run -p td_headless -- run --scenario standard --seed 3
//!
//! # Sweep seeds for balance testing
//! cargo run -p td_headless -- batch --scenario standard --count 1000 --output results/
//!
//! # Check a scenario file
//! cargo run -p td_headless -- validate crates/td_headless/encounters/crossroads.ron
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON commands, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information

use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use td_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{run_scenario, HeadlessRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "td_headless")]
#[command(about = "Headless tower-defense runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve protocol commands on stdin/stdout
    Interactive {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard")]
        scenario: String,

        /// Override the encounter seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Play one scenario with its build plan
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard")]
        scenario: String,

        /// Override the encounter seed
        #[arg(long)]
        seed: Option<u64>,

        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Run a scenario across many seeds for balance testing
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard")]
        scenario: String,

        /// Number of runs
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel runs (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Verify determinism by running same seed multiple times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Check a scenario file without running it
    Validate {
        /// Scenario RON file
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for protocol
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Some(Commands::Interactive { scenario, seed }) => cmd_interactive(&scenario, seed),
        Some(Commands::Run {
            scenario,
            seed,
            json,
        }) => cmd_run(&scenario, seed, json),
        Some(Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
        }) => cmd_batch(scenario, count, parallel, output, seed),
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
        }) => cmd_verify(&scenario, seed, runs),
        Some(Commands::Validate { path }) => cmd_validate(&path),
        None => cmd_interactive("standard", None),
    }
}

/// Resolve a scenario or exit.
fn load_scenario(name: &str, seed: Option<u64>) -> Scenario {
    match Scenario::resolve(name) {
        Ok(scenario) => match seed {
            Some(seed) => scenario.with_seed(seed),
            None => scenario,
        },
        Err(e) => {
            tracing::error!(scenario = name, error = %e, "Failed to load scenario");
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

/// Serve protocol commands on stdin/stdout
fn cmd_interactive(scenario: &str, seed: Option<u64>) {
    let scenario = load_scenario(scenario, seed);
    tracing::info!(scenario = %scenario.name, "Starting interactive session");

    let mut runner = match HeadlessRunner::new(&scenario) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runner.run(io::stdin().lock(), io::stdout().lock()) {
        tracing::error!(error = %e, "Session I/O failed");
        std::process::exit(1);
    }
    tracing::info!("Session ended");
}

/// Play one scenario with its build plan
fn cmd_run(scenario: &str, seed: Option<u64>, json: bool) {
    let scenario = load_scenario(scenario, seed);
    let summary = match run_scenario(&scenario) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("FATAL: Failed to serialize summary: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("RUN COMPLETE: {} (seed {})", summary.scenario, summary.seed);
    eprintln!("{}", "=".repeat(50));
    eprintln!("Outcome: {:?}", summary.outcome);
    eprintln!(
        "Waves: {}/{}  Time: {:.1}s  Ticks: {}",
        summary.waves_reached, summary.wave_count, summary.elapsed_seconds, summary.ticks
    );
    eprintln!("Kills: {}  Leaks: {}", summary.kills, summary.leaks);
    eprintln!("Base health: {}", summary.base_health);
    eprintln!(
        "Gold: +{} / -{}  (final {})",
        summary.gold_earned, summary.gold_spent, summary.final_balance
    );
    eprintln!(
        "Builds: {} placed, {} rejected",
        summary.builds_completed, summary.builds_failed
    );
    eprintln!("State hash: {:016x}", summary.final_hash);
}

/// Run a scenario across many seeds for balance testing
fn cmd_batch(scenario: String, count: u32, parallel: u32, output: PathBuf, seed: u64) {
    tracing::info!(
        scenario = %scenario,
        count,
        parallel,
        seed,
        output = %output.display(),
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        std::process::exit(1);
    }

    let config = BatchConfig {
        scenario,
        run_count: count,
        parallel_runs: parallel,
        output_dir: output.clone(),
        seed_start: seed,
    };
    let results = run_batch(config);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {e}");
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Runs: {}", summary.total_runs);
    if !results.errors.is_empty() {
        eprintln!("Runs FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Victories: {} ({:.1}%)  Defeats: {}  Timeouts: {}",
        summary.victories,
        summary.victory_rate * 100.0,
        summary.defeats,
        summary.timeouts
    );
    eprintln!(
        "Avg kills: {:.1}  Avg leaks: {:.1}  Avg base health: {:.1}",
        summary.avg_kills, summary.avg_leaks, summary.avg_base_health
    );

    for error in results.errors.iter().take(10) {
        eprintln!(
            "  Run {} (seed {}): {}",
            error.run_index, error.seed, error.message
        );
    }
    if results.errors.len() > 10 {
        eprintln!("  ... and {} more failures", results.errors.len() - 10);
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism by running same seed multiple times
fn cmd_verify(scenario: &str, seed: u64, runs: u32) {
    let scenario = load_scenario(scenario, None);
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    if verify_determinism(&scenario, seed, runs) {
        eprintln!("PASS: All {runs} runs produced identical results");
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        std::process::exit(1);
    }
}

/// Check a scenario file without running it
fn cmd_validate(path: &Path) {
    match Scenario::load(path) {
        Ok(scenario) => {
            eprintln!(
                "OK: '{}' ({} waves, {} sites, {} planned builds)",
                scenario.name,
                scenario.encounter.waves.len(),
                scenario.encounter.sites.len(),
                scenario.build_plan.len()
            );
        }
        Err(e) => {
            eprintln!("INVALID: {e}");
            std::process::exit(1);
        }
    }
}
