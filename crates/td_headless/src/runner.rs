//! Headless encounter runner implementation.
//!
//! [`HeadlessRunner`] answers protocol commands against a live
//! simulation. [`run_scenario`] plays a scenario start to finish with its
//! build plan and reports a [`RunSummary`].

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use td_core::data::TurretKind;
use td_core::error::Result as CoreResult;
use td_core::events::SimEvent;
use td_core::math::Fixed;
use td_core::simulation::{Simulation, TickEvents};

use crate::protocol::{Command, GameStatus, Response, StateView};
use crate::scenario::{PlannedBuild, Scenario};

/// Runs protocol commands against one simulation.
pub struct HeadlessRunner {
    sim: Simulation,
    dt: Fixed,
    game_over_sent: bool,
}

impl HeadlessRunner {
    /// Create a runner for a scenario. The build plan is ignored; the
    /// controller places turrets itself.
    ///
    /// # Errors
    ///
    /// Fails if the scenario's encounter does not validate.
    pub fn new(scenario: &Scenario) -> CoreResult<Self> {
        Ok(Self {
            sim: Simulation::new(&scenario.encounter)?,
            dt: scenario.dt(),
            game_over_sent: false,
        })
    }

    /// The simulation being driven.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Handle one command and return the responses to send, in order.
    pub fn handle(&mut self, cmd: Command) -> Vec<Response> {
        let name = cmd.name();
        let mut responses = Vec::new();

        match cmd {
            Command::Tick { count } => {
                for _ in 0..count {
                    if GameStatus::of(&self.sim).is_over() {
                        break;
                    }
                    self.sim.tick(self.dt);
                }
                responses.push(Response::State(StateView::capture(&self.sim)));
            }
            Command::Query => {
                responses.push(Response::State(StateView::capture(&self.sim)));
            }
            Command::Construct { turret, site } => {
                let Some(kind) = TurretKind::parse(&turret) else {
                    return vec![Response::error(
                        format!("Unknown turret type: {turret}"),
                        Some(name),
                    )];
                };
                responses.push(match self.sim.construct(kind, site) {
                    Ok(turret_id) => Response::Constructed {
                        turret_id,
                        site,
                        balance: self.sim.balance(),
                    },
                    Err(e) => Response::error(e.to_string(), Some(name)),
                });
            }
            Command::Upgrade { turret_id } => {
                responses.push(match self.sim.upgrade(turret_id) {
                    Ok(level) => Response::Upgraded {
                        turret_id,
                        level,
                        balance: self.sim.balance(),
                    },
                    Err(e) => Response::error(e.to_string(), Some(name)),
                });
            }
            Command::DestroyTurret { turret_id } => {
                responses.push(if self.sim.destroy_turret(turret_id) {
                    Response::ack(name)
                } else {
                    Response::error(format!("Unknown turret: {turret_id}"), Some(name))
                });
            }
            Command::EarlyWave => {
                responses.push(match self.sim.request_early_wave() {
                    Some(bonus) => Response::EarlyWave {
                        bonus,
                        wave: self.sim.current_wave(),
                    },
                    None => Response::error("No countdown running", Some(name)),
                });
            }
            Command::Hash => {
                responses.push(Response::StateHash {
                    tick: self.sim.get_tick(),
                    hash: self.sim.state_hash(),
                });
            }
            Command::Quit => {
                responses.push(Response::Bye);
                return responses;
            }
        }

        let status = GameStatus::of(&self.sim);
        if status.is_over() && !self.game_over_sent {
            self.game_over_sent = true;
            responses.push(Response::GameOver {
                result: status,
                tick: self.sim.get_tick(),
            });
        }
        responses
    }

    /// Serve commands from `input` until `quit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from reading or writing.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        output.write_all(Response::ready(self.sim.get_tick()).to_json_line().as_bytes())?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let responses = match Command::from_json(line) {
                Ok(cmd) => {
                    tracing::debug!(cmd = cmd.name(), "Command received");
                    self.handle(cmd)
                }
                Err(e) => vec![Response::error(format!("Parse error: {e}"), None)],
            };

            let quit = responses.iter().any(|r| matches!(r, Response::Bye));
            for response in &responses {
                output.write_all(response.to_json_line().as_bytes())?;
            }
            output.flush()?;
            if quit {
                break;
            }
        }
        Ok(())
    }
}

/// How a scripted run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every wave released and every enemy gone.
    Victory,
    /// The base fell.
    Defeat,
    /// The time limit ran out first.
    Timeout,
}

/// Result of one scripted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Encounter seed.
    pub seed: u64,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Ticks simulated.
    pub ticks: u64,
    /// Game seconds simulated.
    pub elapsed_seconds: f64,
    /// Last wave reached.
    pub waves_reached: u32,
    /// Configured waves.
    pub wave_count: usize,
    /// Enemies killed.
    pub kills: u32,
    /// Enemies that reached the base.
    pub leaks: u32,
    /// Remaining base health.
    pub base_health: i32,
    /// Currency gained, including early-wave bonuses.
    pub gold_earned: i64,
    /// Currency spent on builds and upgrades.
    pub gold_spent: i64,
    /// Final balance.
    pub final_balance: i32,
    /// Planned builds that succeeded.
    pub builds_completed: u32,
    /// Planned builds or upgrades that were rejected.
    pub builds_failed: u32,
    /// State hash at the end of the run.
    pub final_hash: u64,
}

#[derive(Debug, Default)]
struct RunTally {
    kills: u32,
    leaks: u32,
    gold_earned: i64,
    gold_spent: i64,
    builds_completed: u32,
    builds_failed: u32,
}

impl RunTally {
    fn record(&mut self, events: &[SimEvent]) {
        for event in events {
            match event {
                SimEvent::UnitDied { .. } => self.kills += 1,
                SimEvent::UnitReachedBase { .. } => self.leaks += 1,
                SimEvent::GoldGained { amount } => self.gold_earned += i64::from(*amount),
                SimEvent::GoldSpent { amount } => self.gold_spent += i64::from(*amount),
                _ => {}
            }
        }
    }

    fn record_tick(&mut self, tick: &TickEvents) {
        self.record(&tick.events);
    }
}

fn execute_build(sim: &mut Simulation, build: &PlannedBuild, tally: &mut RunTally) {
    match sim.construct(build.turret, build.site) {
        Ok(turret) => {
            tally.builds_completed += 1;
            for _ in 0..build.upgrades {
                if sim.upgrade(turret).is_err() {
                    tally.builds_failed += 1;
                    break;
                }
            }
        }
        Err(e) => {
            tracing::debug!(
                turret = %build.turret,
                site = build.site,
                second = build.at_second,
                error = %e,
                "Planned build skipped"
            );
            tally.builds_failed += 1;
        }
    }
    tally.record(&sim.flush_events());
}

/// Play a scenario with its build plan until victory, defeat or timeout.
///
/// Builds scheduled for second `s` run before the first tick of that
/// second.
///
/// # Errors
///
/// Fails if the scenario's encounter does not validate.
pub fn run_scenario(scenario: &Scenario) -> CoreResult<RunSummary> {
    let mut sim = Simulation::new(&scenario.encounter)?;
    let mut tally = RunTally::default();
    tally.record(&sim.flush_events());

    let dt = scenario.dt();
    let tps = u64::from(scenario.ticks_per_second.max(1));
    let max_ticks = scenario.max_ticks();

    let outcome = loop {
        match GameStatus::of(&sim) {
            GameStatus::Victory => break RunOutcome::Victory,
            GameStatus::Defeat => break RunOutcome::Defeat,
            GameStatus::InProgress => {}
        }
        let tick = sim.get_tick();
        if tick >= max_ticks {
            break RunOutcome::Timeout;
        }
        if tick % tps == 0 {
            let second = u32::try_from(tick / tps).unwrap_or(u32::MAX);
            for build in scenario.builds_at(second) {
                execute_build(&mut sim, build, &mut tally);
            }
        }
        let events = sim.tick(dt);
        tally.record_tick(&events);
    };

    let summary = RunSummary {
        scenario: scenario.name.clone(),
        seed: sim.seed(),
        outcome,
        ticks: sim.get_tick(),
        elapsed_seconds: sim.elapsed().to_num(),
        waves_reached: sim.current_wave(),
        wave_count: sim.wave_count(),
        kills: tally.kills,
        leaks: tally.leaks,
        base_health: sim.base_health().current(),
        gold_earned: tally.gold_earned,
        gold_spent: tally.gold_spent,
        final_balance: sim.balance(),
        builds_completed: tally.builds_completed,
        builds_failed: tally.builds_failed,
        final_hash: sim.state_hash(),
    };

    tracing::info!(
        scenario = %summary.scenario,
        seed = summary.seed,
        outcome = ?summary.outcome,
        ticks = summary.ticks,
        kills = summary.kills,
        leaks = summary.leaks,
        "Run finished"
    );
    Ok(summary)
}
