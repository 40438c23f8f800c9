//! Wave scheduling.
//!
//! ```text
//! Idle -> Spawning -> Countdown -> Spawning -> ... -> Completed
//! ```
//!
//! The scheduler decides *when* and *what* to spawn; the simulation picks
//! the spawn point and creates the units. Every timer is an explicit
//! field, so replacing a phase cancels its timer.

use serde::{Deserialize, Serialize};

use crate::data::{SchedulerSettings, UnitKind, WaveData};
use crate::events::{EventBus, SimEvent};
use crate::math::{fixed_serde, Fixed};

/// Progress through a wave's spawn groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnCursor {
    group: usize,
    spawned_in_group: u32,
    #[serde(with = "fixed_serde")]
    cooldown: Fixed,
}

/// Scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerPhase {
    /// Waiting for the first wave.
    Idle,
    /// Releasing the current wave.
    Spawning(SpawnCursor),
    /// Waiting between waves.
    Countdown {
        /// Seconds until the next wave.
        #[serde(with = "fixed_serde")]
        remaining: Fixed,
    },
    /// Every wave has been released.
    Completed,
}

/// Outcome of starting a wave early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarlyStart {
    /// Currency earned for the skipped seconds.
    pub bonus: i32,
    /// Units the new wave released immediately.
    pub spawns: Vec<UnitKind>,
}

/// Drives the configured waves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveScheduler {
    waves: Vec<WaveData>,
    #[serde(with = "fixed_serde")]
    time_until_next_wave: Fixed,
    bonus_per_second: i32,
    phase: SchedulerPhase,
    current_wave: Option<usize>,
}

impl WaveScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new(waves: Vec<WaveData>, settings: SchedulerSettings) -> Self {
        Self {
            waves,
            time_until_next_wave: settings.time_until_next_wave,
            bonus_per_second: settings.bonus_per_second,
            phase: SchedulerPhase::Idle,
            current_wave: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// 1-based number of the most recently started wave, 0 before the first.
    #[must_use]
    pub fn current_wave(&self) -> u32 {
        self.current_wave
            .map_or(0, |index| u32::try_from(index + 1).unwrap_or(u32::MAX))
    }

    /// Number of configured waves.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Seconds left in the countdown, if one is running.
    #[must_use]
    pub const fn countdown_remaining(&self) -> Option<Fixed> {
        match self.phase {
            SchedulerPhase::Countdown { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Whether every wave has been released.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.phase, SchedulerPhase::Completed)
    }

    /// Start the first wave. No-op unless idle.
    pub fn start(&mut self, bus: &mut EventBus) -> Vec<UnitKind> {
        if !matches!(self.phase, SchedulerPhase::Idle) {
            return Vec::new();
        }
        self.begin_wave(0, bus)
    }

    /// Advance timers by `dt`, returning the units to spawn this tick.
    pub fn tick(&mut self, dt: Fixed, bus: &mut EventBus) -> Vec<UnitKind> {
        match self.phase {
            SchedulerPhase::Idle | SchedulerPhase::Completed => Vec::new(),
            SchedulerPhase::Spawning(mut cursor) => {
                cursor.cooldown -= dt;
                let mut spawns = Vec::new();
                self.release_due(&mut cursor, &mut spawns, bus);
                spawns
            }
            SchedulerPhase::Countdown { remaining } => {
                let remaining = (remaining - dt).max(Fixed::ZERO);
                if remaining > Fixed::ZERO {
                    self.phase = SchedulerPhase::Countdown { remaining };
                    bus.emit(SimEvent::CountdownTick { remaining });
                    return Vec::new();
                }
                bus.emit(SimEvent::CountdownTick {
                    remaining: Fixed::ZERO,
                });
                let next = self.next_wave_index();
                self.begin_wave(next, bus)
            }
        }
    }

    /// Skip the rest of the countdown for a bonus.
    ///
    /// Returns `None` (and changes nothing) outside `Countdown`.
    pub fn request_early_wave(&mut self, bus: &mut EventBus) -> Option<EarlyStart> {
        let SchedulerPhase::Countdown { remaining } = self.phase else {
            return None;
        };
        let whole_seconds = remaining.floor().to_num::<i32>();
        let bonus = whole_seconds.saturating_mul(self.bonus_per_second).max(0);
        tracing::debug!(remaining = %remaining, bonus, "Early wave requested");

        bus.emit(SimEvent::CountdownTick {
            remaining: Fixed::ZERO,
        });
        let next = self.next_wave_index();
        let spawns = self.begin_wave(next, bus);
        Some(EarlyStart { bonus, spawns })
    }

    /// Start the next wave now, cancelling any countdown or in-flight
    /// spawn sequence. No-op once completed or when no wave remains.
    pub fn trigger_next_wave(&mut self, bus: &mut EventBus) -> Vec<UnitKind> {
        if self.is_completed() {
            return Vec::new();
        }
        let next = self.next_wave_index();
        if next >= self.waves.len() {
            return Vec::new();
        }
        if matches!(self.phase, SchedulerPhase::Countdown { .. }) {
            bus.emit(SimEvent::CountdownTick {
                remaining: Fixed::ZERO,
            });
        }
        self.begin_wave(next, bus)
    }

    fn next_wave_index(&self) -> usize {
        self.current_wave.map_or(0, |index| index + 1)
    }

    fn begin_wave(&mut self, index: usize, bus: &mut EventBus) -> Vec<UnitKind> {
        if index >= self.waves.len() {
            self.complete(bus);
            return Vec::new();
        }
        self.current_wave = Some(index);
        let wave = self.current_wave();
        tracing::info!(wave, "Wave started");
        bus.emit(SimEvent::WaveStarted { wave });

        let mut cursor = SpawnCursor {
            group: 0,
            spawned_in_group: 0,
            cooldown: Fixed::ZERO,
        };
        let mut spawns = Vec::new();
        self.release_due(&mut cursor, &mut spawns, bus);
        spawns
    }

    /// Spawn every unit whose cooldown has elapsed, then store the cursor
    /// or move on to the countdown.
    fn release_due(
        &mut self,
        cursor: &mut SpawnCursor,
        spawns: &mut Vec<UnitKind>,
        bus: &mut EventBus,
    ) {
        let exhausted = match self.current_wave.and_then(|index| self.waves.get(index)) {
            Some(wave) => {
                let interval = if wave.spawn_rate > Fixed::ZERO {
                    Fixed::ONE / wave.spawn_rate
                } else {
                    Fixed::ZERO
                };
                let mut exhausted = false;
                while cursor.cooldown <= Fixed::ZERO {
                    match next_in_wave(wave, cursor) {
                        Some(kind) => {
                            spawns.push(kind);
                            cursor.cooldown += interval;
                        }
                        None => {
                            exhausted = true;
                            break;
                        }
                    }
                }
                exhausted || next_in_wave(wave, &mut cursor.clone()).is_none()
            }
            None => true,
        };

        if exhausted {
            self.finish_spawning(bus);
        } else {
            self.phase = SchedulerPhase::Spawning(*cursor);
        }
    }

    fn finish_spawning(&mut self, bus: &mut EventBus) {
        if self.next_wave_index() < self.waves.len() {
            self.phase = SchedulerPhase::Countdown {
                remaining: self.time_until_next_wave,
            };
        } else {
            self.complete(bus);
        }
    }

    fn complete(&mut self, bus: &mut EventBus) {
        if self.is_completed() {
            return;
        }
        self.phase = SchedulerPhase::Completed;
        tracing::info!("All waves released");
        bus.emit(SimEvent::WavesCompleted);
    }
}

/// Take the next unit from the cursor, skipping exhausted groups.
fn next_in_wave(wave: &WaveData, cursor: &mut SpawnCursor) -> Option<UnitKind> {
    loop {
        let group = wave.groups.get(cursor.group)?;
        if cursor.spawned_in_group < group.count {
            cursor.spawned_in_group += 1;
            return Some(group.kind);
        }
        cursor.group += 1;
        cursor.spawned_in_group = 0;
    }
}
