//! Cooperative round scheduler.
//!
//! A single logical thread of control advances every selected, active
//! instance by exactly one round per tick, in discovery order. Rounds are
//! atomic from the scheduler's perspective: `pause` stops future ticks but
//! cannot abort a round in flight.
//!
//! Each instance's round runs inside its own fault boundary: a failing
//! instance is reported and deactivated without halting the others.
//! Convergence clears the instance's selection and pauses the scheduler so
//! the operator sees the event.

use std::time::{Duration, Instant};

use crate::instance::{Instance, RoundOutcome};

/// Fixed tick cadence. The idle estimate is diagnostic only and never feeds
/// back into scheduling.
pub const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Operator-facing scheduler state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Paused,
}

/// Marker for an armed cadence timer. At most one exists at a time.
struct TickTimer {
    period: Duration,
}

/// What one tick did, instance by instance, in processing order.
pub struct TickReport {
    /// (instance index, outcome) for every instance processed this tick
    pub outcomes: Vec<(usize, RoundOutcome)>,
    /// Wall-clock duration of the tick
    pub elapsed: Duration,
    /// True if this tick paused the scheduler (an instance converged)
    pub paused: bool,
}

/// Timer-driven loop over a fixed set of instances.
pub struct RoundScheduler {
    instances: Vec<Instance>,
    selected: Vec<bool>,
    timer: Option<TickTimer>,
    state: SchedulerState,
    idle_avg: f64,
}

impl RoundScheduler {
    /// Starts in `Paused` with every instance selected and a full idle
    /// estimate.
    pub fn new(instances: Vec<Instance>) -> Self {
        let selected = vec![true; instances.len()];
        Self {
            instances,
            selected,
            timer: None,
            state: SchedulerState::Paused,
            idle_avg: 100.0,
        }
    }

    /// Arms the cadence timer and flips to `Running`. Idempotent: a second
    /// `resume` while already armed changes nothing.
    pub fn resume(&mut self) {
        if self.timer.is_none() {
            self.timer = Some(TickTimer { period: TICK_PERIOD });
        }
        self.state = SchedulerState::Running;
    }

    /// Disarms the timer and flips to `Paused`. Idempotent.
    pub fn pause(&mut self) {
        self.timer = None;
        self.state = SchedulerState::Paused;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// Number of armed timers; always 0 or 1.
    pub fn timer_count(&self) -> usize {
        usize::from(self.timer.is_some())
    }

    /// The armed cadence, or the fixed default when paused.
    pub fn tick_period(&self) -> Duration {
        self.timer.as_ref().map_or(TICK_PERIOD, |t| t.period)
    }

    /// Exponentially weighted idle estimate in percent. Advisory only.
    pub fn idle_percent(&self) -> f64 {
        self.idle_avg
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    /// Operator selection toggle, independent of `active`/`converged`.
    pub fn set_selected(&mut self, index: usize, selected: bool) {
        if let Some(flag) = self.selected.get_mut(index) {
            *flag = selected;
        }
    }

    /// True once no selected instance can still make progress.
    pub fn all_settled(&self) -> bool {
        !self
            .instances
            .iter()
            .zip(&self.selected)
            .any(|(instance, &selected)| selected && instance.active())
    }

    /// One timer firing: advances every selected, active instance by exactly
    /// one round, in discovery order. No-op while paused.
    pub fn tick(&mut self) -> TickReport {
        if self.state == SchedulerState::Paused {
            return TickReport { outcomes: Vec::new(), elapsed: Duration::ZERO, paused: false };
        }

        let start = Instant::now();
        let mut outcomes = Vec::new();
        let mut pause_after = false;

        for index in 0..self.instances.len() {
            if !self.selected[index] || !self.instances[index].active() {
                continue;
            }
            // Per-instance fault boundary: the outcome is tagged, never
            // propagated across instances.
            let outcome = self.instances[index].run_round();
            if outcome == RoundOutcome::Converged {
                self.selected[index] = false;
                pause_after = true;
            }
            outcomes.push((index, outcome));
        }

        if pause_after {
            self.pause();
        }

        let elapsed = start.elapsed();
        if self.timer.is_some() {
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            self.idle_avg = 0.9 * self.idle_avg + 0.1 * (100.0 - elapsed_ms);
        }

        TickReport { outcomes, elapsed, paused: pause_after }
    }
}
