//! Sampling schedule state machine
//!
//! Two phases: `Idle` while waiting for the due time, `Tick` while a
//! sample is being read and delivered. The next due time is always measured
//! from the moment the tick fired, so late ticks push the schedule back and
//! the loop never runs faster than the interval.

use thiserror::Error;

/// Errors raised when configuring the schedule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Sampling interval must be at least one second")]
    ZeroInterval,
}

/// Current phase of the measurement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the next due time
    Idle,
    /// Sampling and delivering
    Tick,
}

/// Due-time bookkeeping owned by the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerState {
    next_due: u32,
    interval_secs: u32,
    phase: Phase,
}

impl SchedulerState {
    /// Create a schedule whose first tick is due immediately
    pub fn new(interval_secs: u32) -> Result<Self, ScheduleError> {
        if interval_secs == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        Ok(Self {
            next_due: 0,
            interval_secs,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn next_due(&self) -> u32 {
        self.next_due
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    /// Check whether a tick is due at `now`
    pub fn is_due(&self, now: u32) -> bool {
        self.phase == Phase::Idle && now >= self.next_due
    }

    /// Enter `Tick` if due, advancing the due time from `now`
    ///
    /// Returns the sampling time on success, `None` if the loop stays idle.
    pub fn begin_tick(&mut self, now: u32) -> Option<u32> {
        if !self.is_due(now) {
            return None;
        }
        self.next_due = now.saturating_add(self.interval_secs);
        self.phase = Phase::Tick;
        Some(now)
    }

    /// Return to `Idle` once the tick has finished, successful or not
    pub fn end_tick(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Seconds left until the next tick, zero when already due
    pub fn secs_until_due(&self, now: u32) -> u32 {
        self.next_due.saturating_sub(now)
    }
}
