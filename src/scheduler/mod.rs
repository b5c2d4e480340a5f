//! Measurement loop
//!
//! Polls the clock every 100 ms (`POLL_SLICE_MS`) and, when a tick is due,
//! runs one read → build → deliver cycle.

mod runner;

pub use runner::{ScheduleConfig, Scheduler, TickError, TickOutcome, TickReport};
