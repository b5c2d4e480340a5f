//! Network link management for the measurement loop
//!
//! This module handles:
//! - Link bring-up (optional Wi-Fi association, reachability probe)
//! - Startup retries with exponential backoff
//! - The liveness indicator shown while the link is down

mod indicator;
mod link;
mod startup;

pub use indicator::{Indicator, NoIndicator, SysfsLed};
pub use link::{Link, LinkConfig, LinkError, WifiCredentials, WifiLink};
pub use startup::{bring_up_link, start_clock, Backoff, RetryPolicy};
