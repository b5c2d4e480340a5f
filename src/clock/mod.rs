//! Wall-clock time source
//!
//! The scheduler only needs epoch seconds and a way to ask for a
//! resynchronization. Two host implementations exist:
//! - `SntpClock`: queries an SNTP server and keeps an offset to the local clock
//! - `SystemClock`: trusts the operating system (chrony, systemd-timesyncd)

mod sntp;

pub use sntp::SntpClock;

use async_trait::async_trait;
use std::time::Duration;
use thermolog_shared::{defaults, now_secs};
use thiserror::Error;

/// Errors raised while synchronizing time
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("Clock not started")]
    NotStarted,

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve time server {0}")]
    Resolve(String),

    #[error("Time server did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0} bytes")]
    InvalidResponse(usize),

    #[error("Time server returned an unusable timestamp")]
    InvalidTimestamp,
}

/// Source of epoch time for the measurement loop
#[async_trait]
pub trait ClockSource: Send {
    /// One-time setup before the first sync
    async fn begin(&mut self) -> Result<(), ClockError>;

    /// Resynchronize against the time authority
    async fn resync(&mut self) -> Result<(), ClockError>;

    /// Current time in seconds since the Unix epoch
    fn now(&self) -> u32;
}

/// How the agent obtains wall-clock time
#[derive(Debug, Clone)]
pub enum ClockMode {
    /// Query an SNTP server directly (`host:port`)
    Sntp { server: String },
    /// Use the operating system clock as is
    System,
}

/// Clock configuration
#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub mode: ClockMode,
    /// Minimum spacing between two network queries
    pub resync_interval: Duration,
    /// Deadline for a single query
    pub query_timeout: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: ClockMode::Sntp {
                server: "pool.ntp.org:123".into(),
            },
            resync_interval: Duration::from_secs(defaults::CLOCK_RESYNC_INTERVAL_SECS),
            query_timeout: Duration::from_secs(2),
        }
    }
}

/// Operating system clock, assumed to be kept in sync externally
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl ClockSource for SystemClock {
    async fn begin(&mut self) -> Result<(), ClockError> {
        Ok(())
    }

    async fn resync(&mut self) -> Result<(), ClockError> {
        Ok(())
    }

    fn now(&self) -> u32 {
        now_secs()
    }
}

/// Clock selected at startup
pub enum HostClock {
    Sntp(SntpClock),
    System(SystemClock),
}

impl HostClock {
    pub fn from_config(config: &ClockConfig) -> Self {
        match &config.mode {
            ClockMode::Sntp { server } => HostClock::Sntp(SntpClock::new(
                server.clone(),
                config.resync_interval,
                config.query_timeout,
            )),
            ClockMode::System => HostClock::System(SystemClock),
        }
    }
}

#[async_trait]
impl ClockSource for HostClock {
    async fn begin(&mut self) -> Result<(), ClockError> {
        match self {
            HostClock::Sntp(clock) => clock.begin().await,
            HostClock::System(clock) => clock.begin().await,
        }
    }

    async fn resync(&mut self) -> Result<(), ClockError> {
        match self {
            HostClock::Sntp(clock) => clock.resync().await,
            HostClock::System(clock) => clock.resync().await,
        }
    }

    fn now(&self) -> u32 {
        match self {
            HostClock::Sntp(clock) => clock.now(),
            HostClock::System(clock) => clock.now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_clock() {
        let mut clock = HostClock::from_config(&ClockConfig {
            mode: ClockMode::System,
            ..Default::default()
        });
        clock.begin().await.unwrap();
        clock.resync().await.unwrap();
        assert!(clock.now() >= now_secs().saturating_sub(1));
    }
}
