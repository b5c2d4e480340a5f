//! One-time startup: link bring-up and first clock sync
//!
//! Both steps are retried with exponential backoff. With no attempt limit
//! the agent waits for the network indefinitely; with a limit, running out
//! of attempts is fatal and the supervisor restarts the process.

use super::indicator::Indicator;
use super::link::Link;
use crate::clock::ClockSource;
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Indicator blink pattern while the link is down
const BLINK_ON: Duration = Duration::from_millis(100);
const BLINK_OFF: Duration = Duration::from_millis(250);

/// Retry schedule for startup steps
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many failed attempts, `None` to retry forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Exponential backoff state for one startup step
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        let delay = policy.initial_delay;
        Self {
            policy,
            failures: 0,
            delay,
        }
    }

    /// Record a failure; returns the wait before the next attempt, or
    /// `None` once the attempt budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if let Some(max) = self.policy.max_attempts {
            if self.failures >= max {
                return None;
            }
        }

        let delay = self.delay;
        self.delay = std::cmp::min(self.delay * 2, self.policy.max_delay);
        Some(delay)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

async fn blink_for(indicator: &mut dyn Indicator, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        indicator.set(true);
        sleep(BLINK_ON).await;
        indicator.set(false);
        sleep(BLINK_OFF).await;
    }
}

/// Bring the link up, blinking the indicator between attempts
pub async fn bring_up_link<L: Link>(
    link: &mut L,
    indicator: &mut dyn Indicator,
    policy: &RetryPolicy,
) -> Result<()> {
    info!("Connecting to network ({})", link.describe());
    let mut backoff = Backoff::new(policy.clone());

    loop {
        match link.connect().await {
            Ok(()) => {
                indicator.set(true);
                info!("Network up after {} failed attempts", backoff.failures());
                return Ok(());
            }
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!("Network not ready: {} (retrying in {:?})", e, delay);
                    blink_for(indicator, delay).await;
                }
                None => {
                    indicator.set(false);
                    return Err(anyhow!(
                        "Network not up after {} attempts: {}",
                        backoff.failures(),
                        e
                    ));
                }
            },
        }
    }
}

/// Start the clock and complete its first synchronization
pub async fn start_clock<C: ClockSource>(clock: &mut C, policy: &RetryPolicy) -> Result<()> {
    let mut backoff = Backoff::new(policy.clone());

    loop {
        let result = match clock.begin().await {
            Ok(()) => clock.resync().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("Clock synced, epoch {}", clock.now());
                return Ok(());
            }
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!("Clock sync failed: {} (retrying in {:?})", e, delay);
                    sleep(delay).await;
                }
                None => {
                    return Err(anyhow!(
                        "Clock not synced after {} attempts: {}",
                        backoff.failures(),
                        e
                    ));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockError;
    use crate::connection::link::LinkError;
    use async_trait::async_trait;

    struct FlakyLink {
        failures_left: u32,
        attempts: u32,
    }

    #[async_trait]
    impl Link for FlakyLink {
        async fn connect(&mut self) -> Result<(), LinkError> {
            self.attempts += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(LinkError::Unreachable {
                    addr: "collector:443".into(),
                    reason: "network down".into(),
                });
            }
            Ok(())
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    #[derive(Default)]
    struct RecordingIndicator {
        states: Vec<bool>,
    }

    impl Indicator for RecordingIndicator {
        fn set(&mut self, on: bool) {
            self.states.push(on);
        }
    }

    struct FlakyClock {
        failures_left: u32,
        begun: bool,
    }

    #[async_trait]
    impl ClockSource for FlakyClock {
        async fn begin(&mut self) -> Result<(), ClockError> {
            self.begun = true;
            Ok(())
        }

        async fn resync(&mut self) -> Result<(), ClockError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ClockError::Timeout(Duration::from_secs(2)));
            }
            Ok(())
        }

        fn now(&self) -> u32 {
            100
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: None,
        });
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_backoff_budget() {
        let mut backoff = Backoff::new(RetryPolicy {
            max_attempts: Some(3),
            ..Default::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_retries_until_up() {
        let mut link = FlakyLink {
            failures_left: 3,
            attempts: 0,
        };
        let mut indicator = RecordingIndicator::default();

        bring_up_link(&mut link, &mut indicator, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(link.attempts, 4);
        // Blinked while waiting, steady on once connected
        assert!(indicator.states.len() > 2);
        assert!(indicator.states.contains(&false));
        assert_eq!(indicator.states.last(), Some(&true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_gives_up_after_budget() {
        let mut link = FlakyLink {
            failures_left: u32::MAX,
            attempts: 0,
        };
        let mut indicator = RecordingIndicator::default();
        let policy = RetryPolicy {
            max_attempts: Some(2),
            ..Default::default()
        };

        assert!(bring_up_link(&mut link, &mut indicator, &policy).await.is_err());
        assert_eq!(link.attempts, 2);
        assert_eq!(indicator.states.last(), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_retries_first_sync() {
        let mut clock = FlakyClock {
            failures_left: 2,
            begun: false,
        };
        start_clock(&mut clock, &RetryPolicy::default()).await.unwrap();
        assert!(clock.begun);
        assert_eq!(clock.failures_left, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_gives_up_after_budget() {
        let mut clock = FlakyClock {
            failures_left: 10,
            begun: false,
        };
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };
        assert!(start_clock(&mut clock, &policy).await.is_err());
        assert_eq!(clock.failures_left, 7);
    }
}
