//! Liveness indicator (status LED)

use std::path::PathBuf;
use tracing::debug;

/// A binary status light
pub trait Indicator: Send {
    fn set(&mut self, on: bool);
}

/// LED driven through `/sys/class/leds/<name>/brightness`
pub struct SysfsLed {
    path: PathBuf,
}

impl SysfsLed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Indicator for SysfsLed {
    fn set(&mut self, on: bool) {
        let value = if on { "1" } else { "0" };
        if let Err(e) = std::fs::write(&self.path, value) {
            debug!("LED write to {:?} failed: {}", self.path, e);
        }
    }
}

/// Indicator for boards without a status light
#[derive(Debug, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set(&mut self, _on: bool) {}
}
