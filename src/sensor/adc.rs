//! Analog sample sources

use super::{SensorError, SensorSource};
use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// A source of raw analog samples
#[async_trait]
pub trait AnalogSource: Send {
    /// Read one raw sample in the converter's native range
    async fn read_raw(&mut self) -> Result<i32, SensorError>;

    /// Human-readable name for this source
    fn name(&self) -> &'static str;
}

/// ADC channel exposed through Linux IIO sysfs (`in_voltageN_raw`)
pub struct SysfsAdc {
    path: PathBuf,
}

impl SysfsAdc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AnalogSource for SysfsAdc {
    async fn read_raw(&mut self) -> Result<i32, SensorError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SensorError::Io {
                path: self.path.clone(),
                source,
            })?;

        content
            .trim()
            .parse()
            .map_err(|_| SensorError::InvalidSample {
                path: self.path.clone(),
                value: content.trim().to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }
}

/// Simulated converter producing a fixed level with optional jitter
pub struct SimulatedAdc {
    level: i32,
    jitter: i32,
    rng: SmallRng,
}

impl SimulatedAdc {
    pub fn new(level: i32, jitter: i32) -> Self {
        Self {
            level,
            jitter: jitter.abs(),
            rng: SmallRng::seed_from_u64(level as u64),
        }
    }
}

#[async_trait]
impl AnalogSource for SimulatedAdc {
    async fn read_raw(&mut self) -> Result<i32, SensorError> {
        if self.jitter == 0 {
            return Ok(self.level);
        }
        Ok(self.level + self.rng.gen_range(-self.jitter..=self.jitter))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Sample source selected at startup
pub enum HostAdc {
    Sysfs(SysfsAdc),
    Simulated(SimulatedAdc),
}

impl HostAdc {
    pub fn from_source(source: &SensorSource) -> Self {
        match source {
            SensorSource::Sysfs { path } => HostAdc::Sysfs(SysfsAdc::new(path)),
            SensorSource::Simulated { level, jitter } => {
                HostAdc::Simulated(SimulatedAdc::new(*level, *jitter))
            }
        }
    }
}

#[async_trait]
impl AnalogSource for HostAdc {
    async fn read_raw(&mut self) -> Result<i32, SensorError> {
        match self {
            HostAdc::Sysfs(adc) => adc.read_raw().await,
            HostAdc::Simulated(adc) => adc.read_raw().await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            HostAdc::Sysfs(adc) => adc.name(),
            HostAdc::Simulated(adc) => adc.name(),
        }
    }
}
