//! Calibrated temperature reader
//!
//! Converts raw samples of a linear analog sensor (10 mV per degree) into
//! degrees Celsius:
//! ```text
//! corrected = raw - offset
//! volts     = corrected / full_scale * reference_volts
//! celsius   = volts * degrees_per_volt
//! ```

use super::adc::AnalogSource;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Error type for sensor operations
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid sample in {path:?}: {value:?}")]
    InvalidSample { path: PathBuf, value: String },
}

/// Linear calibration of the analog front end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Known bias of the converter, subtracted from every raw sample
    pub offset: i32,
    /// Number of distinct sample values (10-bit converter: 1024)
    pub full_scale: u32,
    /// Converter reference voltage
    pub reference_volts: f32,
    /// Sensor transfer function slope
    pub degrees_per_volt: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset: 15,
            full_scale: 1024,
            reference_volts: 3.3,
            degrees_per_volt: 100.0,
        }
    }
}

impl Calibration {
    /// Raw sample after bias correction
    pub fn corrected(&self, raw: i32) -> i32 {
        raw.saturating_sub(self.offset)
    }

    pub fn to_volts(&self, raw: i32) -> f32 {
        (self.corrected(raw) as f32 / self.full_scale as f32) * self.reference_volts
    }

    pub fn to_celsius(&self, raw: i32) -> f32 {
        self.to_volts(raw) * self.degrees_per_volt
    }
}

/// Where raw samples come from
#[derive(Debug, Clone)]
pub enum SensorSource {
    /// IIO sysfs channel file
    Sysfs { path: PathBuf },
    /// Simulated level for development
    Simulated { level: i32, jitter: i32 },
}

/// Sensor configuration
#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub source: SensorSource,
    pub calibration: Calibration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: SensorSource::Simulated {
                level: 200,
                jitter: 2,
            },
            calibration: Calibration::default(),
        }
    }
}

/// Reads calibrated temperatures from an analog source
pub struct TemperatureSensor<A: AnalogSource> {
    source: A,
    calibration: Calibration,
}

impl<A: AnalogSource> TemperatureSensor<A> {
    pub fn new(source: A, calibration: Calibration) -> Self {
        Self {
            source,
            calibration,
        }
    }

    /// Sample the source once and convert to degrees Celsius
    pub async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let raw = self.source.read_raw().await?;

        let celsius = self.calibration.to_celsius(raw);
        debug!(
            raw,
            corrected = self.calibration.corrected(raw),
            celsius,
            "Sampled {}",
            self.source.name()
        );
        Ok(celsius)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SimulatedAdc;

    #[test]
    fn test_reference_conversion() {
        let cal = Calibration::default();
        assert_eq!(cal.corrected(200), 185);

        let volts = cal.to_volts(200);
        assert!((volts - 185.0 / 1024.0 * 3.3).abs() < 1e-5);

        let celsius = cal.to_celsius(200);
        assert!((celsius - 59.619).abs() < 0.01, "got {}", celsius);
    }

    #[test]
    fn test_below_offset_goes_negative() {
        let cal = Calibration::default();
        assert_eq!(cal.corrected(0), -15);
        assert!(cal.to_celsius(0) < 0.0);
    }

    #[test]
    fn test_zero_degrees_at_offset() {
        let cal = Calibration::default();
        assert_eq!(cal.to_celsius(15), 0.0);
    }

    #[tokio::test]
    async fn test_read_temperature_applies_calibration() {
        let mut sensor =
            TemperatureSensor::new(SimulatedAdc::new(200, 0), Calibration::default());
        let celsius = sensor.read_temperature().await.unwrap();
        assert!((celsius - 59.619).abs() < 0.01);

        let hot = Calibration {
            reference_volts: 5.0,
            ..Calibration::default()
        };
        let mut sensor = TemperatureSensor::new(SimulatedAdc::new(200, 0), hot);
        let celsius = sensor.read_temperature().await.unwrap();
        assert!((celsius - 90.332).abs() < 0.01, "got {}", celsius);
    }
}
