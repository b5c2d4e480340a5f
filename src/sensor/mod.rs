//! Temperature sensing
//!
//! This module handles:
//! - Raw analog sample sources (Linux IIO sysfs, simulation)
//! - Calibration of raw samples into degrees Celsius

mod adc;
mod reader;

pub use adc::{AnalogSource, HostAdc, SimulatedAdc, SysfsAdc};
pub use reader::{Calibration, SensorConfig, SensorError, SensorSource, TemperatureSensor};
