//! thermolog shared types
//!
//! This crate provides the reading model, the capacity-checked packet codec
//! and the scheduling state machine shared between the logging agent and the
//! collector.

pub mod codec;
pub mod schedule;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::{
    build_packet, decode_packet, PacketEncoder, PacketError, WirePacket, PACKET_CAPACITY,
};
pub use schedule::{Phase, ScheduleError, SchedulerState};

/// Get current wall-clock time in whole seconds since the Unix epoch
pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .min(u32::MAX as u64) as u32
}

/// Wire-level constants shared by agent and collector
pub mod wire {
    /// Header carrying the pre-shared API key
    pub const API_KEY_HEADER: &str = "x-api-key";

    /// Content type of every reading upload
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    /// Keys every reading payload must carry
    pub const REQUIRED_FIELDS: [&str; 4] = ["temperature", "nonce", "timestamp", "sensor_id"];
}

/// Timing and range defaults for the measurement loop
pub mod defaults {
    /// Seconds between two samples
    pub const SAMPLE_INTERVAL_SECS: u32 = 5;

    /// Idle slice between two due-time checks
    pub const POLL_SLICE_MS: u64 = 100;

    /// Exclusive upper bound of generated nonces
    pub const NONCE_UPPER_BOUND: i64 = 100_000_000;

    /// Per-request delivery deadline, kept well under the sample interval
    pub const REQUEST_TIMEOUT_MS: u64 = 3000;

    /// Minimum spacing between two network time queries
    pub const CLOCK_RESYNC_INTERVAL_SECS: u64 = 60;
}

/// Sensor identifier
///
/// Serialized as a bare integer on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u16);

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SensorId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(SensorId)
    }
}

/// A single temperature measurement ready for delivery
///
/// Built fresh on every tick and consumed by exactly one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius
    pub temperature: f32,
    /// Sampling time in seconds since the Unix epoch
    pub timestamp: u32,
    /// Per-packet random identifier
    pub nonce: i64,
    pub sensor_id: SensorId,
}

impl Reading {
    pub const fn new(temperature: f32, timestamp: u32, nonce: i64, sensor_id: SensorId) -> Self {
        Self {
            temperature,
            timestamp,
            nonce,
            sensor_id,
        }
    }

    /// Encode this reading with `encoder`'s reserved capacity
    pub fn encode_with(&self, encoder: &PacketEncoder) -> Result<bytes::Bytes, PacketError> {
        encoder.encode(self.nonce, self.timestamp, self.temperature, self.sensor_id)
    }
}
