//! Fixed-capacity JSON codec for reading packets
//!
//! Every packet is a flat JSON object with exactly four keys:
//! ```text
//! {"temperature":<number>,"nonce":<integer>,"timestamp":<integer>,"sensor_id":<integer>}
//! ```
//!
//! Encoding writes into a buffer that is reserved up front and never grows.
//! A packet that does not fit is an error, not a truncated payload.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::SensorId;

/// Reserved encoding capacity, sized for the four-field schema
pub const PACKET_CAPACITY: usize = 96;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Packet exceeds reserved capacity of {capacity} bytes")]
    CapacityExceeded { capacity: usize },

    #[error("Temperature is not a finite number: {0}")]
    NonFiniteTemperature(f32),

    #[error("JSON encode error: {0}")]
    EncodeError(serde_json::Error),

    #[error("JSON decode error: {0}")]
    DecodeError(#[from] serde_json::Error),
}

/// The wire representation of a reading
///
/// Field order here is the key order on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WirePacket {
    pub temperature: f64,
    pub nonce: i64,
    pub timestamp: u32,
    pub sensor_id: SensorId,
}

/// Round to centi-degrees, the resolution carried on the wire
fn wire_temperature(celsius: f32) -> f64 {
    (celsius as f64 * 100.0).round() / 100.0
}

/// Writer over a pre-sized buffer that refuses to grow
struct FixedBuf {
    buf: BytesMut,
    capacity: usize,
}

impl FixedBuf {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }
}

impl io::Write for FixedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "packet capacity exceeded",
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capacity-checked packet encoder
///
/// Reserves exactly `capacity` bytes per packet and fails rather than
/// growing the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketEncoder {
    capacity: usize,
}

impl Default for PacketEncoder {
    fn default() -> Self {
        Self::new(PACKET_CAPACITY)
    }
}

impl PacketEncoder {
    pub const fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Encode the four packet fields into a fresh buffer
    pub fn encode(
        &self,
        nonce: i64,
        timestamp: u32,
        temperature: f32,
        sensor_id: SensorId,
    ) -> Result<Bytes, PacketError> {
        if !temperature.is_finite() {
            return Err(PacketError::NonFiniteTemperature(temperature));
        }

        let packet = WirePacket {
            temperature: wire_temperature(temperature),
            nonce,
            timestamp,
            sensor_id,
        };

        let capacity = self.capacity;
        let mut out = FixedBuf::with_capacity(capacity);
        serde_json::to_writer(&mut out, &packet).map_err(|e| {
            if e.is_io() {
                PacketError::CapacityExceeded { capacity }
            } else {
                PacketError::EncodeError(e)
            }
        })?;

        Ok(out.buf.freeze())
    }
}

/// Encode a reading into its compact JSON wire form
///
/// Deterministic for a given set of inputs. Fails with
/// [`PacketError::CapacityExceeded`] instead of truncating.
pub fn build_packet(
    nonce: i64,
    timestamp: u32,
    temperature: f32,
    sensor_id: SensorId,
) -> Result<Bytes, PacketError> {
    PacketEncoder::default().encode(nonce, timestamp, temperature, sensor_id)
}

/// Decode a wire packet, rejecting unknown or missing keys
pub fn decode_packet(buf: &[u8]) -> Result<WirePacket, PacketError> {
    Ok(serde_json::from_slice(buf)?)
}
