//! Scheduler: owns every collaborator and the due-time state
//!
//! A tick never propagates an error. Sensor and packet failures abort the
//! tick before any network traffic, delivery failures are logged and the
//! reading is dropped.

use crate::clock::ClockSource;
use crate::nonce::NonceGenerator;
use crate::sensor::{AnalogSource, SensorError, TemperatureSensor};
use crate::transport::{Delivery, DeliveryOutcome, TransportError};
use bytes::Bytes;
use std::time::Duration;
use thermolog_shared::{
    defaults, PacketEncoder, PacketError, Reading, ScheduleError, SchedulerState, SensorId,
};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Timing configuration of the measurement loop
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Seconds between two ticks, measured from the previous tick
    pub interval_secs: u32,
    /// Idle time between two due-time checks
    pub poll_slice: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::SAMPLE_INTERVAL_SECS,
            poll_slice: Duration::from_millis(defaults::POLL_SLICE_MS),
        }
    }
}

/// Reasons a tick ends before delivery
#[derive(Error, Debug)]
pub enum TickError {
    #[error("Sensor read failed: {0}")]
    Sensor(#[from] SensorError),

    #[error("Packet build failed: {0}")]
    Packet(#[from] PacketError),
}

/// What happened to the reading of one tick
#[derive(Debug)]
pub enum TickOutcome {
    /// Collector accepted the reading (2xx)
    Delivered { status: u16 },
    /// Collector answered with a non-success status
    Rejected { status: u16 },
    /// No answer from the collector
    Failed(TransportError),
    /// Nothing was sent
    Aborted(TickError),
}

impl From<DeliveryOutcome> for TickOutcome {
    fn from(outcome: DeliveryOutcome) -> Self {
        let delivered = outcome.is_success();
        match outcome {
            DeliveryOutcome::Status(status) if delivered => TickOutcome::Delivered { status },
            DeliveryOutcome::Status(status) => TickOutcome::Rejected { status },
            DeliveryOutcome::Failed(e) => TickOutcome::Failed(e),
        }
    }
}

impl TickOutcome {
    /// HTTP status or negative transport code; `None` if nothing was sent
    pub fn code(&self) -> Option<i32> {
        match self {
            TickOutcome::Delivered { status } | TickOutcome::Rejected { status } => {
                Some(*status as i32)
            }
            TickOutcome::Failed(e) => Some(e.code()),
            TickOutcome::Aborted(_) => None,
        }
    }
}

/// Summary of one tick
#[derive(Debug)]
pub struct TickReport {
    pub sampled_at: u32,
    pub next_due: u32,
    /// The reading that was sent, if the tick got that far
    pub reading: Option<Reading>,
    pub outcome: TickOutcome,
}

pub struct Scheduler<C, A, D>
where
    C: ClockSource,
    A: AnalogSource,
    D: Delivery,
{
    clock: C,
    sensor: TemperatureSensor<A>,
    nonces: NonceGenerator,
    delivery: D,
    encoder: PacketEncoder,
    state: SchedulerState,
    sensor_id: SensorId,
    poll_slice: Duration,
}

impl<C, A, D> Scheduler<C, A, D>
where
    C: ClockSource,
    A: AnalogSource,
    D: Delivery,
{
    pub fn new(
        config: &ScheduleConfig,
        sensor_id: SensorId,
        clock: C,
        sensor: TemperatureSensor<A>,
        nonces: NonceGenerator,
        delivery: D,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            clock,
            sensor,
            nonces,
            delivery,
            encoder: PacketEncoder::default(),
            state: SchedulerState::new(config.interval_secs)?,
            sensor_id,
            poll_slice: config.poll_slice,
        })
    }

    /// Replace the packet encoder (reserved capacity)
    pub fn with_encoder(mut self, encoder: PacketEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Check the clock once and run a tick if one is due
    pub async fn poll(&mut self) -> Option<TickReport> {
        let now = self.clock.now();
        let sampled_at = self.state.begin_tick(now)?;
        let report = self.tick(sampled_at).await;
        self.state.end_tick();
        Some(report)
    }

    async fn tick(&mut self, sampled_at: u32) -> TickReport {
        if let Err(e) = self.clock.resync().await {
            warn!("Clock resync failed, keeping local time: {}", e);
        }

        let (reading, outcome) = match self.sample(sampled_at).await {
            Ok((reading, packet)) => {
                let outcome = self.delivery.deliver(packet).await;
                (Some(reading), TickOutcome::from(outcome))
            }
            Err(e) => (None, TickOutcome::Aborted(e)),
        };

        match (&reading, &outcome) {
            (Some(r), TickOutcome::Delivered { status }) => {
                info!(
                    temperature = r.temperature,
                    nonce = r.nonce,
                    timestamp = r.timestamp,
                    "Reading delivered ({})",
                    status
                );
            }
            (Some(r), TickOutcome::Rejected { status }) => {
                warn!(
                    temperature = r.temperature,
                    nonce = r.nonce,
                    "Collector rejected reading ({})",
                    status
                );
            }
            (_, TickOutcome::Failed(e)) => {
                error!(
                    code = e.code(),
                    "Delivery to {} failed: {}",
                    self.delivery.endpoint(),
                    e
                );
            }
            (_, TickOutcome::Aborted(e)) => {
                error!("Tick at {} aborted: {}", sampled_at, e);
            }
            _ => {}
        }

        TickReport {
            sampled_at,
            next_due: self.state.next_due(),
            reading,
            outcome,
        }
    }

    async fn sample(&mut self, sampled_at: u32) -> Result<(Reading, Bytes), TickError> {
        let temperature = self.sensor.read_temperature().await?;
        let nonce = self.nonces.generate_nonce();
        let reading = Reading::new(temperature, sampled_at, nonce, self.sensor_id);

        let packet = reading.encode_with(&self.encoder)?;
        Ok((reading, packet))
    }

    /// Run the loop forever
    pub async fn run(mut self) {
        info!(
            "Sampling every {}s, delivering to {}",
            self.state.interval_secs(),
            self.delivery.endpoint()
        );

        loop {
            if let Some(report) = self.poll().await {
                debug!(
                    "Tick at {} finished (code {:?}), next due at {} (in {}s)",
                    report.sampled_at,
                    report.outcome.code(),
                    report.next_due,
                    self.state.secs_until_due(self.clock.now())
                );
            }
            sleep(self.poll_slice).await;
        }
    }
}
