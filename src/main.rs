mod clock;
mod config;
mod connection;
mod nonce;
mod scheduler;
mod sensor;
mod transport;

use anyhow::{Context, Result};
use clock::{ClockSource, HostClock};
use config::AgentConfig;
use connection::{bring_up_link, start_clock, Indicator, NoIndicator, SysfsLed, WifiLink};
use nonce::NonceGenerator;
use scheduler::Scheduler;
use sensor::{AnalogSource, HostAdc, SysfsAdc, TemperatureSensor};
use transport::{endpoint_authority, HttpsDelivery};

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AgentConfig::load().context("Invalid build configuration")?;

    info!("Temperature logger starting: sensor {}", config.sensor_id);
    info!("  Collector: {}", config.delivery.endpoint);
    if config.delivery.api_key.is_empty() {
        warn!("No API key configured, the collector will reject every reading");
    }

    // Network first; nothing else works without it
    let mut indicator: Box<dyn Indicator> = match &config.link.indicator_led {
        Some(path) => Box::new(SysfsLed::new(path)),
        None => Box::new(NoIndicator),
    };
    let probe_addr = endpoint_authority(&config.delivery.endpoint)?;
    let mut link = WifiLink::new(config.link.clone(), probe_addr);
    bring_up_link(&mut link, indicator.as_mut(), &config.retry).await?;

    let mut clock = HostClock::from_config(&config.clock);
    start_clock(&mut clock, &config.retry).await?;
    info!("Clock running at epoch {}", clock.now());

    let adc = HostAdc::from_source(&config.sensor.source);
    info!("Sampling from {} source", adc.name());
    let sensor = TemperatureSensor::new(adc, config.sensor.calibration);

    let nonces = match &config.nonce.noise_channel {
        Some(path) => {
            let mut noise = SysfsAdc::new(path);
            NonceGenerator::from_noise(&mut noise, config.nonce.upper_bound).await
        }
        None => NonceGenerator::from_entropy(config.nonce.upper_bound),
    };

    let delivery = HttpsDelivery::new(config.delivery.clone())?;
    if delivery.trust_mode() == transport::TrustMode::EncryptOnly {
        warn!("Server certificate is not verified");
    }

    let scheduler = Scheduler::new(
        &config.schedule,
        config.sensor_id,
        clock,
        sensor,
        nonces,
        delivery,
    )?;
    scheduler.run().await;

    Ok(())
}
