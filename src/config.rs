//! Agent configuration
//!
//! Everything is fixed at build time: secrets and deployment settings are
//! read with `option_env!` when the agent is compiled and fall back to the
//! `Default` of each component's config. Nothing is reloaded at runtime.

use crate::clock::{ClockConfig, ClockMode};
use crate::connection::{LinkConfig, RetryPolicy, WifiCredentials};
use crate::nonce::NonceConfig;
use crate::scheduler::ScheduleConfig;
use crate::sensor::{SensorConfig, SensorSource};
use crate::transport::{DeliveryConfig, TrustMode};
use anyhow::{bail, Context, Result};
use thermolog_shared::SensorId;

/// Build-time settings, one field per `THERMOLOG_*` variable
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildEnv {
    pub wifi_ssid: Option<&'static str>,
    pub wifi_password: Option<&'static str>,
    pub api_key: Option<&'static str>,
    pub sensor_id: Option<&'static str>,
    pub endpoint: Option<&'static str>,
    /// `encrypt-only` or `verified`
    pub trust_mode: Option<&'static str>,
    /// IIO channel file; unset selects the simulated source
    pub adc_path: Option<&'static str>,
    /// Floating IIO channel used to seed nonces
    pub noise_path: Option<&'static str>,
    /// `host:port` of the SNTP server, or `system`
    pub ntp_server: Option<&'static str>,
    pub led_path: Option<&'static str>,
    pub interval_secs: Option<&'static str>,
}

impl BuildEnv {
    /// Values captured by the compiler for this build
    pub fn captured() -> Self {
        Self {
            wifi_ssid: option_env!("THERMOLOG_WIFI_SSID"),
            wifi_password: option_env!("THERMOLOG_WIFI_PASSWORD"),
            api_key: option_env!("THERMOLOG_API_KEY"),
            sensor_id: option_env!("THERMOLOG_SENSOR_ID"),
            endpoint: option_env!("THERMOLOG_ENDPOINT"),
            trust_mode: option_env!("THERMOLOG_TRUST_MODE"),
            adc_path: option_env!("THERMOLOG_ADC_PATH"),
            noise_path: option_env!("THERMOLOG_NOISE_ADC_PATH"),
            ntp_server: option_env!("THERMOLOG_NTP_SERVER"),
            led_path: option_env!("THERMOLOG_LED_PATH"),
            interval_secs: option_env!("THERMOLOG_INTERVAL_SECS"),
        }
    }
}

/// Complete agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub sensor_id: SensorId,
    pub schedule: ScheduleConfig,
    pub sensor: SensorConfig,
    pub nonce: NonceConfig,
    pub clock: ClockConfig,
    pub link: LinkConfig,
    pub delivery: DeliveryConfig,
    pub retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sensor_id: SensorId(1),
            schedule: ScheduleConfig::default(),
            sensor: SensorConfig::default(),
            nonce: NonceConfig::default(),
            clock: ClockConfig::default(),
            link: LinkConfig::default(),
            delivery: DeliveryConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn parse_trust_mode(value: &str) -> Result<TrustMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "encrypt-only" | "encrypt_only" => Ok(TrustMode::EncryptOnly),
        "verified" => Ok(TrustMode::Verified),
        other => bail!("Unknown trust mode {:?}", other),
    }
}

impl AgentConfig {
    /// Configuration baked into this build
    pub fn load() -> Result<Self> {
        Self::from_build_env(&BuildEnv::captured())
    }

    pub fn from_build_env(env: &BuildEnv) -> Result<Self> {
        let mut config = Self::default();

        if let Some(id) = env.sensor_id {
            config.sensor_id = id
                .parse()
                .with_context(|| format!("Invalid sensor id {:?}", id))?;
        }

        if let Some(secs) = env.interval_secs {
            config.schedule.interval_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid interval {:?}", secs))?;
        }

        if let Some(path) = env.adc_path {
            config.sensor.source = SensorSource::Sysfs { path: path.into() };
        }
        config.nonce.noise_channel = env.noise_path.map(Into::into);

        match env.ntp_server {
            Some("system") => config.clock.mode = ClockMode::System,
            Some(server) => {
                config.clock.mode = ClockMode::Sntp {
                    server: server.to_string(),
                }
            }
            None => {}
        }

        match (env.wifi_ssid, env.wifi_password) {
            (Some(ssid), passphrase) => {
                config.link.wifi = Some(WifiCredentials {
                    ssid: ssid.to_string(),
                    passphrase: passphrase.unwrap_or_default().to_string(),
                });
            }
            (None, Some(_)) => bail!("Wi-Fi password set without an SSID"),
            (None, None) => {}
        }
        config.link.indicator_led = env.led_path.map(Into::into);

        if let Some(endpoint) = env.endpoint {
            config.delivery.endpoint = endpoint.to_string();
        }
        if let Some(key) = env.api_key {
            config.delivery.api_key = key.to_string();
        }
        if let Some(mode) = env.trust_mode {
            config.delivery.trust_mode = parse_trust_mode(mode)?;
        }

        if config.delivery.request_timeout.as_secs() >= config.schedule.interval_secs as u64 {
            bail!(
                "Request timeout {:?} must stay under the {}s interval",
                config.delivery.request_timeout,
                config.schedule.interval_secs
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_build_env(&BuildEnv::default()).unwrap();
        assert_eq!(config.sensor_id, SensorId(1));
        assert_eq!(config.schedule.interval_secs, 5);
        assert_eq!(config.delivery.trust_mode, TrustMode::EncryptOnly);
        assert!(config.delivery.api_key.is_empty());
        assert!(config.link.wifi.is_none());
        assert!(matches!(config.sensor.source, SensorSource::Simulated { .. }));
        assert!(matches!(config.clock.mode, ClockMode::Sntp { .. }));
    }

    #[test]
    fn test_overrides_applied() {
        let env = BuildEnv {
            wifi_ssid: Some("greenhouse"),
            wifi_password: Some("hunter22"),
            api_key: Some("k3y"),
            sensor_id: Some("7"),
            endpoint: Some("https://collector.example/readings"),
            trust_mode: Some("verified"),
            adc_path: Some("/sys/bus/iio/devices/iio:device0/in_voltage0_raw"),
            noise_path: Some("/sys/bus/iio/devices/iio:device0/in_voltage1_raw"),
            ntp_server: Some("system"),
            led_path: Some("/sys/class/leds/led0/brightness"),
            interval_secs: Some("10"),
        };
        let config = AgentConfig::from_build_env(&env).unwrap();

        assert_eq!(config.sensor_id, SensorId(7));
        assert_eq!(config.schedule.interval_secs, 10);
        assert_eq!(config.delivery.api_key, "k3y");
        assert_eq!(config.delivery.endpoint, "https://collector.example/readings");
        assert_eq!(config.delivery.trust_mode, TrustMode::Verified);
        assert!(matches!(config.clock.mode, ClockMode::System));

        let wifi = config.link.wifi.unwrap();
        assert_eq!(wifi.ssid, "greenhouse");
        assert_eq!(wifi.passphrase, "hunter22");
        assert_eq!(
            config.link.indicator_led,
            Some(PathBuf::from("/sys/class/leds/led0/brightness"))
        );
        assert!(matches!(config.sensor.source, SensorSource::Sysfs { .. }));
        assert!(config.nonce.noise_channel.is_some());
    }

    #[test]
    fn test_custom_ntp_server() {
        let env = BuildEnv {
            ntp_server: Some("time.example:123"),
            ..Default::default()
        };
        let config = AgentConfig::from_build_env(&env).unwrap();
        match config.clock.mode {
            ClockMode::Sntp { server } => assert_eq!(server, "time.example:123"),
            ClockMode::System => panic!("expected SNTP mode"),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_id = BuildEnv {
            sensor_id: Some("seventy thousand"),
            ..Default::default()
        };
        assert!(AgentConfig::from_build_env(&bad_id).is_err());

        let bad_trust = BuildEnv {
            trust_mode: Some("yolo"),
            ..Default::default()
        };
        assert!(AgentConfig::from_build_env(&bad_trust).is_err());

        let orphan_password = BuildEnv {
            wifi_password: Some("secret"),
            ..Default::default()
        };
        assert!(AgentConfig::from_build_env(&orphan_password).is_err());
    }

    #[test]
    fn test_timeout_must_fit_interval() {
        let env = BuildEnv {
            interval_secs: Some("2"),
            ..Default::default()
        };
        assert!(AgentConfig::from_build_env(&env).is_err());

        let env = BuildEnv {
            interval_secs: Some("0"),
            ..Default::default()
        };
        assert!(AgentConfig::from_build_env(&env).is_err());
    }

    #[test]
    fn test_open_network() {
        let env = BuildEnv {
            wifi_ssid: Some("cafe"),
            ..Default::default()
        };
        let config = AgentConfig::from_build_env(&env).unwrap();
        assert_eq!(config.link.wifi.unwrap().passphrase, "");
    }
}
