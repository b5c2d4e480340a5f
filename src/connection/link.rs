//! Network link bring-up
//!
//! On boards managed by NetworkManager the agent can associate with the
//! configured Wi-Fi network itself. Either way the link only counts as up
//! once the collector host answers a TCP connect.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Error type for link operations
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to run {command}: {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Association with {ssid} failed: {reason}")]
    Association { ssid: String, reason: String },

    #[error("{addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("{addr} did not answer within {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
}

/// Network link the agent needs before it can deliver anything
#[async_trait]
pub trait Link: Send {
    /// Bring the link up; blocks until connected or failed
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Human-readable description of the link
    fn describe(&self) -> String;
}

/// Wi-Fi network credentials
#[derive(Clone)]
pub struct WifiCredentials {
    pub ssid: String,
    pub passphrase: String,
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Link configuration
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Network to associate with, `None` when the OS manages the link
    pub wifi: Option<WifiCredentials>,
    /// Reachability probe deadline
    pub connect_timeout: Duration,
    /// LED brightness file used as the liveness indicator
    pub indicator_led: Option<std::path::PathBuf>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            wifi: None,
            connect_timeout: Duration::from_secs(5),
            indicator_led: None,
        }
    }
}

/// `nmcli` arguments to join `wifi`; open networks get no `password` pair
fn nmcli_connect_args(wifi: &WifiCredentials) -> Vec<&str> {
    let mut args = vec!["device", "wifi", "connect", wifi.ssid.as_str()];
    if !wifi.passphrase.is_empty() {
        args.extend(["password", wifi.passphrase.as_str()]);
    }
    args
}

/// Host link: optional `nmcli` association, then a TCP reachability probe
pub struct WifiLink {
    config: LinkConfig,
    /// `host:port` that must accept a TCP connection
    probe_addr: String,
}

impl WifiLink {
    pub fn new(config: LinkConfig, probe_addr: String) -> Self {
        Self { config, probe_addr }
    }

    /// Associate through NetworkManager
    ///
    /// `nmcli` only takes the passphrase as an argument, so it is visible to
    /// local users in `/proc/<pid>/cmdline` while the command runs.
    async fn associate(&self, wifi: &WifiCredentials) -> Result<(), LinkError> {
        debug!("Associating with {}", wifi.ssid);

        let output = Command::new("nmcli")
            .args(nmcli_connect_args(wifi))
            .output()
            .await
            .map_err(|source| LinkError::CommandExecution {
                command: "nmcli".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(LinkError::Association {
                ssid: wifi.ssid.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn probe(&self) -> Result<(), LinkError> {
        let connect = TcpStream::connect(self.probe_addr.as_str());
        match timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(LinkError::Unreachable {
                addr: self.probe_addr.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(LinkError::Timeout {
                addr: self.probe_addr.clone(),
                timeout: self.config.connect_timeout,
            }),
        }
    }
}

#[async_trait]
impl Link for WifiLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        if let Some(wifi) = &self.config.wifi {
            self.associate(wifi).await?;
        }
        self.probe().await
    }

    fn describe(&self) -> String {
        match &self.config.wifi {
            Some(wifi) => format!("wifi {} -> {}", wifi.ssid, self.probe_addr),
            None => format!("system network -> {}", self.probe_addr),
        }
    }
}
