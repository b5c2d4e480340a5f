//! HTTPS uplink to the collector
//!
//! Readings are POSTed as JSON with a pre-shared API key. In
//! `TrustMode::EncryptOnly` the server certificate is not verified: the
//! channel is encrypted but the collector's identity is not authenticated,
//! so a man in the middle can read and forge traffic. Payload signing is the
//! intended replacement.

use super::traits::{Delivery, DeliveryOutcome, TransportError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::time::Duration;
use thermolog_shared::{defaults, wire};
use tracing::{debug, warn};

/// How much the TLS layer is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustMode {
    /// Encrypt, but accept any server certificate
    #[default]
    EncryptOnly,
    /// Verify the server certificate against the system roots
    Verified,
}

impl std::fmt::Display for TrustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustMode::EncryptOnly => write!(f, "encrypt-only"),
            TrustMode::Verified => write!(f, "verified"),
        }
    }
}

/// Configuration for the delivery client
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Collector URL every reading is POSTed to
    pub endpoint: String,
    /// Pre-shared key sent in the `x-api-key` header
    pub api_key: String,
    pub trust_mode: TrustMode,
    /// Whole-request deadline
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://collector.local/readings".into(),
            api_key: String::new(),
            trust_mode: TrustMode::EncryptOnly,
            request_timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// `host:port` of an endpoint URL, with the scheme's default port
pub fn endpoint_authority(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .with_context(|| format!("Invalid endpoint URL {}", endpoint))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Endpoint {} has no host", endpoint))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("Endpoint {} has no port", endpoint))?;
    Ok(format!("{}:{}", host, port))
}

fn classify(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::ConnectionFailed(e.to_string())
    } else if e.is_request() || e.is_body() {
        TransportError::SendFailed(e.to_string())
    } else {
        TransportError::ConnectionLost(e.to_string())
    }
}

/// Delivery client holding one reusable HTTP connection pool
pub struct HttpsDelivery {
    config: DeliveryConfig,
    client: Client,
}

impl HttpsDelivery {
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        let url = Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid endpoint URL {}", config.endpoint))?;
        if url.scheme() != "https" {
            warn!("Endpoint {} is not HTTPS, readings travel in clear text", url);
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(config.trust_mode == TrustMode::EncryptOnly)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn trust_mode(&self) -> TrustMode {
        self.config.trust_mode
    }
}

#[async_trait]
impl Delivery for HttpsDelivery {
    async fn deliver(&mut self, packet: Bytes) -> DeliveryOutcome {
        debug!("POST {} ({} bytes)", self.config.endpoint, packet.len());

        let result = self
            .client
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, wire::CONTENT_TYPE_JSON)
            .header(wire::API_KEY_HEADER, &self.config.api_key)
            .body(packet)
            .send()
            .await;

        match result {
            Ok(response) => DeliveryOutcome::Status(response.status().as_u16()),
            Err(e) => DeliveryOutcome::Failed(classify(&e)),
        }
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}
