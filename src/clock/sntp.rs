//! SNTP client clock
//!
//! Keeps the offset between the local system clock and an SNTP server.
//! Network queries are rate-limited: `resync` is cheap to call on every
//! tick and only goes to the network once `resync_interval` has elapsed.

use super::{ClockError, ClockSource};
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

const NTP_PACKET_SIZE: usize = 48;

/// Seconds between 1900-01-01 and 1970-01-01
const NTP_EPOCH_OFFSET: u64 = 2_208_988_800;

/// Originate timestamp field of a reply (echo of the request's transmit field)
const ORIGINATE: std::ops::Range<usize> = 24..32;
const TRANSMIT: std::ops::Range<usize> = 40..48;

/// LI = 0, version = 4, mode = 3 (client)
const CLIENT_REQUEST_HEADER: u8 = 0b00_100_011;

pub struct SntpClock {
    server: String,
    socket: Option<UdpSocket>,
    /// Server time minus local time, in milliseconds
    offset_ms: i64,
    last_sync: Option<Instant>,
    resync_interval: Duration,
    query_timeout: Duration,
}

fn system_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Extract the transmit timestamp as Unix seconds
pub(crate) fn parse_transmit_secs(response: &[u8]) -> Result<u64, ClockError> {
    if response.len() != NTP_PACKET_SIZE {
        return Err(ClockError::InvalidResponse(response.len()));
    }

    let seconds =
        u32::from_be_bytes([response[40], response[41], response[42], response[43]]) as u64;
    seconds
        .checked_sub(NTP_EPOCH_OFFSET)
        .ok_or(ClockError::InvalidTimestamp)
}

impl SntpClock {
    pub fn new(server: String, resync_interval: Duration, query_timeout: Duration) -> Self {
        Self {
            server,
            socket: None,
            offset_ms: 0,
            last_sync: None,
            resync_interval,
            query_timeout,
        }
    }

    /// One request/response exchange; returns the server's Unix time in ms
    ///
    /// The request carries a random transmit stamp. Only a datagram from the
    /// server that echoes it as originate stamp counts as the answer; late
    /// replies to earlier, timed-out queries are dropped.
    async fn query(&self) -> Result<i64, ClockError> {
        let socket = self.socket.as_ref().ok_or(ClockError::NotStarted)?;

        let server = lookup_host(self.server.as_str())
            .await
            .map_err(|_| ClockError::Resolve(self.server.clone()))?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| ClockError::Resolve(self.server.clone()))?;

        let stamp: [u8; 8] = rand::random();
        let mut request = [0u8; NTP_PACKET_SIZE];
        request[0] = CLIENT_REQUEST_HEADER;
        request[TRANSMIT].copy_from_slice(&stamp);

        let sent_at = Instant::now();
        let deadline = sent_at + self.query_timeout;
        socket.send_to(&request, server).await?;

        let mut response = [0u8; NTP_PACKET_SIZE + 16];
        loop {
            let (len, peer) = timeout_at(deadline, socket.recv_from(&mut response))
                .await
                .map_err(|_| ClockError::Timeout(self.query_timeout))??;

            if peer != server {
                debug!("Ignoring datagram from {} (expected {})", peer, server);
                continue;
            }
            if len != NTP_PACKET_SIZE || response[ORIGINATE] != stamp {
                debug!("Ignoring stale or foreign reply from {}", peer);
                continue;
            }

            let rtt = sent_at.elapsed();
            let unix_secs = parse_transmit_secs(&response[..len])?;
            return Ok(unix_secs as i64 * 1000 + (rtt.as_millis() / 2) as i64);
        }
    }
}

#[async_trait]
impl ClockSource for SntpClock {
    async fn begin(&mut self) -> Result<(), ClockError> {
        if self.socket.is_none() {
            self.socket = Some(UdpSocket::bind("0.0.0.0:0").await?);
        }
        Ok(())
    }

    async fn resync(&mut self) -> Result<(), ClockError> {
        if let Some(last) = self.last_sync {
            if last.elapsed() < self.resync_interval {
                return Ok(());
            }
        }

        let server_ms = self.query().await?;
        let offset_ms = server_ms - system_ms();

        if self.last_sync.is_none() {
            info!("Time synced with {} (offset {} ms)", self.server, offset_ms);
        } else {
            debug!("Time resynced with {} (offset {} ms)", self.server, offset_ms);
        }

        self.offset_ms = offset_ms;
        self.last_sync = Some(Instant::now());
        Ok(())
    }

    fn now(&self) -> u32 {
        let ms = system_ms() + self.offset_ms;
        (ms / 1000).clamp(0, u32::MAX as i64) as u32
    }
}
