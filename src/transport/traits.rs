//! Delivery trait abstraction for pluggable uplinks

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport-level failures, each mapped to a negative outcome code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send request: {0}")]
    SendFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Request timed out")]
    Timeout,
}

impl TransportError {
    /// Negative code reported in place of an HTTP status
    pub fn code(&self) -> i32 {
        match self {
            TransportError::ConnectionFailed(_) => -1,
            TransportError::SendFailed(_) => -3,
            TransportError::ConnectionLost(_) => -5,
            TransportError::Timeout => -11,
        }
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The collector answered with this HTTP status
    Status(u16),
    /// No answer was obtained
    Failed(TransportError),
}

impl DeliveryOutcome {
    /// HTTP status, or a negative transport error code
    pub fn code(&self) -> i32 {
        match self {
            DeliveryOutcome::Status(status) => *status as i32,
            DeliveryOutcome::Failed(e) => e.code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Status(status) if (200..300).contains(status))
    }
}

/// An uplink that hands one serialized reading to the collector
///
/// At-most-once: implementations make a single attempt and never retry.
#[async_trait]
pub trait Delivery: Send {
    async fn deliver(&mut self, packet: Bytes) -> DeliveryOutcome;

    /// Human-readable description of the destination
    fn endpoint(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_codes() {
        assert_eq!(DeliveryOutcome::Status(200).code(), 200);
        assert_eq!(DeliveryOutcome::Status(403).code(), 403);
        assert_eq!(
            DeliveryOutcome::Failed(TransportError::ConnectionFailed("refused".into())).code(),
            -1
        );
        assert_eq!(DeliveryOutcome::Failed(TransportError::Timeout).code(), -11);
    }

    #[test]
    fn test_success_is_2xx_only() {
        assert!(DeliveryOutcome::Status(200).is_success());
        assert!(DeliveryOutcome::Status(204).is_success());
        assert!(!DeliveryOutcome::Status(400).is_success());
        assert!(!DeliveryOutcome::Status(302).is_success());
        assert!(!DeliveryOutcome::Failed(TransportError::Timeout).is_success());
    }
}
