//! Per-packet nonce generation
//!
//! Nonces let the collector discard replayed packets. They come from a
//! small, fast, non-cryptographic generator seeded once at startup; no
//! uniqueness check is made.

use crate::sensor::AnalogSource;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};
use thermolog_shared::defaults;
use tracing::{debug, warn};

/// Samples folded into the seed when reading a floating channel
pub const NOISE_SAMPLES: usize = 16;

/// Nonce generator configuration
#[derive(Debug, Clone)]
pub struct NonceConfig {
    /// Exclusive upper bound, clamped to at least 1
    pub upper_bound: i64,
    /// Unconnected analog channel used as the seed source
    pub noise_channel: Option<std::path::PathBuf>,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            upper_bound: defaults::NONCE_UPPER_BOUND,
            noise_channel: None,
        }
    }
}

pub struct NonceGenerator {
    rng: SmallRng,
    upper_bound: i64,
}

impl NonceGenerator {
    /// Create a generator from an explicit seed
    pub fn seeded(seed: u64, upper_bound: i64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            upper_bound: upper_bound.max(1),
        }
    }

    /// Create a generator seeded from the operating system
    pub fn from_entropy(upper_bound: i64) -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            upper_bound: upper_bound.max(1),
        }
    }

    /// Seed from the noise floor of an unconnected analog channel
    ///
    /// The wall clock is mixed in so a stuck channel still yields
    /// different seeds across restarts.
    pub async fn from_noise<A: AnalogSource>(source: &mut A, upper_bound: i64) -> Self {
        let mut seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        let mut sampled = 0;
        for _ in 0..NOISE_SAMPLES {
            match source.read_raw().await {
                Ok(raw) => {
                    seed = seed.rotate_left(7) ^ (raw as u64);
                    sampled += 1;
                }
                Err(e) => {
                    warn!("Noise channel read failed: {}", e);
                    break;
                }
            }
        }
        debug!("Seeded nonce generator from {} noise samples", sampled);

        Self::seeded(seed, upper_bound)
    }

    pub fn upper_bound(&self) -> i64 {
        self.upper_bound
    }

    /// Next nonce, uniform over `[0, upper_bound)`
    pub fn generate_nonce(&mut self) -> i64 {
        self.rng.gen_range(0..self.upper_bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SimulatedAdc;

    #[test]
    fn test_default_range() {
        let mut nonces = NonceGenerator::seeded(1, defaults::NONCE_UPPER_BOUND);
        for _ in 0..10_000 {
            let nonce = nonces.generate_nonce();
            assert!((0..100_000_000).contains(&nonce));
        }
    }

    #[test]
    fn test_widened_range() {
        let mut nonces = NonceGenerator::seeded(2, i64::MAX);
        let wide = (0..1000).any(|_| nonces.generate_nonce() >= defaults::NONCE_UPPER_BOUND);
        assert!(wide);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = NonceGenerator::seeded(99, 1000);
        let mut b = NonceGenerator::seeded(99, 1000);
        for _ in 0..50 {
            assert_eq!(a.generate_nonce(), b.generate_nonce());
        }
    }

    #[test]
    fn test_degenerate_bound_clamped() {
        let mut nonces = NonceGenerator::seeded(3, 0);
        assert_eq!(nonces.upper_bound(), 1);
        assert_eq!(nonces.generate_nonce(), 0);
    }

    #[tokio::test]
    async fn test_seed_from_noise_channel() {
        let mut noise = SimulatedAdc::new(512, 40);
        let mut nonces = NonceGenerator::from_noise(&mut noise, defaults::NONCE_UPPER_BOUND).await;
        assert!((0..defaults::NONCE_UPPER_BOUND).contains(&nonces.generate_nonce()));
    }
}
