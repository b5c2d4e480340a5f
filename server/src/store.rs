//! In-memory reading store keyed by nonce

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Item with nonce {0} already seen")]
    DuplicateNonce(String),
}

/// One accepted reading, as listed by `GET /readings`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReading {
    /// The packet nonce
    pub id: String,
    /// ISO-8601 form of the device timestamp
    pub datetime: String,
    pub temperature: f64,
    pub sensor_id: String,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<String>,
    records: Vec<StoredReading>,
}

#[derive(Default)]
pub struct ReadingStore {
    inner: RwLock<Inner>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reading unless its nonce has been seen before
    pub async fn insert(&self, reading: StoredReading) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.seen.insert(reading.id.clone()) {
            return Err(StoreError::DuplicateNonce(reading.id));
        }
        inner.records.push(reading);
        Ok(())
    }

    /// All readings in arrival order
    pub async fn list(&self) -> Vec<StoredReading> {
        self.inner.read().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }
}
