//! Storage medium abstraction underneath the cache store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

/// Failures of the cache itself. Never fatal to a business operation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache medium unavailable: {0}")]
    Unavailable(String),
    #[error("cache payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// When an entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    After(Duration),
    At(OffsetDateTime),
}

impl Expiry {
    /// Absolute deadline relative to `now`, or `None` for entries that never expire.
    pub fn deadline(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        match self {
            Expiry::Never => None,
            Expiry::After(ttl) => Some(now + ttl),
            Expiry::At(at) => Some(at),
        }
    }

    /// Remaining lifetime in whole seconds, as key/value servers expect it.
    pub fn seconds(self, now: OffsetDateTime) -> Option<u64> {
        self.deadline(now).map(|deadline| {
            let remaining = (deadline - now).whole_seconds();
            u64::try_from(remaining).unwrap_or(0)
        })
    }
}

/// Any key/bytes store with batched reads.
///
/// Keys absent from the map returned by [`CacheMedium::get_many`] are misses.
#[async_trait]
pub trait CacheMedium: Send + Sync {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError>;

    /// Store `value` under `key`.
    ///
    /// Returns the keys the medium dropped to make room, so callers can forget
    /// them. Media that evict silently return an empty list.
    async fn set(&self, key: &str, value: Bytes, expiry: Expiry)
    -> Result<Vec<String>, CacheError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError>;
}
