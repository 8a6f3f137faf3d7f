//! Cache configuration.
//!
//! Controls the read-through cache via the `[cache]` table of `blogcache.toml`.
//! Every TTL is expressed in seconds.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::medium::Expiry;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Cache configuration from `blogcache.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache. When off, every read goes to the store.
    pub enabled: bool,
    /// Cache whole requested id sets under one key instead of per id.
    pub solid: bool,
    /// Maximum entries held by the in-process medium.
    pub memory_capacity: usize,
    /// Lifetimes per cached family.
    pub ttl: CacheTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            solid: false,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            ttl: CacheTtls::default(),
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Entry lifetimes in seconds. Zero means the entry never expires.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub blog: u64,
    pub blog_negative: u64,
    pub blog_batch: u64,
    /// Url and title lookups resolving to an id.
    pub lookup: u64,
    pub lookup_negative: u64,
    pub blog_filter: u64,
    pub relation: u64,
    pub relation_negative: u64,
    pub relation_batch: u64,
    pub relation_filter: u64,
    pub blog_types: u64,
    pub blog_type: u64,
    pub authors: u64,
    pub rating_join: u64,
    pub accessible: u64,
    pub inaccessible_user: u64,
    pub inaccessible_guest: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            blog: 4 * DAY,
            blog_negative: 4 * DAY,
            blog_batch: DAY,
            lookup: 2 * DAY,
            lookup_negative: HOUR,
            blog_filter: 2 * DAY,
            relation: 4 * DAY,
            relation_negative: 4 * DAY,
            relation_batch: DAY,
            relation_filter: 3 * DAY,
            blog_types: 30 * DAY,
            blog_type: 30 * MINUTE,
            authors: DAY,
            rating_join: DAY,
            accessible: DAY,
            inaccessible_user: DAY,
            inaccessible_guest: 3 * DAY,
        }
    }
}

/// Converts a configured lifetime into an expiry.
pub fn expiry(seconds: u64) -> Expiry {
    if seconds == 0 {
        Expiry::Never
    } else {
        Expiry::After(Duration::from_secs(seconds))
    }
}
