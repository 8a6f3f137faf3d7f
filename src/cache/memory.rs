//! In-process LRU medium.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;

use super::lock::mutex_guard;
use super::medium::{CacheError, CacheMedium, Expiry};

const SOURCE: &str = "cache::memory";
const METRIC_MEMORY_EVICT_TOTAL: &str = "blogcache_memory_evict_total";

type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

struct StoredEntry {
    bytes: Bytes,
    expires_at: Option<OffsetDateTime>,
}

/// LRU-bounded medium living inside the current process.
///
/// Entries are invisible to other processes, so negative entries written
/// here do not shield the store from lookups made elsewhere.
pub struct MemoryMedium {
    entries: Mutex<LruCache<String, StoredEntry>>,
    clock: Clock,
}

impl MemoryMedium {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            clock: Arc::new(OffsetDateTime::now_utc),
        }
    }

    /// Replace the time source used for expiry checks.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> OffsetDateTime + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        mutex_guard(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        mutex_guard(&self.entries, SOURCE, "contains").contains(key)
    }
}

impl fmt::Debug for MemoryMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMedium")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheMedium for MemoryMedium {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError> {
        let now = (self.clock)();
        let mut entries = mutex_guard(&self.entries, SOURCE, "get_many");
        let mut found = HashMap::with_capacity(keys.len());

        for key in keys {
            let expired = match entries.get(key) {
                Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => true,
                Some(entry) => {
                    found.insert(key.clone(), entry.bytes.clone());
                    false
                }
                None => false,
            };
            if expired {
                entries.pop(key);
            }
        }

        Ok(found)
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        expiry: Expiry,
    ) -> Result<Vec<String>, CacheError> {
        let entry = StoredEntry {
            bytes: value,
            expires_at: expiry.deadline((self.clock)()),
        };
        let mut entries = mutex_guard(&self.entries, SOURCE, "set");
        match entries.push(key.to_string(), entry) {
            Some((evicted, _)) if evicted != key => {
                counter!(METRIC_MEMORY_EVICT_TOTAL).increment(1);
                Ok(vec![evicted])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = mutex_guard(&self.entries, SOURCE, "delete_many");
        for key in keys {
            entries.pop(key);
        }
        Ok(())
    }
}
