//! Typed cache store over a [`CacheMedium`].
//!
//! Values are stored as JSON envelopes that distinguish a cached value from a
//! cached absence, so a negative entry is never confused with a miss.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::keys::{CacheKey, Tag};
use super::medium::{CacheError, CacheMedium, Expiry};
use super::tags::TagIndex;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_HIT_TOTAL: &str = "blogcache_cache_hit_total";
const METRIC_CACHE_NEGATIVE_HIT_TOTAL: &str = "blogcache_cache_negative_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "blogcache_cache_miss_total";
const METRIC_CACHE_PURGED_KEYS_TOTAL: &str = "blogcache_cache_purged_keys_total";

/// Outcome of a single cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// The entry holds a value.
    Hit(T),
    /// The entry records that the value does not exist in the store.
    NegativeHit,
    /// Nothing usable is cached.
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Slot<T> {
    Present(T),
    Absent,
}

/// Typed facade keeping the medium and the tag index in step.
pub struct CacheStore {
    medium: Arc<dyn CacheMedium>,
    index: TagIndex,
}

impl CacheStore {
    pub fn new(medium: Arc<dyn CacheMedium>) -> Self {
        Self {
            medium,
            index: TagIndex::new(),
        }
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<CacheLookup<T>, CacheError> {
        let mut found = self.get_many(std::slice::from_ref(key)).await?;
        Ok(found.remove(key).unwrap_or(CacheLookup::Miss))
    }

    /// Look up several keys with one medium round trip.
    ///
    /// Every requested key appears in the result, misses included.
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, CacheLookup<T>>, CacheError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        let raw = self.medium.get_many(&rendered).await?;

        let mut lookups = HashMap::with_capacity(keys.len());
        let mut vanished = Vec::new();
        for (key, name) in keys.iter().zip(&rendered) {
            let lookup = match raw.get(name) {
                Some(bytes) => decode(name, bytes),
                None => {
                    vanished.push(key);
                    CacheLookup::Miss
                }
            };

            match &lookup {
                CacheLookup::Hit(_) => counter!(METRIC_CACHE_HIT_TOTAL).increment(1),
                CacheLookup::NegativeHit => {
                    counter!(METRIC_CACHE_NEGATIVE_HIT_TOTAL).increment(1)
                }
                CacheLookup::Miss => counter!(METRIC_CACHE_MISS_TOTAL).increment(1),
            }
            lookups.insert(key.clone(), lookup);
        }

        // Expired entries are dropped by the medium on read.
        self.index.unregister_many(vanished);

        Ok(lookups)
    }

    /// Store `value` (or a negative entry for `None`) and register it under `tags`.
    pub async fn set<T: Serialize + ?Sized + Sync>(
        &self,
        key: &CacheKey,
        value: Option<&T>,
        tags: &[Tag],
        expiry: Expiry,
    ) -> Result<(), CacheError> {
        let slot = match value {
            Some(value) => Slot::Present(value),
            None => Slot::Absent,
        };
        let payload = Bytes::from(serde_json::to_vec(&slot)?);

        let evicted = self.medium.set(&key.to_string(), payload, expiry).await?;
        self.index.register(key, tags);
        if !evicted.is_empty() {
            self.index.unregister_names(&evicted);
        }

        debug!(
            source = SOURCE,
            key = %key,
            negative = value.is_none(),
            tags = tags.len(),
            "Cache entry stored"
        );
        Ok(())
    }

    pub async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.delete_many(std::slice::from_ref(key)).await
    }

    pub async fn delete_many(&self, keys: &[CacheKey]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.medium.delete_many(&rendered).await?;
        self.index.unregister_many(keys);
        Ok(())
    }

    pub async fn purge_tag(&self, tag: &Tag) -> Result<usize, CacheError> {
        self.purge_tags(std::slice::from_ref(tag)).await
    }

    /// Delete every key registered under any of `tags`, then forget the tags.
    ///
    /// Returns the number of distinct keys deleted. When the medium rejects
    /// the delete the registrations stay in place so a later purge retries.
    pub async fn purge_tags(&self, tags: &[Tag]) -> Result<usize, CacheError> {
        let keys = self.index.keys_for_tags(tags);
        if keys.is_empty() {
            return Ok(0);
        }

        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.medium.delete_many(&rendered).await?;
        self.index.unregister_many(&keys);
        self.index.remove_tags(tags);

        counter!(METRIC_CACHE_PURGED_KEYS_TOTAL).increment(keys.len() as u64);
        debug!(
            source = SOURCE,
            tags = tags.len(),
            keys = keys.len(),
            "Purged tagged cache entries"
        );
        Ok(keys.len())
    }
}

fn decode<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> CacheLookup<T> {
    match serde_json::from_slice::<Slot<T>>(bytes) {
        Ok(Slot::Present(value)) => CacheLookup::Hit(value),
        Ok(Slot::Absent) => CacheLookup::NegativeHit,
        Err(err) => {
            warn!(
                source = SOURCE,
                key = name,
                error = %err,
                "Undecodable cache payload treated as miss"
            );
            CacheLookup::Miss
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::memory::MemoryMedium;

    fn memory() -> Arc<MemoryMedium> {
        Arc::new(MemoryMedium::new(NonZeroUsize::MIN.saturating_add(63)))
    }

    /// Wraps a memory medium and rejects deletes while `fail_delete` is set.
    struct StickyMedium {
        inner: MemoryMedium,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl CacheMedium for StickyMedium {
        async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError> {
            self.inner.get_many(keys).await
        }

        async fn set(
            &self,
            key: &str,
            value: Bytes,
            expiry: Expiry,
        ) -> Result<Vec<String>, CacheError> {
            self.inner.set(key, value, expiry).await
        }

        async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(CacheError::unavailable("delete rejected"));
            }
            self.inner.delete_many(keys).await
        }
    }

    #[tokio::test]
    async fn distinguishes_hit_negative_and_miss() {
        let store = CacheStore::new(memory());
        store
            .set(&CacheKey::Blog(1), Some(&"first".to_string()), &[], Expiry::Never)
            .await
            .expect("set");
        store
            .set::<String>(&CacheKey::Blog(2), None, &[], Expiry::Never)
            .await
            .expect("set");

        let lookups = store
            .get_many::<String>(&[CacheKey::Blog(1), CacheKey::Blog(2), CacheKey::Blog(3)])
            .await
            .expect("get");
        assert_eq!(lookups[&CacheKey::Blog(1)], CacheLookup::Hit("first".to_string()));
        assert_eq!(lookups[&CacheKey::Blog(2)], CacheLookup::NegativeHit);
        assert_eq!(lookups[&CacheKey::Blog(3)], CacheLookup::Miss);
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let medium = memory();
        medium
            .set("blog_4", Bytes::from_static(b"not json"), Expiry::Never)
            .await
            .expect("raw set");
        let store = CacheStore::new(medium);

        let lookup = store.get::<String>(&CacheKey::Blog(4)).await.expect("get");
        assert!(lookup.is_miss());
    }

    #[tokio::test]
    async fn purge_deletes_union_once_and_is_idempotent() {
        let medium = memory();
        let store = CacheStore::new(medium.clone());
        store
            .set(&CacheKey::BlogTypes, Some(&1_u8), &[Tag::BlogUpdate, Tag::BlogNew], Expiry::Never)
            .await
            .expect("set");
        store
            .set(&CacheKey::Blog(5), Some(&2_u8), &[Tag::BlogUpdateId(5)], Expiry::Never)
            .await
            .expect("set");

        let purged = store
            .purge_tags(&[Tag::BlogUpdate, Tag::BlogNew])
            .await
            .expect("purge");
        assert_eq!(purged, 1);
        assert!(!medium.contains("blog_types"));
        assert!(medium.contains("blog_5"));
        assert!(!store.index().contains_tag(&Tag::BlogNew));

        assert_eq!(store.purge_tag(&Tag::BlogUpdate).await.expect("purge"), 0);
        assert_eq!(store.purge_tag(&Tag::TopicNew).await.expect("purge"), 0);
    }

    #[tokio::test]
    async fn failed_purge_keeps_registrations_for_retry() {
        let medium = Arc::new(StickyMedium {
            inner: MemoryMedium::new(NonZeroUsize::MIN.saturating_add(7)),
            fail_delete: AtomicBool::new(true),
        });
        let store = CacheStore::new(medium.clone());
        store
            .set(&CacheKey::Blog(1), Some(&1_u8), &[Tag::BlogUpdate], Expiry::Never)
            .await
            .expect("set");

        assert!(store.purge_tag(&Tag::BlogUpdate).await.is_err());
        assert!(store.index().is_registered(&CacheKey::Blog(1)));

        medium.fail_delete.store(false, Ordering::SeqCst);
        assert_eq!(store.purge_tag(&Tag::BlogUpdate).await.expect("retry"), 1);
        assert!(!medium.inner.contains("blog_1"));
    }

    #[tokio::test]
    async fn expired_entry_is_unregistered_on_miss() {
        let store = CacheStore::new(memory());
        let past = OffsetDateTime::now_utc() - Duration::from_secs(1);
        store
            .set(&CacheKey::Blog(9), Some(&9_u8), &[Tag::BlogUpdate], Expiry::At(past))
            .await
            .expect("set");
        assert!(store.index().is_registered(&CacheKey::Blog(9)));

        let lookup = store.get::<u8>(&CacheKey::Blog(9)).await.expect("get");
        assert!(lookup.is_miss());
        assert!(!store.index().is_registered(&CacheKey::Blog(9)));
        assert_eq!(store.index().tag_count(), 0);
    }

    #[tokio::test]
    async fn index_follows_medium_evictions() {
        let medium = Arc::new(MemoryMedium::new(NonZeroUsize::MIN.saturating_add(1)));
        let store = CacheStore::new(medium.clone());

        for n in 0..1_000 {
            store
                .set(
                    &CacheKey::BlogFilter(format!("{n:04}")),
                    Some(&n),
                    &[Tag::BlogNew],
                    Expiry::Never,
                )
                .await
                .expect("set");
            assert!(store.index().key_count() <= medium.len());
        }

        assert_eq!(store.index().key_count(), 2);
        let survivors = store.index().keys_for_tags(&[Tag::BlogNew]);
        assert!(survivors.contains(&CacheKey::BlogFilter("0999".into())));
        assert!(!survivors.contains(&CacheKey::BlogFilter("0000".into())));
    }

    #[tokio::test]
    async fn set_replaces_previous_tags() {
        let store = CacheStore::new(memory());
        let key = CacheKey::BlogUrl("news".into());
        store
            .set(&key, Some(&3_u64), &[Tag::BlogUpdateId(3)], Expiry::Never)
            .await
            .expect("set");
        store
            .set::<u64>(&key, None, &[Tag::BlogUpdate, Tag::BlogNew], Expiry::Never)
            .await
            .expect("set");

        assert!(store.index().keys_for_tags(&[Tag::BlogUpdateId(3)]).is_empty());
        assert_eq!(store.index().tags_for_key(&key).len(), 2);
    }
}
