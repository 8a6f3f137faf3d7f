//! Query result caching.
//!
//! Filter queries are cached as `(ids, total)` under a key derived from a
//! digest of the canonical filter, order and paging; the entities themselves
//! are then loaded through the entity loader.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::repos::RepoError;
use crate::domain::types::EntityId;

use super::keys::{CacheKey, Tag, digest};
use super::loader::degrade;
use super::medium::{CacheError, Expiry};
use super::store::{CacheLookup, CacheStore};

const SOURCE: &str = "cache::query";

/// A single filter criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Id(EntityId),
    Text(String),
    List(Vec<FilterValue>),
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<EntityId> for FilterValue {
    fn from(value: EntityId) -> Self {
        FilterValue::Id(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Paging {
    pub page: u32,
    pub per_page: u32,
}

impl Paging {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }
}

/// Filter, order and paging of a list query.
///
/// Criteria are kept in a sorted map so the order they were added in never
/// changes the digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterQuery {
    filter: BTreeMap<String, FilterValue>,
    order: Vec<(String, SortDirection)>,
    paging: Option<Paging>,
}

impl FilterQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    pub fn paged(mut self, page: u32, per_page: u32) -> Self {
        self.paging = Some(Paging::new(page, per_page));
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.filter.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.filter.get(key) {
            Some(FilterValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.filter.get(key) {
            Some(FilterValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.filter.get(key) {
            Some(FilterValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Text members of a list criterion; a single text value counts as a list of one.
    pub fn texts(&self, key: &str) -> Option<Vec<&str>> {
        match self.filter.get(key)? {
            FilterValue::Text(value) => Some(vec![value.as_str()]),
            FilterValue::List(values) => Some(
                values
                    .iter()
                    .filter_map(|value| match value {
                        FilterValue::Text(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Integer members of a list criterion; a single integer counts as a list of one.
    pub fn ints(&self, key: &str) -> Option<Vec<i64>> {
        self.members(key, |value| match value {
            FilterValue::Int(int) => Some(*int),
            FilterValue::Id(id) => i64::try_from(*id).ok(),
            _ => None,
        })
    }

    /// Entity id members of a list criterion. Negative integers are skipped.
    pub fn ids(&self, key: &str) -> Option<Vec<EntityId>> {
        self.members(key, |value| match value {
            FilterValue::Id(id) => Some(*id),
            FilterValue::Int(int) => EntityId::try_from(*int).ok(),
            _ => None,
        })
    }

    fn members<T>(&self, key: &str, pick: impl Fn(&FilterValue) -> Option<T>) -> Option<Vec<T>> {
        match self.filter.get(key)? {
            FilterValue::List(values) => Some(values.iter().filter_map(&pick).collect()),
            FilterValue::Bool(_) | FilterValue::Text(_) => None,
            single => Some(pick(single).into_iter().collect()),
        }
    }

    pub fn order(&self) -> &[(String, SortDirection)] {
        &self.order
    }

    pub fn paging(&self) -> Option<Paging> {
        self.paging
    }

    /// Hex SHA-256 of the canonical JSON form of filter, order and paging.
    pub fn digest(&self) -> Result<String, CacheError> {
        digest(self)
    }
}

/// Cached outcome of a list query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedIds {
    pub ids: Vec<EntityId>,
    pub total: u64,
}

/// Tags and lifetime of one cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPolicy {
    pub tags: Vec<Tag>,
    pub expiry: Expiry,
}

impl EntryPolicy {
    pub fn new(tags: Vec<Tag>, expiry: Expiry) -> Self {
        Self { tags, expiry }
    }
}

/// Caches derived values such as id lists, lookups and query results.
pub struct QueryCache {
    store: Arc<CacheStore>,
    enabled: bool,
}

impl QueryCache {
    pub fn new(store: Arc<CacheStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Return the value cached under `key`, computing and caching it on a miss.
    ///
    /// Errors of `load` are returned as they are and nothing is cached.
    pub async fn cached<T, E, F, Fut>(
        &self,
        key: CacheKey,
        policy: EntryPolicy,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        E: From<RepoError>,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let loaded = self
            .cached_optional(key, |_| policy.clone(), policy.clone(), || async move {
                load().await.map(Some)
            })
            .await?;
        match loaded {
            Some(value) => Ok(value),
            None => Err(RepoError::NotFound.into()),
        }
    }

    /// Like [`QueryCache::cached`], but an absent value is cached negatively.
    ///
    /// The positive policy may depend on the value, e.g. to tag a lookup with
    /// the id it resolved to.
    pub async fn cached_optional<T, E, P, F, Fut>(
        &self,
        key: CacheKey,
        positive: P,
        negative: EntryPolicy,
        load: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        P: FnOnce(&T) -> EntryPolicy + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
    {
        if !self.enabled {
            return load().await;
        }

        let degraded = match self.store.get::<T>(&key).await {
            Ok(CacheLookup::Hit(value)) => return Ok(Some(value)),
            Ok(CacheLookup::NegativeHit) => return Ok(None),
            Ok(CacheLookup::Miss) => false,
            Err(err) => {
                degrade("query", "get", &err);
                true
            }
        };

        let value = load().await?;
        if degraded {
            return Ok(value);
        }

        let written = match &value {
            Some(found) => {
                let policy = positive(found);
                self.store
                    .set(&key, Some(found), &policy.tags, policy.expiry)
                    .await
            }
            None => {
                self.store
                    .set::<T>(&key, None, &negative.tags, negative.expiry)
                    .await
            }
        };
        if let Err(err) = written {
            warn!(
                source = SOURCE,
                key = %key,
                error = %err,
                "Failed to cache derived value"
            );
        }

        Ok(value)
    }

    /// Cache the result of `filter` under `namespace(digest)`.
    ///
    /// Usually the result is [`CachedIds`]; small collections may be cached whole.
    pub async fn query<T, E, N, F, Fut>(
        &self,
        namespace: N,
        filter: &FilterQuery,
        policy: EntryPolicy,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        E: From<RepoError>,
        N: FnOnce(String) -> CacheKey,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if !self.enabled {
            return fetch().await;
        }
        let key = match filter.digest() {
            Ok(digest) => namespace(digest),
            Err(err) => {
                degrade("query", "digest", &err);
                return fetch().await;
            }
        };
        self.cached(key, policy, fetch).await
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::memory::MemoryMedium;

    fn queries() -> (QueryCache, Arc<CacheStore>) {
        let medium = Arc::new(MemoryMedium::new(NonZeroUsize::MIN.saturating_add(31)));
        let store = Arc::new(CacheStore::new(medium));
        (QueryCache::new(Arc::clone(&store), true), store)
    }

    #[test]
    fn digest_is_independent_of_insertion_order() {
        let first = FilterQuery::new()
            .with("type", vec!["open", "close"])
            .with("user_owner_id", 5_u64)
            .order_by("blog_rating", SortDirection::Desc)
            .paged(1, 10);
        let second = FilterQuery::new()
            .with("user_owner_id", 5_u64)
            .with("type", vec!["open", "close"])
            .order_by("blog_rating", SortDirection::Desc)
            .paged(1, 10);

        assert_eq!(first.digest().expect("digest"), second.digest().expect("digest"));
    }

    #[test]
    fn digest_changes_with_page_and_order() {
        let base = FilterQuery::new().with("type", "open");
        let paged = base.clone().paged(2, 10);
        let ordered = base.clone().order_by("blog_title", SortDirection::Asc);

        let digests = [
            base.digest().expect("digest"),
            paged.digest().expect("digest"),
            ordered.digest().expect("digest"),
        ];
        assert_ne!(digests[0], digests[1]);
        assert_ne!(digests[0], digests[2]);
    }

    #[test]
    fn list_accessors_accept_single_values() {
        let filter = FilterQuery::new().with("type", "open").with("ids", vec![1_i64, 2]);
        assert_eq!(filter.texts("type"), Some(vec!["open"]));
        assert_eq!(filter.ints("ids"), Some(vec![1, 2]));
        assert_eq!(filter.text("missing"), None);
    }

    #[test]
    fn ids_beyond_signed_range_keep_distinct_digests() {
        let high = FilterQuery::new().with("blog_id", u64::MAX);
        let lower = FilterQuery::new().with("blog_id", u64::MAX - 1);
        let signed_max = FilterQuery::new().with("blog_id", i64::MAX);

        let digests = [
            high.digest().expect("digest"),
            lower.digest().expect("digest"),
            signed_max.digest().expect("digest"),
        ];
        assert_ne!(digests[0], digests[1]);
        assert_ne!(digests[0], digests[2]);
        assert_eq!(high.ids("blog_id"), Some(vec![u64::MAX]));
        assert_eq!(high.ints("blog_id"), Some(Vec::new()));
    }

    #[test]
    fn id_and_int_forms_of_one_value_share_a_digest() {
        let as_id = FilterQuery::new().with("user_owner_id", 5_u64);
        let as_int = FilterQuery::new().with("user_owner_id", 5_i64);
        assert_eq!(as_id.digest().expect("digest"), as_int.digest().expect("digest"));
        assert_eq!(as_int.ids("user_owner_id"), Some(vec![5]));
    }

    #[tokio::test]
    async fn reordered_filter_is_served_from_cache() {
        let (queries, _store) = queries();
        let calls = AtomicUsize::new(0);
        let first = FilterQuery::new()
            .with("type", vec!["open", "close"])
            .with("user_owner_id", 5_u64)
            .with("exclude_type", "personal")
            .order_by("blog_rating", SortDirection::Desc)
            .paged(2, 10);
        let second = FilterQuery::new()
            .with("exclude_type", "personal")
            .with("user_owner_id", 5_u64)
            .with("type", vec!["open", "close"])
            .order_by("blog_rating", SortDirection::Desc)
            .paged(2, 10);

        for filter in [&first, &second] {
            let result: CachedIds = queries
                .query(
                    CacheKey::BlogFilter,
                    filter,
                    EntryPolicy::new(vec![Tag::BlogUpdate, Tag::BlogNew], Expiry::Never),
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, RepoError>(CachedIds {
                            ids: vec![8, 2],
                            total: 12,
                        })
                    },
                )
                .await
                .expect("query");
            assert_eq!(result.total, 12);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_fetches_once_per_digest() {
        let (queries, store) = queries();
        let calls = AtomicUsize::new(0);
        let filter = FilterQuery::new().with("type", "open").paged(1, 5);

        for _ in 0..2 {
            let result: CachedIds = queries
                .query(
                    CacheKey::BlogFilter,
                    &filter,
                    EntryPolicy::new(vec![Tag::BlogUpdate, Tag::BlogNew], Expiry::Never),
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, RepoError>(CachedIds {
                            ids: vec![3, 1],
                            total: 2,
                        })
                    },
                )
                .await
                .expect("query");
            assert_eq!(result.ids, vec![3, 1]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.index().keys_for_tags(&[Tag::BlogNew]).len(), 1);
    }

    #[tokio::test]
    async fn optional_lookup_caches_absence_with_negative_policy() {
        let (queries, store) = queries();
        let key = CacheKey::BlogUrl("ghost".into());

        for _ in 0..2 {
            let found = queries
                .cached_optional(
                    key.clone(),
                    |id: &u64| EntryPolicy::new(vec![Tag::BlogUpdateId(*id)], Expiry::Never),
                    EntryPolicy::new(vec![Tag::BlogUpdate, Tag::BlogNew], Expiry::Never),
                    || async { Ok::<_, RepoError>(None) },
                )
                .await
                .expect("lookup");
            assert_eq!(found, None);
        }

        assert_eq!(store.get::<u64>(&key).await.expect("get"), CacheLookup::NegativeHit);
        assert!(store.index().keys_for_tags(&[Tag::BlogNew]).contains(&key));
    }

    #[tokio::test]
    async fn store_failure_is_not_cached() {
        let (queries, store) = queries();

        let result = queries
            .cached::<CachedIds, RepoError, _, _>(
                CacheKey::BlogTypes,
                EntryPolicy::new(vec![Tag::BlogUpdate], Expiry::Never),
                || async { Err(RepoError::Timeout) },
            )
            .await;

        assert!(matches!(result, Err(RepoError::Timeout)));
        assert!(store.get::<CachedIds>(&CacheKey::BlogTypes).await.expect("get").is_miss());
    }
}
