//! Batched read-through loading of entities by id.
//!
//! Per-id mode caches every entity under its own key and remembers ids the
//! store does not know with negative entries. Solid mode caches the whole
//! requested id set under one composite key instead.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::application::repos::RepoError;
use crate::domain::types::{EntityId, IdInput, RequestedId};

use super::keys::{CacheKey, Tag};
use super::medium::{CacheError, Expiry};
use super::store::{CacheLookup, CacheStore};

const SOURCE: &str = "cache::loader";
const METRIC_CACHE_DEGRADED_TOTAL: &str = "blogcache_cache_degraded_total";
const METRIC_STORE_FETCH_TOTAL: &str = "blogcache_store_fetch_total";

/// Lifetimes a source assigns to its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceExpiry {
    pub entity: Expiry,
    pub negative: Expiry,
    pub batch: Expiry,
}

/// A family of entities the loader can fetch in batches.
#[async_trait]
pub trait BatchSource: Send + Sync {
    type Entity: Serialize + DeserializeOwned + Clone + Send + Sync;

    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    fn id_of(&self, entity: &Self::Entity) -> EntityId;

    fn entity_key(&self, id: EntityId) -> CacheKey;

    fn entity_tags(&self, _entity: &Self::Entity) -> Vec<Tag> {
        Vec::new()
    }

    fn negative_tags(&self, _id: EntityId) -> Vec<Tag> {
        Vec::new()
    }

    /// Composite key for solid mode; `ids` are sorted and unique.
    fn batch_key(&self, ids: &[EntityId]) -> CacheKey;

    fn batch_tags(&self, ids: &[EntityId]) -> Vec<Tag>;

    fn expiry(&self) -> SourceExpiry;

    /// Fetch whatever of `ids` exists. Missing ids are simply left out.
    async fn fetch(&self, ids: &[EntityId]) -> Result<Vec<Self::Entity>, RepoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    PerId,
    Solid,
}

/// Result of a batched load in request order.
///
/// Each distinct requested id appears once, at the position of its first
/// occurrence; ids that failed validation or do not exist carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBatch<E> {
    entries: Vec<(RequestedId, Option<E>)>,
}

impl<E> LoadedBatch<E> {
    fn assemble(requested: Vec<RequestedId>, mut resolved: HashMap<EntityId, E>) -> Self {
        let entries = requested
            .into_iter()
            .map(|requested| {
                let value = requested.valid().and_then(|id| resolved.remove(&id));
                (requested, value)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: EntityId) -> Option<&E> {
        self.entries
            .iter()
            .find(|(requested, _)| requested.valid() == Some(id))
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn found(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().filter_map(|(_, value)| value.as_ref())
    }

    pub fn into_found(self) -> Vec<E> {
        self.entries
            .into_iter()
            .filter_map(|(_, value)| value)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RequestedId, Option<E>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-through loader shared by every entity family.
pub struct EntityLoader {
    store: Arc<CacheStore>,
    mode: LoadMode,
    enabled: bool,
}

impl EntityLoader {
    pub fn new(store: Arc<CacheStore>, mode: LoadMode, enabled: bool) -> Self {
        Self {
            store,
            mode,
            enabled,
        }
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// Load `ids` from the cache, falling back to one batched store fetch.
    pub async fn load_by_ids<S, I>(
        &self,
        source: &S,
        ids: &[I],
    ) -> Result<LoadedBatch<S::Entity>, RepoError>
    where
        S: BatchSource + ?Sized,
        I: IdInput + Sync,
    {
        let requested = dedup_requested(ids);
        let valid: Vec<EntityId> = requested.iter().filter_map(RequestedId::valid).collect();
        if valid.is_empty() {
            return Ok(LoadedBatch::assemble(requested, HashMap::new()));
        }

        let resolved = if !self.enabled {
            index_by_id(source, fetch(source, &valid).await?)
        } else {
            match self.mode {
                LoadMode::PerId => self.load_per_id(source, &valid).await?,
                LoadMode::Solid => self.load_solid(source, &valid).await?,
            }
        };

        Ok(LoadedBatch::assemble(requested, resolved))
    }

    /// Write positive per-id entries for entities obtained outside the loader.
    pub async fn prime<S>(&self, source: &S, entities: &[S::Entity])
    where
        S: BatchSource + ?Sized,
    {
        if !self.enabled || self.mode != LoadMode::PerId {
            return;
        }
        let expiry = source.expiry().entity;
        for entity in entities {
            let key = source.entity_key(source.id_of(entity));
            if let Err(err) = self
                .store
                .set(&key, Some(entity), &source.entity_tags(entity), expiry)
                .await
            {
                write_back_failed(source.name(), &key, &err);
                return;
            }
        }
    }

    async fn load_per_id<S>(
        &self,
        source: &S,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, S::Entity>, RepoError>
    where
        S: BatchSource + ?Sized,
    {
        let keys: Vec<CacheKey> = ids.iter().map(|id| source.entity_key(*id)).collect();
        let (mut lookups, degraded) = match self.store.get_many::<S::Entity>(&keys).await {
            Ok(lookups) => (lookups, false),
            Err(err) => {
                degrade(source.name(), "get_many", &err);
                (HashMap::new(), true)
            }
        };

        let mut resolved = HashMap::with_capacity(ids.len());
        let mut misses = Vec::new();
        let mut negative = 0_usize;
        for (id, key) in ids.iter().zip(&keys) {
            match lookups.remove(key) {
                Some(CacheLookup::Hit(entity)) => {
                    resolved.insert(*id, entity);
                }
                Some(CacheLookup::NegativeHit) => negative += 1,
                Some(CacheLookup::Miss) | None => misses.push(*id),
            }
        }

        debug!(
            source = SOURCE,
            family = source.name(),
            hits = resolved.len(),
            negative,
            misses = misses.len(),
            "Per-id cache lookup"
        );

        if misses.is_empty() {
            return Ok(resolved);
        }

        let mut fetched = index_by_id(source, fetch(source, &misses).await?);

        if !degraded {
            let expiry = source.expiry();
            for id in &misses {
                let key = source.entity_key(*id);
                let written = match fetched.get(id) {
                    Some(entity) => {
                        self.store
                            .set(&key, Some(entity), &source.entity_tags(entity), expiry.entity)
                            .await
                    }
                    None => {
                        self.store
                            .set::<S::Entity>(&key, None, &source.negative_tags(*id), expiry.negative)
                            .await
                    }
                };
                if let Err(err) = written {
                    write_back_failed(source.name(), &key, &err);
                    break;
                }
            }
        }

        for id in misses {
            if let Some(entity) = fetched.remove(&id) {
                resolved.insert(id, entity);
            }
        }
        Ok(resolved)
    }

    async fn load_solid<S>(
        &self,
        source: &S,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, S::Entity>, RepoError>
    where
        S: BatchSource + ?Sized,
    {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        let key = source.batch_key(&sorted);

        let degraded = match self.store.get::<Vec<S::Entity>>(&key).await {
            Ok(CacheLookup::Hit(entities)) => return Ok(index_by_id(source, entities)),
            Ok(CacheLookup::NegativeHit) => return Ok(HashMap::new()),
            Ok(CacheLookup::Miss) => false,
            Err(err) => {
                degrade(source.name(), "get", &err);
                true
            }
        };

        let fetched = fetch(source, &sorted).await?;
        if !degraded {
            let tags = source.batch_tags(&sorted);
            if let Err(err) = self
                .store
                .set(&key, Some(&fetched), &tags, source.expiry().batch)
                .await
            {
                write_back_failed(source.name(), &key, &err);
            }
        }

        Ok(index_by_id(source, fetched))
    }
}

async fn fetch<S>(source: &S, ids: &[EntityId]) -> Result<Vec<S::Entity>, RepoError>
where
    S: BatchSource + ?Sized,
{
    counter!(METRIC_STORE_FETCH_TOTAL, "source" => source.name()).increment(1);
    source.fetch(ids).await
}

fn index_by_id<S>(source: &S, entities: Vec<S::Entity>) -> HashMap<EntityId, S::Entity>
where
    S: BatchSource + ?Sized,
{
    entities
        .into_iter()
        .map(|entity| (source.id_of(&entity), entity))
        .collect()
}

fn dedup_requested<I: IdInput>(ids: &[I]) -> Vec<RequestedId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .map(I::to_requested)
        .filter(|requested| seen.insert(requested.clone()))
        .collect()
}

pub(crate) fn degrade(family: &'static str, op: &'static str, err: &CacheError) {
    counter!(METRIC_CACHE_DEGRADED_TOTAL, "op" => op).increment(1);
    warn!(
        source = SOURCE,
        family,
        op,
        error = %err,
        "Cache unavailable, reading through to the store"
    );
}

fn write_back_failed(family: &'static str, key: &CacheKey, err: &CacheError) {
    warn!(
        source = SOURCE,
        family,
        key = %key,
        error = %err,
        "Failed to write loaded entity back to cache"
    );
}
