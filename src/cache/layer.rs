//! Wiring of the cache components around one shared store.

use std::sync::Arc;

use super::config::CacheConfig;
use super::invalidation::Invalidator;
use super::loader::{EntityLoader, LoadMode};
use super::medium::CacheMedium;
use super::memory::MemoryMedium;
use super::query::QueryCache;
use super::store::CacheStore;

/// Store, loader, query cache and invalidator sharing one medium.
pub struct CacheLayer {
    config: CacheConfig,
    store: Arc<CacheStore>,
    loader: EntityLoader,
    queries: QueryCache,
    invalidator: Invalidator,
}

impl CacheLayer {
    pub fn new(config: CacheConfig, medium: Arc<dyn CacheMedium>) -> Self {
        let store = Arc::new(CacheStore::new(medium));
        let mode = if config.solid {
            LoadMode::Solid
        } else {
            LoadMode::PerId
        };

        Self {
            loader: EntityLoader::new(Arc::clone(&store), mode, config.enabled),
            queries: QueryCache::new(Arc::clone(&store), config.enabled),
            invalidator: Invalidator::new(Arc::clone(&store), config.enabled),
            store,
            config,
        }
    }

    /// Layer backed by a process-local LRU sized from the configuration.
    pub fn in_memory(config: CacheConfig) -> Self {
        let medium = Arc::new(MemoryMedium::new(config.memory_capacity_non_zero()));
        Self::new(config, medium)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn loader(&self) -> &EntityLoader {
        &self.loader
    }

    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_flag_selects_load_mode() {
        let layer = CacheLayer::in_memory(CacheConfig {
            solid: true,
            ..Default::default()
        });
        assert_eq!(layer.loader().mode(), LoadMode::Solid);

        let layer = CacheLayer::in_memory(CacheConfig::default());
        assert_eq!(layer.loader().mode(), LoadMode::PerId);
    }
}
