//! Tagged read-through cache.
//!
//! - **Store**: typed entries over a [`CacheMedium`], with negative entries
//! - **Tag index**: tag → keys mapping used to purge related entries together
//! - **Loader**: batched per-id or solid loading of entities by id
//! - **Query cache**: `(ids, total)` results of filter queries and other derived values
//! - **Invalidation**: mutations mapped to tag purges and key deletions
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `blogcache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! solid = false
//! memory_capacity = 10000
//!
//! [cache.ttl]
//! blog = 345600
//! # ... see config.rs for all lifetimes
//! ```

mod config;
mod invalidation;
mod keys;
mod layer;
mod loader;
pub(crate) mod lock;
mod medium;
mod memory;
mod query;
mod store;
mod tags;

pub use config::{CacheConfig, CacheTtls, expiry};
pub use invalidation::{InvalidationPlan, InvalidationReport, Invalidator, Mutation};
pub use keys::{CacheKey, Tag, digest};
pub use layer::CacheLayer;
pub use loader::{BatchSource, EntityLoader, LoadMode, LoadedBatch, SourceExpiry};
pub use medium::{CacheError, CacheMedium, Expiry};
pub use memory::MemoryMedium;
pub use query::{
    CachedIds, EntryPolicy, FilterQuery, FilterValue, Paging, QueryCache, SortDirection,
};
pub use store::{CacheLookup, CacheStore};
pub use tags::TagIndex;
