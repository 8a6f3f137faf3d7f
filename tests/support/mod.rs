#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use blogcache::application::repos::{BlogsRepo, RecordPage, RepoError};
use blogcache::application::{BlogService, BlogTypeService, BlogUserService};
use blogcache::cache::{CacheConfig, CacheError, CacheLayer, CacheMedium, Expiry, MemoryMedium};
use blogcache::cache::FilterQuery;
use blogcache::config::BlogSettings;
use blogcache::domain::entities::BlogRecord;
use blogcache::domain::types::{BlogId, TopicId, UserId};
use blogcache::infra::memory::MemoryBlogStore;

/// Memory medium that can be switched into failing every call.
pub struct FlakyMedium {
    inner: MemoryMedium,
    failing: AtomicBool,
}

impl FlakyMedium {
    pub fn new() -> Self {
        Self {
            inner: MemoryMedium::new(NonZeroUsize::new(1_024).expect("non-zero capacity")),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::unavailable("medium switched off"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheMedium for FlakyMedium {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError> {
        self.check()?;
        self.inner.get_many(keys).await
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        expiry: Expiry,
    ) -> Result<Vec<String>, CacheError> {
        self.check()?;
        self.inner.set(key, value, expiry).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check()?;
        self.inner.delete_many(keys).await
    }
}

/// Services wired over one memory store and one cache layer.
pub struct Harness {
    pub store: Arc<MemoryBlogStore>,
    pub medium: Arc<FlakyMedium>,
    pub cache: Arc<CacheLayer>,
    pub blogs: BlogService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn solid() -> Self {
        Self::with_config(CacheConfig {
            solid: true,
            ..Default::default()
        })
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_reader(config, |store| store as Arc<dyn BlogsRepo>)
    }

    /// Wire the blog service over a reader derived from the memory store.
    pub fn with_reader(
        config: CacheConfig,
        reader: impl FnOnce(Arc<MemoryBlogStore>) -> Arc<dyn BlogsRepo>,
    ) -> Self {
        let store = Arc::new(MemoryBlogStore::with_default_types());
        let medium = Arc::new(FlakyMedium::new());
        let cache = Arc::new(CacheLayer::new(
            config,
            Arc::clone(&medium) as Arc<dyn CacheMedium>,
        ));

        let blog_types = Arc::new(BlogTypeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&cache),
        ));
        let blog_users = Arc::new(BlogUserService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&cache),
        ));
        let blogs = BlogService::new(
            reader(store.clone()),
            store.clone(),
            store.clone(),
            store.clone(),
            blog_users,
            blog_types,
            Arc::clone(&cache),
            BlogSettings::default(),
        );

        Self {
            store,
            medium,
            cache,
            blogs,
        }
    }
}

/// Blog reader whose author lookups time out; everything else reaches the store.
pub struct AuthorsDown(pub Arc<MemoryBlogStore>);

#[async_trait]
impl BlogsRepo for AuthorsDown {
    async fn find_by_ids(&self, ids: &[BlogId]) -> Result<Vec<BlogRecord>, RepoError> {
        self.0.find_by_ids(ids).await
    }

    async fn find_by_filter(
        &self,
        filter: &FilterQuery,
    ) -> Result<RecordPage<BlogRecord>, RepoError> {
        self.0.find_by_filter(filter).await
    }

    async fn find_id_by_url(&self, url: &str) -> Result<Option<BlogId>, RepoError> {
        self.0.find_id_by_url(url).await
    }

    async fn find_id_by_title(&self, title: &str) -> Result<Option<BlogId>, RepoError> {
        self.0.find_id_by_title(title).await
    }

    async fn find_personal_id(&self, owner_id: UserId) -> Result<Option<BlogId>, RepoError> {
        self.0.find_personal_id(owner_id).await
    }

    async fn list_ids_by_owner(&self, owner_id: UserId) -> Result<Vec<BlogId>, RepoError> {
        self.0.list_ids_by_owner(owner_id).await
    }

    async fn list_ids_by_owners(&self, owner_ids: &[UserId]) -> Result<Vec<BlogId>, RepoError> {
        self.0.list_ids_by_owners(owner_ids).await
    }

    async fn list_non_personal_ids(&self) -> Result<Vec<BlogId>, RepoError> {
        self.0.list_non_personal_ids().await
    }

    async fn list_close_ids(&self) -> Result<Vec<BlogId>, RepoError> {
        self.0.list_close_ids().await
    }

    async fn list_author_ids(&self, _blog_id: BlogId) -> Result<Vec<UserId>, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn list_rating_join_ids(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<BlogId>, RepoError> {
        self.0.list_rating_join_ids(user_id, limit).await
    }

    async fn list_topic_ids(&self, blog_ids: &[BlogId]) -> Result<Vec<TopicId>, RepoError> {
        self.0.list_topic_ids(blog_ids).await
    }

    async fn count_by_type(&self, type_code: &str) -> Result<u64, RepoError> {
        self.0.count_by_type(type_code).await
    }
}
