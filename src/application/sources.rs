//! Entity families loaded through the cache loader.

use async_trait::async_trait;

use crate::application::repos::{BlogUsersRepo, BlogsRepo, RepoError};
use crate::cache::{BatchSource, CacheKey, CacheTtls, SourceExpiry, Tag, expiry};
use crate::domain::entities::{BlogRecord, BlogUserRecord};
use crate::domain::types::{EntityId, UserId};

/// Blogs by id.
pub(crate) struct BlogSource<'a> {
    repo: &'a dyn BlogsRepo,
    ttl: &'a CacheTtls,
}

impl<'a> BlogSource<'a> {
    pub(crate) fn new(repo: &'a dyn BlogsRepo, ttl: &'a CacheTtls) -> Self {
        Self { repo, ttl }
    }
}

#[async_trait]
impl BatchSource for BlogSource<'_> {
    type Entity = BlogRecord;

    fn name(&self) -> &'static str {
        "blog"
    }

    fn id_of(&self, entity: &BlogRecord) -> EntityId {
        entity.id
    }

    fn entity_key(&self, id: EntityId) -> CacheKey {
        CacheKey::Blog(id)
    }

    fn batch_key(&self, ids: &[EntityId]) -> CacheKey {
        CacheKey::blog_batch(ids)
    }

    fn batch_tags(&self, _ids: &[EntityId]) -> Vec<Tag> {
        vec![Tag::BlogUpdate]
    }

    fn expiry(&self) -> SourceExpiry {
        SourceExpiry {
            entity: expiry(self.ttl.blog),
            negative: expiry(self.ttl.blog_negative),
            batch: expiry(self.ttl.blog_batch),
        }
    }

    async fn fetch(&self, ids: &[EntityId]) -> Result<Vec<BlogRecord>, RepoError> {
        self.repo.find_by_ids(ids).await
    }
}

/// One user's memberships, keyed by blog id.
pub(crate) struct BlogUserSource<'a> {
    repo: &'a dyn BlogUsersRepo,
    ttl: &'a CacheTtls,
    user_id: UserId,
}

impl<'a> BlogUserSource<'a> {
    pub(crate) fn new(repo: &'a dyn BlogUsersRepo, ttl: &'a CacheTtls, user_id: UserId) -> Self {
        Self { repo, ttl, user_id }
    }
}

#[async_trait]
impl BatchSource for BlogUserSource<'_> {
    type Entity = BlogUserRecord;

    fn name(&self) -> &'static str {
        "blog_user"
    }

    fn id_of(&self, entity: &BlogUserRecord) -> EntityId {
        entity.blog_id
    }

    fn entity_key(&self, id: EntityId) -> CacheKey {
        CacheKey::BlogUser {
            blog_id: id,
            user_id: self.user_id,
        }
    }

    fn batch_key(&self, ids: &[EntityId]) -> CacheKey {
        CacheKey::blog_user_batch(self.user_id, ids)
    }

    fn batch_tags(&self, _ids: &[EntityId]) -> Vec<Tag> {
        vec![Tag::BlogUpdate, Tag::RelationChangeUser(self.user_id)]
    }

    fn expiry(&self) -> SourceExpiry {
        SourceExpiry {
            entity: expiry(self.ttl.relation),
            negative: expiry(self.ttl.relation_negative),
            batch: expiry(self.ttl.relation_batch),
        }
    }

    async fn fetch(&self, ids: &[EntityId]) -> Result<Vec<BlogUserRecord>, RepoError> {
        self.repo.find_for_blogs(ids, self.user_id).await
    }
}
