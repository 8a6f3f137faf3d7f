//! Cache key and tag definitions.
//!
//! Every key and tag is built from a typed variant; the string rendering is
//! what reaches the cache medium and stays compatible with entries written
//! by other processes sharing that medium.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::types::{BlogId, BlogTypeId, EntityId, TopicId, UserId};

use super::medium::CacheError;

/// Cache entry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    // Per-entity entries
    Blog(BlogId),
    BlogType(BlogTypeId),
    BlogUser { blog_id: BlogId, user_id: UserId },
    Topic(TopicId),

    // Whole-batch entries (ids kept sorted)
    BlogBatch(Vec<BlogId>),
    BlogUserBatch { user_id: UserId, blog_ids: Vec<BlogId> },

    // Natural-key lookups resolving to an id
    BlogUrl(String),
    BlogTitle(String),

    // Query results keyed by a canonical filter digest
    BlogFilter(String),
    BlogUserFilter(String),

    // Derived collections
    BlogTypes,
    AuthorsByBlog(BlogId),
    RatingJoin { user_id: UserId, limit: u32 },
    AccessibleBlogs(UserId),
    /// `None` is the anonymous viewer.
    InaccessibleBlogs(Option<UserId>),
}

impl CacheKey {
    /// Composite key for a set of blogs; ids are sorted and deduplicated.
    pub fn blog_batch(ids: &[BlogId]) -> Self {
        CacheKey::BlogBatch(sorted_unique(ids))
    }

    /// Composite key for one user's relations with a set of blogs.
    pub fn blog_user_batch(user_id: UserId, blog_ids: &[BlogId]) -> Self {
        CacheKey::BlogUserBatch {
            user_id,
            blog_ids: sorted_unique(blog_ids),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Blog(id) => write!(f, "blog_{id}"),
            CacheKey::BlogType(id) => write!(f, "blog_type_{id}"),
            CacheKey::BlogUser { blog_id, user_id } => {
                write!(f, "blog_relation_user_{blog_id}_{user_id}")
            }
            CacheKey::Topic(id) => write!(f, "topic_{id}"),
            CacheKey::BlogBatch(ids) => write!(f, "blog_id_{}", join_ids(ids)),
            CacheKey::BlogUserBatch { user_id, blog_ids } => {
                write!(f, "blog_relation_user_{user_id}_id_{}", join_ids(blog_ids))
            }
            CacheKey::BlogUrl(url) => write!(f, "blog_url_{url}"),
            CacheKey::BlogTitle(title) => write!(f, "blog_title_{title}"),
            CacheKey::BlogFilter(digest) => write!(f, "blog_filter_{digest}"),
            CacheKey::BlogUserFilter(digest) => {
                write!(f, "blog_relation_user_by_filter_{digest}")
            }
            CacheKey::BlogTypes => f.write_str("blog_types"),
            CacheKey::AuthorsByBlog(id) => write!(f, "authors_id_by_blog_{id}"),
            CacheKey::RatingJoin { user_id, limit } => {
                write!(f, "blog_rating_join_{user_id}_{limit}")
            }
            CacheKey::AccessibleBlogs(user_id) => write!(f, "blog_accessible_user_{user_id}"),
            CacheKey::InaccessibleBlogs(user_id) => {
                write!(f, "blog_inaccessible_user_{}", user_id.unwrap_or(0))
            }
        }
    }
}

/// Invalidation tags. A tag groups unrelated entries that must be dropped together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    /// A blog was created.
    BlogNew,
    /// Any blog changed.
    BlogUpdate,
    /// One specific blog changed.
    BlogUpdateId(BlogId),
    /// Memberships of a user changed.
    RelationChangeUser(UserId),
    /// Memberships of a blog changed.
    RelationChangeBlog(BlogId),
    TopicNew,
    TopicUpdate,
    TopicUpdateUser(UserId),
    CommentUpdate,
    CommentOnlineUpdateTopic,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::BlogNew => f.write_str("blog_new"),
            Tag::BlogUpdate => f.write_str("blog_update"),
            Tag::BlogUpdateId(id) => write!(f, "blog_update_{id}"),
            Tag::RelationChangeUser(id) => write!(f, "blog_relation_change_{id}"),
            Tag::RelationChangeBlog(id) => write!(f, "blog_relation_change_blog_{id}"),
            Tag::TopicNew => f.write_str("topic_new"),
            Tag::TopicUpdate => f.write_str("topic_update"),
            Tag::TopicUpdateUser(id) => write!(f, "topic_update_user_{id}"),
            Tag::CommentUpdate => f.write_str("comment_update"),
            Tag::CommentOnlineUpdateTopic => f.write_str("comment_online_update_topic"),
        }
    }
}

/// Stable hex digest of a value's JSON form.
///
/// Callers must feed values whose serialization is order-independent
/// (sorted maps), otherwise equal inputs may produce different digests.
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
    let canonical = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

pub(crate) fn sorted_unique(ids: &[EntityId]) -> Vec<EntityId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn join_ids(ids: &[EntityId]) -> String {
    ids.iter()
        .map(EntityId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
