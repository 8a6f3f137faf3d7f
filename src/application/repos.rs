//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::FilterQuery;
use crate::domain::entities::{BlogRecord, BlogTypeRecord, BlogUserRecord, UserRecord, VoteRecord};
use crate::domain::types::{BlogId, BlogTypeId, TopicId, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("store timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// One page of records together with the size of the whole result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> RecordPage<T> {
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateBlogParams {
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub blog_type: String,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub limit_rating_topic: f64,
}

#[derive(Debug, Clone)]
pub struct UpdateBlogParams {
    pub id: BlogId,
    pub title: String,
    pub description: String,
    pub blog_type: String,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub limit_rating_topic: f64,
}

#[derive(Debug, Clone)]
pub struct CreateBlogTypeParams {
    pub type_code: String,
    pub name: String,
    pub active: bool,
    pub allow_add: bool,
    pub show_title: bool,
    pub min_rate_add: f64,
    pub min_rate_list: f64,
}

/// Read access to blogs.
///
/// Filter queries understand the criteria `type`, `include_type`,
/// `exclude_type` (type codes), `user_owner_id` and `blog_id`, and the order
/// fields `blog_id`, `blog_title`, `blog_rating`, `blog_count_user` and
/// `blog_date_add`.
#[async_trait]
pub trait BlogsRepo: Send + Sync {
    async fn find_by_ids(&self, ids: &[BlogId]) -> Result<Vec<BlogRecord>, RepoError>;

    async fn find_by_filter(&self, filter: &FilterQuery)
    -> Result<RecordPage<BlogRecord>, RepoError>;

    async fn find_id_by_url(&self, url: &str) -> Result<Option<BlogId>, RepoError>;

    async fn find_id_by_title(&self, title: &str) -> Result<Option<BlogId>, RepoError>;

    async fn find_personal_id(&self, owner_id: UserId) -> Result<Option<BlogId>, RepoError>;

    async fn list_ids_by_owner(&self, owner_id: UserId) -> Result<Vec<BlogId>, RepoError>;

    async fn list_ids_by_owners(&self, owner_ids: &[UserId]) -> Result<Vec<BlogId>, RepoError>;

    /// Ids of every blog that is not a personal blog.
    async fn list_non_personal_ids(&self) -> Result<Vec<BlogId>, RepoError>;

    async fn list_close_ids(&self) -> Result<Vec<BlogId>, RepoError>;

    /// Users who authored topics in the blog.
    async fn list_author_ids(&self, blog_id: BlogId) -> Result<Vec<UserId>, RepoError>;

    /// Blogs the user joined, best rated first.
    async fn list_rating_join_ids(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<BlogId>, RepoError>;

    async fn list_topic_ids(&self, blog_ids: &[BlogId]) -> Result<Vec<TopicId>, RepoError>;

    async fn count_by_type(&self, type_code: &str) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait BlogsWriteRepo: Send + Sync {
    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError>;

    async fn update_blog(&self, params: UpdateBlogParams) -> Result<BlogRecord, RepoError>;

    /// Remove blogs together with their topics, memberships and votes.
    async fn delete_blogs(&self, ids: &[BlogId]) -> Result<u64, RepoError>;

    /// Recount topics of one blog, or of every blog when `blog_id` is `None`.
    async fn recalculate_topic_counts(&self, blog_id: Option<BlogId>) -> Result<(), RepoError>;
}

#[async_trait]
pub trait BlogTypesRepo: Send + Sync {
    async fn list_blog_types(&self) -> Result<Vec<BlogTypeRecord>, RepoError>;

    async fn find_blog_type(&self, id: BlogTypeId) -> Result<Option<BlogTypeRecord>, RepoError>;
}

#[async_trait]
pub trait BlogTypesWriteRepo: Send + Sync {
    async fn create_blog_type(
        &self,
        params: CreateBlogTypeParams,
    ) -> Result<BlogTypeRecord, RepoError>;

    async fn update_blog_type(&self, record: BlogTypeRecord) -> Result<BlogTypeRecord, RepoError>;

    async fn delete_blog_type(&self, id: BlogTypeId) -> Result<(), RepoError>;
}

/// Read access to blog memberships.
///
/// Filter queries understand `blog_id`, `user_id` and `user_role` (role code);
/// without `user_role` only member-or-above roles are returned.
#[async_trait]
pub trait BlogUsersRepo: Send + Sync {
    async fn find_for_blogs(
        &self,
        blog_ids: &[BlogId],
        user_id: UserId,
    ) -> Result<Vec<BlogUserRecord>, RepoError>;

    async fn list_by_filter(
        &self,
        filter: &FilterQuery,
    ) -> Result<RecordPage<BlogUserRecord>, RepoError>;
}

#[async_trait]
pub trait BlogUsersWriteRepo: Send + Sync {
    async fn insert_relation(&self, record: BlogUserRecord) -> Result<(), RepoError>;

    async fn update_relation(&self, record: BlogUserRecord) -> Result<(), RepoError>;

    async fn delete_relation(&self, blog_id: BlogId, user_id: UserId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<UserRecord>, RepoError>;
}

#[async_trait]
pub trait VotesRepo: Send + Sync {
    async fn find_votes(
        &self,
        target: &str,
        target_ids: &[u64],
        voter_id: UserId,
    ) -> Result<Vec<VoteRecord>, RepoError>;
}
