use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::application::error::AppError;
use crate::application::repos::{
    BlogUsersRepo, BlogUsersWriteRepo, BlogsRepo, RecordPage, UsersRepo,
};
use crate::application::sources::{BlogSource, BlogUserSource};
use crate::cache::{CacheKey, CacheLayer, EntryPolicy, FilterQuery, LoadedBatch, Mutation, Tag, expiry};
use crate::domain::entities::{BlogRecord, BlogUserRecord, UserRecord};
use crate::domain::types::{BlogId, BlogRole, IdInput, UserId};

const SOURCE: &str = "application::blog_users";
const DEFAULT_MEMBERS_PER_PAGE: u32 = 100;

/// A membership together with the user and blog it links.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogMember {
    pub relation: BlogUserRecord,
    pub user: Option<UserRecord>,
    pub blog: Option<BlogRecord>,
}

#[derive(Clone)]
pub struct BlogUserService {
    reader: Arc<dyn BlogUsersRepo>,
    writer: Arc<dyn BlogUsersWriteRepo>,
    blogs: Arc<dyn BlogsRepo>,
    users: Arc<dyn UsersRepo>,
    cache: Arc<CacheLayer>,
}

impl BlogUserService {
    pub fn new(
        reader: Arc<dyn BlogUsersRepo>,
        writer: Arc<dyn BlogUsersWriteRepo>,
        blogs: Arc<dyn BlogsRepo>,
        users: Arc<dyn UsersRepo>,
        cache: Arc<CacheLayer>,
    ) -> Self {
        Self {
            reader,
            writer,
            blogs,
            users,
            cache,
        }
    }

    /// Memberships of `user_id` in each of `blog_ids`, in request order.
    pub async fn get_blog_users_by_blogs<I>(
        &self,
        blog_ids: &[I],
        user_id: UserId,
    ) -> Result<LoadedBatch<BlogUserRecord>, AppError>
    where
        I: IdInput + Sync,
    {
        let source = BlogUserSource::new(self.reader.as_ref(), &self.cache.config().ttl, user_id);
        Ok(self.cache.loader().load_by_ids(&source, blog_ids).await?)
    }

    pub async fn get_blog_user(
        &self,
        blog_id: BlogId,
        user_id: UserId,
    ) -> Result<Option<BlogUserRecord>, AppError> {
        let batch = self.get_blog_users_by_blogs(&[blog_id], user_id).await?;
        Ok(batch.into_found().into_iter().next())
    }

    /// One page of a blog's members; without `role` only member-or-above roles are listed.
    pub async fn get_blog_users_by_blog(
        &self,
        blog_id: BlogId,
        role: Option<BlogRole>,
        page: u32,
        per_page: u32,
    ) -> Result<RecordPage<BlogMember>, AppError> {
        let per_page = if per_page == 0 {
            DEFAULT_MEMBERS_PER_PAGE
        } else {
            per_page
        };
        let mut filter = FilterQuery::new().with("blog_id", blog_id);
        if let Some(role) = role {
            filter = filter.with("user_role", i64::from(role.code()));
        }
        let filter = filter.paged(page, per_page);

        let policy = EntryPolicy::new(
            vec![Tag::RelationChangeBlog(blog_id)],
            expiry(self.cache.config().ttl.relation_filter),
        );
        let reader = Arc::clone(&self.reader);
        let query = filter.clone();
        let relations: RecordPage<BlogUserRecord> = self
            .cache
            .queries()
            .query(CacheKey::BlogUserFilter, &filter, policy, || async move {
                reader.list_by_filter(&query).await
            })
            .await?;

        let total = relations.total;
        let members = self.attach(relations.items).await?;
        Ok(RecordPage::new(members, total))
    }

    /// Memberships of one user across blogs, enriched with the blogs.
    pub async fn get_blog_users_by_user(
        &self,
        user_id: UserId,
        role: Option<BlogRole>,
    ) -> Result<Vec<BlogMember>, AppError> {
        let relations = self.relations_of_user(user_id, role).await?;
        self.attach(relations).await
    }

    pub async fn get_blog_ids_by_user(
        &self,
        user_id: UserId,
        role: Option<BlogRole>,
    ) -> Result<Vec<BlogId>, AppError> {
        Ok(self
            .relations_of_user(user_id, role)
            .await?
            .into_iter()
            .map(|relation| relation.blog_id)
            .collect())
    }

    pub async fn add_relation(&self, relation: BlogUserRecord) -> Result<(), AppError> {
        let (blog_id, user_id) = (relation.blog_id, relation.user_id);
        self.writer.insert_relation(relation).await?;
        info!(source = SOURCE, blog_id, user_id, "Blog membership added");
        self.relation_changed(blog_id, user_id).await;
        Ok(())
    }

    pub async fn update_relation(&self, relation: BlogUserRecord) -> Result<(), AppError> {
        let (blog_id, user_id) = (relation.blog_id, relation.user_id);
        self.writer.update_relation(relation).await?;
        self.relation_changed(blog_id, user_id).await;
        Ok(())
    }

    pub async fn delete_relation(&self, blog_id: BlogId, user_id: UserId) -> Result<(), AppError> {
        self.writer.delete_relation(blog_id, user_id).await?;
        info!(source = SOURCE, blog_id, user_id, "Blog membership removed");
        self.relation_changed(blog_id, user_id).await;
        Ok(())
    }

    async fn relations_of_user(
        &self,
        user_id: UserId,
        role: Option<BlogRole>,
    ) -> Result<Vec<BlogUserRecord>, AppError> {
        let mut filter = FilterQuery::new().with("user_id", user_id);
        if let Some(role) = role {
            filter = filter.with("user_role", i64::from(role.code()));
        }

        let policy = EntryPolicy::new(
            vec![Tag::BlogUpdate, Tag::RelationChangeUser(user_id)],
            expiry(self.cache.config().ttl.relation_filter),
        );
        let reader = Arc::clone(&self.reader);
        let query = filter.clone();
        let relations: Vec<BlogUserRecord> = self
            .cache
            .queries()
            .query(CacheKey::BlogUserFilter, &filter, policy, || async move {
                reader.list_by_filter(&query).await.map(|page| page.items)
            })
            .await?;
        Ok(relations)
    }

    async fn attach(&self, relations: Vec<BlogUserRecord>) -> Result<Vec<BlogMember>, AppError> {
        if relations.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids: Vec<UserId> = relations.iter().map(|relation| relation.user_id).collect();
        let blog_ids: Vec<BlogId> = relations.iter().map(|relation| relation.blog_id).collect();

        let source = BlogSource::new(self.blogs.as_ref(), &self.cache.config().ttl);
        let (users, blogs) = futures::try_join!(
            self.users.find_users(&user_ids),
            self.cache.loader().load_by_ids(&source, &blog_ids)
        )?;

        let users: HashMap<UserId, UserRecord> =
            users.into_iter().map(|user| (user.id, user)).collect();
        Ok(relations
            .into_iter()
            .map(|relation| BlogMember {
                user: users.get(&relation.user_id).cloned(),
                blog: blogs.get(relation.blog_id).cloned(),
                relation,
            })
            .collect())
    }

    async fn relation_changed(&self, blog_id: BlogId, user_id: UserId) {
        self.cache
            .invalidator()
            .apply(Mutation::RelationChanged { blog_id, user_id })
            .await;
    }
}
