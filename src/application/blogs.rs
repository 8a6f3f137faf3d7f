use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::blog_types::BlogTypeService;
use crate::application::blog_users::BlogUserService;
use crate::application::context::Viewer;
use crate::application::error::AppError;
use crate::application::repos::{
    BlogsRepo, BlogsWriteRepo, CreateBlogParams, RecordPage, UpdateBlogParams, UsersRepo,
    VotesRepo,
};
use crate::application::sources::BlogSource;
use crate::cache::{
    CacheKey, CacheLayer, CachedIds, EntryPolicy, FilterQuery, LoadedBatch, Mutation,
    SortDirection, Tag, expiry,
};
use crate::config::BlogSettings;
use crate::domain::entities::{BlogRecord, BlogUserRecord, UserRecord, VoteRecord};
use crate::domain::types::{
    BLOG_VOTE_TARGET, BlogId, BlogTypeAction, CLOSE_BLOG_TYPE, IdInput, PERSONAL_BLOG_TYPE,
    UserId,
};

const SOURCE: &str = "application::blogs";
/// Owned closed blogs considered when computing inaccessible blogs.
const OWNED_CLOSE_BLOGS_LIMIT: u32 = 100;

/// Related data attached to loaded blogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdditionalData {
    pub owner: bool,
    /// The viewer's membership in each blog.
    pub relation_user: bool,
    /// The viewer's vote for each blog.
    pub vote: bool,
}

impl AdditionalData {
    pub fn all() -> Self {
        Self {
            owner: true,
            relation_user: true,
            vote: true,
        }
    }

    /// Owner and membership, the set list pages show.
    pub fn for_lists() -> Self {
        Self {
            owner: true,
            relation_user: true,
            vote: false,
        }
    }

    pub fn none() -> Self {
        Self {
            owner: false,
            relation_user: false,
            vote: false,
        }
    }
}

impl Default for AdditionalData {
    fn default() -> Self {
        Self::all()
    }
}

/// A blog with the related data requested for the current viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogView {
    pub blog: BlogRecord,
    pub owner: Option<UserRecord>,
    pub membership: Option<BlogUserRecord>,
    pub vote: Option<VoteRecord>,
}

impl BlogView {
    pub fn user_is_join(&self) -> bool {
        self.membership.is_some()
    }

    pub fn user_is_administrator(&self) -> bool {
        self.membership
            .as_ref()
            .is_some_and(BlogUserRecord::is_administrator)
    }

    pub fn user_is_moderator(&self) -> bool {
        self.membership
            .as_ref()
            .is_some_and(BlogUserRecord::is_moderator)
    }
}

pub type BlogPage = RecordPage<BlogView>;

#[derive(Clone)]
pub struct BlogService {
    reader: Arc<dyn BlogsRepo>,
    writer: Arc<dyn BlogsWriteRepo>,
    users: Arc<dyn UsersRepo>,
    votes: Arc<dyn VotesRepo>,
    blog_users: Arc<BlogUserService>,
    blog_types: Arc<BlogTypeService>,
    cache: Arc<CacheLayer>,
    settings: BlogSettings,
}

impl BlogService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Arc<dyn BlogsRepo>,
        writer: Arc<dyn BlogsWriteRepo>,
        users: Arc<dyn UsersRepo>,
        votes: Arc<dyn VotesRepo>,
        blog_users: Arc<BlogUserService>,
        blog_types: Arc<BlogTypeService>,
        cache: Arc<CacheLayer>,
        settings: BlogSettings,
    ) -> Self {
        Self {
            reader,
            writer,
            users,
            votes,
            blog_users,
            blog_types,
            cache,
            settings,
        }
    }

    pub fn blog_users(&self) -> &BlogUserService {
        &self.blog_users
    }

    pub fn blog_types(&self) -> &BlogTypeService {
        &self.blog_types
    }

    /// Blogs for `ids` in request order, without related data.
    pub async fn get_blogs_by_ids<I>(&self, ids: &[I]) -> Result<LoadedBatch<BlogRecord>, AppError>
    where
        I: IdInput + Sync,
    {
        Ok(self.cache.loader().load_by_ids(&self.source(), ids).await?)
    }

    /// Existing blogs for `ids` in request order, each with the requested related data.
    ///
    /// Viewer-specific data is only attached when a viewer is given.
    pub async fn get_blogs_additional_data<I>(
        &self,
        ids: &[I],
        data: AdditionalData,
        viewer: Option<&Viewer>,
    ) -> Result<Vec<BlogView>, AppError>
    where
        I: IdInput + Sync,
    {
        let blogs = self.get_blogs_by_ids(ids).await?.into_found();
        if blogs.is_empty() {
            return Ok(Vec::new());
        }
        let blog_ids: Vec<BlogId> = blogs.iter().map(|blog| blog.id).collect();

        let (owners, mut memberships, mut votes) = futures::try_join!(
            self.owners_of(&blogs, data),
            self.memberships_of(&blog_ids, data, viewer),
            self.votes_of(&blog_ids, data, viewer)
        )?;

        Ok(blogs
            .into_iter()
            .map(|blog| BlogView {
                owner: owners.get(&blog.owner_id).cloned(),
                membership: memberships.remove(&blog.id),
                vote: votes.remove(&blog.id),
                blog,
            })
            .collect())
    }

    pub async fn get_blog_by_id<I>(
        &self,
        id: I,
        viewer: Option<&Viewer>,
    ) -> Result<Option<BlogView>, AppError>
    where
        I: IdInput + Sync,
    {
        let views = self
            .get_blogs_additional_data(&[id], AdditionalData::all(), viewer)
            .await?;
        Ok(views.into_iter().next())
    }

    pub async fn get_blog_by_url(
        &self,
        url: &str,
        viewer: Option<&Viewer>,
    ) -> Result<Option<BlogView>, AppError> {
        let ttl = &self.cache.config().ttl;
        let reader = Arc::clone(&self.reader);
        let lookup = url.to_string();
        let id = self
            .cache
            .queries()
            .cached_optional(
                CacheKey::BlogUrl(url.to_string()),
                |id: &BlogId| {
                    EntryPolicy::new(vec![Tag::BlogUpdateId(*id)], expiry(ttl.lookup))
                },
                self.lookup_miss_policy(),
                || async move { reader.find_id_by_url(&lookup).await },
            )
            .await?;
        self.resolve(id, viewer).await
    }

    pub async fn get_blog_by_title(
        &self,
        title: &str,
        viewer: Option<&Viewer>,
    ) -> Result<Option<BlogView>, AppError> {
        let ttl = &self.cache.config().ttl;
        let reader = Arc::clone(&self.reader);
        let lookup = title.to_string();
        let id = self
            .cache
            .queries()
            .cached_optional(
                CacheKey::BlogTitle(title.to_string()),
                |id: &BlogId| {
                    EntryPolicy::new(
                        vec![Tag::BlogUpdateId(*id), Tag::BlogNew],
                        expiry(ttl.lookup),
                    )
                },
                self.lookup_miss_policy(),
                || async move { reader.find_id_by_title(&lookup).await },
            )
            .await?;
        self.resolve(id, viewer).await
    }

    pub async fn get_personal_blog_by_user(
        &self,
        user_id: UserId,
        viewer: Option<&Viewer>,
    ) -> Result<Option<BlogView>, AppError> {
        let id = self.reader.find_personal_id(user_id).await?;
        self.resolve(id, viewer).await
    }

    /// One page of blogs matching `filter`, in the order the store returned them.
    pub async fn get_blogs_by_filter(
        &self,
        filter: &FilterQuery,
        data: AdditionalData,
        viewer: Option<&Viewer>,
    ) -> Result<BlogPage, AppError> {
        let found = self.filtered_ids(filter).await?;
        let items = self
            .get_blogs_additional_data(&found.ids, data, viewer)
            .await?;
        Ok(RecordPage::new(items, found.total))
    }

    /// Blogs of the types the viewer may list, best rated first.
    pub async fn get_blogs_rating(
        &self,
        page: u32,
        per_page: u32,
        viewer: Option<&Viewer>,
    ) -> Result<BlogPage, AppError> {
        let types = self
            .blog_types
            .get_allowed_blog_type_codes(viewer, BlogTypeAction::List)
            .await?;
        if types.is_empty() {
            return Ok(RecordPage::empty());
        }
        let filter = FilterQuery::new()
            .with("include_type", types)
            .order_by("blog_rating", SortDirection::Desc)
            .paged(page, per_page);
        self.get_blogs_by_filter(&filter, AdditionalData::for_lists(), viewer)
            .await
    }

    /// The user's own non-personal blogs, best rated first.
    pub async fn get_blogs_rating_self(
        &self,
        user_id: UserId,
        limit: u32,
        viewer: Option<&Viewer>,
    ) -> Result<Vec<BlogView>, AppError> {
        let filter = FilterQuery::new()
            .with("exclude_type", PERSONAL_BLOG_TYPE)
            .with("user_owner_id", user_id)
            .order_by("blog_rating", SortDirection::Desc)
            .paged(1, limit);
        Ok(self
            .get_blogs_by_filter(&filter, AdditionalData::for_lists(), viewer)
            .await?
            .items)
    }

    /// Blogs the user joined, best rated first.
    pub async fn get_blogs_rating_join(
        &self,
        user_id: UserId,
        limit: u32,
        viewer: Option<&Viewer>,
    ) -> Result<Vec<BlogView>, AppError> {
        let reader = Arc::clone(&self.reader);
        let ids: Vec<BlogId> = self
            .cache
            .queries()
            .cached(
                CacheKey::RatingJoin { user_id, limit },
                EntryPolicy::new(
                    vec![Tag::BlogUpdate, Tag::RelationChangeUser(user_id)],
                    expiry(self.cache.config().ttl.rating_join),
                ),
                || async move { reader.list_rating_join_ids(user_id, limit).await },
            )
            .await?;
        self.get_blogs_additional_data(&ids, AdditionalData::for_lists(), viewer)
            .await
    }

    pub async fn get_blogs_by_owner(
        &self,
        user_id: UserId,
        viewer: Option<&Viewer>,
    ) -> Result<Vec<BlogView>, AppError> {
        let ids = self.get_blog_ids_by_owner(user_id).await?;
        self.get_blogs_additional_data(&ids, AdditionalData::all(), viewer)
            .await
    }

    pub async fn get_blog_ids_by_owner(&self, user_id: UserId) -> Result<Vec<BlogId>, AppError> {
        Ok(self.reader.list_ids_by_owner(user_id).await?)
    }

    /// Every blog that is not a personal blog.
    pub async fn get_blogs(&self, viewer: Option<&Viewer>) -> Result<Vec<BlogView>, AppError> {
        let ids = self.get_blog_ids().await?;
        self.get_blogs_additional_data(&ids, AdditionalData::all(), viewer)
            .await
    }

    /// Records of every blog except personal ones, ordered by id.
    pub async fn get_blogs_data(&self) -> Result<Vec<BlogRecord>, AppError> {
        self.get_blogs_data_excluding(&[PERSONAL_BLOG_TYPE]).await
    }

    /// Records of every blog whose type is not in `exclude_types`, ordered by id.
    pub async fn get_blogs_data_excluding(
        &self,
        exclude_types: &[&str],
    ) -> Result<Vec<BlogRecord>, AppError> {
        let mut excluded = exclude_types.to_vec();
        excluded.sort_unstable();
        excluded.dedup();

        let mut filter = FilterQuery::new().order_by("blog_id", SortDirection::Asc);
        if !excluded.is_empty() {
            filter = filter.with("exclude_type", excluded);
        }
        let found = self.filtered_ids(&filter).await?;
        Ok(self.get_blogs_by_ids(&found.ids).await?.into_found())
    }

    /// Same as [`BlogService::get_blogs_by_ids`].
    pub async fn get_blog_items_by_ids<I>(
        &self,
        ids: &[I],
    ) -> Result<LoadedBatch<BlogRecord>, AppError>
    where
        I: IdInput + Sync,
    {
        self.get_blogs_by_ids(ids).await
    }

    pub async fn get_blog_ids(&self) -> Result<Vec<BlogId>, AppError> {
        Ok(self.reader.list_non_personal_ids().await?)
    }

    /// Users who authored topics in the blog.
    pub async fn get_authors_by_blog(&self, blog_id: BlogId) -> Result<Vec<UserId>, AppError> {
        let reader = Arc::clone(&self.reader);
        let authors = self
            .cache
            .queries()
            .cached(
                CacheKey::AuthorsByBlog(blog_id),
                EntryPolicy::new(
                    vec![Tag::BlogUpdate, Tag::BlogNew, Tag::TopicNew, Tag::TopicUpdate],
                    expiry(self.cache.config().ttl.authors),
                ),
                || async move { reader.list_author_ids(blog_id).await },
            )
            .await?;
        Ok(authors)
    }

    /// Ids of the blogs the viewer can read besides public ones.
    ///
    /// Administrators get every non-personal blog; other users get the blogs
    /// they own together with the blogs they are members of.
    pub async fn get_accessible_blogs(&self, viewer: &Viewer) -> Result<Vec<BlogId>, AppError> {
        if viewer.is_administrator {
            return self.get_blog_ids().await;
        }
        let user_id = viewer.user_id;
        self.cache
            .queries()
            .cached(
                CacheKey::AccessibleBlogs(user_id),
                EntryPolicy::new(
                    vec![Tag::BlogNew, Tag::BlogUpdate, Tag::RelationChangeUser(user_id)],
                    expiry(self.cache.config().ttl.accessible),
                ),
                || async move {
                    let mut ids = self.get_blog_ids_by_owner(user_id).await?;
                    ids.extend(self.blog_users.get_blog_ids_by_user(user_id, None).await?);
                    Ok::<_, AppError>(unique_in_order(ids))
                },
            )
            .await
    }

    /// Ids of closed blogs the viewer cannot read.
    ///
    /// Administrators can read everything. Members and owners of a closed
    /// blog can read it.
    pub async fn get_inaccessible_blogs(
        &self,
        viewer: Option<&Viewer>,
    ) -> Result<Vec<BlogId>, AppError> {
        let ttl = &self.cache.config().ttl;
        match viewer {
            Some(viewer) if viewer.is_administrator => Ok(Vec::new()),
            Some(viewer) => {
                let user_id = viewer.user_id;
                self.cache
                    .queries()
                    .cached(
                        CacheKey::InaccessibleBlogs(Some(user_id)),
                        EntryPolicy::new(
                            vec![Tag::BlogNew, Tag::BlogUpdate, Tag::RelationChangeUser(user_id)],
                            expiry(ttl.inaccessible_user),
                        ),
                        || async move {
                            let closed = self.reader.list_close_ids().await?;
                            let member = self.blog_users.get_blog_ids_by_user(user_id, None).await?;
                            let owned = self
                                .filtered_ids(
                                    &FilterQuery::new()
                                        .with("type", CLOSE_BLOG_TYPE)
                                        .with("user_owner_id", user_id)
                                        .paged(1, OWNED_CLOSE_BLOGS_LIMIT),
                                )
                                .await?;

                            let readable: HashSet<BlogId> =
                                member.into_iter().chain(owned.ids).collect();
                            Ok::<_, AppError>(
                                closed
                                    .into_iter()
                                    .filter(|id| !readable.contains(id))
                                    .collect::<Vec<_>>(),
                            )
                        },
                    )
                    .await
            }
            None => {
                let reader = Arc::clone(&self.reader);
                let closed = self
                    .cache
                    .queries()
                    .cached(
                        CacheKey::InaccessibleBlogs(None),
                        EntryPolicy::new(
                            vec![Tag::BlogNew, Tag::BlogUpdate],
                            expiry(ttl.inaccessible_guest),
                        ),
                        || async move { reader.list_close_ids().await },
                    )
                    .await?;
                Ok(closed)
            }
        }
    }

    pub async fn add_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, AppError> {
        if params.title.trim().is_empty() {
            return Err(AppError::validation("blog title must not be empty"));
        }
        let blog = self.writer.create_blog(params).await?;
        info!(
            source = SOURCE,
            blog_id = blog.id,
            owner_id = blog.owner_id,
            blog_type = %blog.blog_type,
            "Blog created"
        );
        self.cache.invalidator().apply(Mutation::BlogCreated).await;
        Ok(blog)
    }

    /// Create the user's personal blog when the personal type is enabled.
    ///
    /// Returns `None` without writing anything when it is not.
    pub async fn create_personal_blog(
        &self,
        owner: &UserRecord,
    ) -> Result<Option<BlogRecord>, AppError> {
        if !self.blog_types.blog_type_enabled(PERSONAL_BLOG_TYPE).await? {
            debug!(
                source = SOURCE,
                user_id = owner.id,
                "Personal blog type disabled, skipping personal blog"
            );
            return Ok(None);
        }
        let params = CreateBlogParams {
            owner_id: owner.id,
            title: format!("{} {}", self.settings.personal_title_prefix, owner.login),
            description: self.settings.personal_description.clone(),
            blog_type: PERSONAL_BLOG_TYPE.to_string(),
            url: None,
            avatar: None,
            limit_rating_topic: self.settings.personal_limit_rating_topic,
        };
        self.add_blog(params).await.map(Some)
    }

    /// Persist changes to a blog.
    ///
    /// When the type changed, cached topic lists of the blog's authors are
    /// dropped as well since topic visibility follows the blog type. The
    /// authors are resolved before the write: once it commits, the update must
    /// always be followed by invalidation.
    pub async fn update_blog(
        &self,
        params: UpdateBlogParams,
        previous_type: Option<&str>,
    ) -> Result<BlogRecord, AppError> {
        let retyped_authors = match previous_type {
            Some(previous) if previous != params.blog_type => {
                self.get_authors_by_blog(params.id).await?
            }
            _ => Vec::new(),
        };
        let blog = self.writer.update_blog(params).await?;
        info!(
            source = SOURCE,
            blog_id = blog.id,
            retyped_authors = retyped_authors.len(),
            "Blog updated"
        );
        self.cache
            .invalidator()
            .apply(Mutation::BlogUpdated {
                blog_id: blog.id,
                retyped_authors,
            })
            .await;
        Ok(blog)
    }

    /// Delete blogs together with their topics, memberships and votes.
    pub async fn delete_blogs(&self, ids: &[BlogId]) -> Result<u64, AppError> {
        let blog_ids = unique_in_order(ids.to_vec());
        if blog_ids.is_empty() {
            return Ok(0);
        }
        let topic_ids = self.reader.list_topic_ids(&blog_ids).await?;
        let deleted = self.writer.delete_blogs(&blog_ids).await?;
        info!(
            source = SOURCE,
            blogs = blog_ids.len(),
            topics = topic_ids.len(),
            deleted,
            "Blogs deleted"
        );
        self.cache
            .invalidator()
            .apply(Mutation::BlogsDeleted {
                blog_ids,
                topic_ids,
            })
            .await;
        Ok(deleted)
    }

    pub async fn delete_blogs_by_owners(&self, owner_ids: &[UserId]) -> Result<u64, AppError> {
        if owner_ids.is_empty() {
            return Ok(0);
        }
        let ids = self.reader.list_ids_by_owners(owner_ids).await?;
        self.delete_blogs(&ids).await
    }

    pub async fn recalculate_topic_counts(&self) -> Result<(), AppError> {
        self.writer.recalculate_topic_counts(None).await?;
        self.cache
            .invalidator()
            .apply(Mutation::TopicCountsRecalculated { blog_id: None })
            .await;
        Ok(())
    }

    pub async fn recalculate_topic_counts_for(&self, blog_id: BlogId) -> Result<(), AppError> {
        self.writer.recalculate_topic_counts(Some(blog_id)).await?;
        self.cache
            .invalidator()
            .apply(Mutation::TopicCountsRecalculated {
                blog_id: Some(blog_id),
            })
            .await;
        Ok(())
    }

    fn source(&self) -> BlogSource<'_> {
        BlogSource::new(self.reader.as_ref(), &self.cache.config().ttl)
    }

    fn lookup_miss_policy(&self) -> EntryPolicy {
        EntryPolicy::new(
            vec![Tag::BlogUpdate, Tag::BlogNew],
            expiry(self.cache.config().ttl.lookup_negative),
        )
    }

    async fn resolve(
        &self,
        id: Option<BlogId>,
        viewer: Option<&Viewer>,
    ) -> Result<Option<BlogView>, AppError> {
        match id {
            Some(id) => self.get_blog_by_id(id, viewer).await,
            None => Ok(None),
        }
    }

    /// Ids and total of a filter query; the loaded records also warm the per-id entries.
    async fn filtered_ids(&self, filter: &FilterQuery) -> Result<CachedIds, AppError> {
        let found = self
            .cache
            .queries()
            .query(
                CacheKey::BlogFilter,
                filter,
                EntryPolicy::new(
                    vec![Tag::BlogUpdate, Tag::BlogNew],
                    expiry(self.cache.config().ttl.blog_filter),
                ),
                || async move {
                    let page = self.reader.find_by_filter(filter).await?;
                    self.cache.loader().prime(&self.source(), &page.items).await;
                    Ok::<_, AppError>(CachedIds {
                        ids: page.items.iter().map(|blog| blog.id).collect(),
                        total: page.total,
                    })
                },
            )
            .await?;
        Ok(found)
    }

    async fn owners_of(
        &self,
        blogs: &[BlogRecord],
        data: AdditionalData,
    ) -> Result<HashMap<UserId, UserRecord>, AppError> {
        if !data.owner {
            return Ok(HashMap::new());
        }
        let owner_ids = unique_in_order(blogs.iter().map(|blog| blog.owner_id).collect());
        let users = self.users.find_users(&owner_ids).await?;
        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }

    async fn memberships_of(
        &self,
        blog_ids: &[BlogId],
        data: AdditionalData,
        viewer: Option<&Viewer>,
    ) -> Result<HashMap<BlogId, BlogUserRecord>, AppError> {
        let Some(viewer) = viewer.filter(|_| data.relation_user) else {
            return Ok(HashMap::new());
        };
        let relations = self
            .blog_users
            .get_blog_users_by_blogs(blog_ids, viewer.user_id)
            .await?;
        Ok(relations
            .into_found()
            .into_iter()
            .map(|relation| (relation.blog_id, relation))
            .collect())
    }

    async fn votes_of(
        &self,
        blog_ids: &[BlogId],
        data: AdditionalData,
        viewer: Option<&Viewer>,
    ) -> Result<HashMap<BlogId, VoteRecord>, AppError> {
        let Some(viewer) = viewer.filter(|_| data.vote) else {
            return Ok(HashMap::new());
        };
        let votes = self
            .votes
            .find_votes(BLOG_VOTE_TARGET, blog_ids, viewer.user_id)
            .await?;
        Ok(votes
            .into_iter()
            .map(|vote| (vote.target_id, vote))
            .collect())
    }
}

fn unique_in_order(ids: Vec<BlogId>) -> Vec<BlogId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
