use std::cmp::Ordering;
use std::collections::BTreeSet;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{
    BlogsRepo, BlogsWriteRepo, CreateBlogParams, RecordPage, RepoError, UpdateBlogParams,
};
use crate::cache::{FilterQuery, SortDirection};
use crate::domain::entities::BlogRecord;
use crate::domain::types::{BlogId, CLOSE_BLOG_TYPE, PERSONAL_BLOG_TYPE, TopicId, UserId};

use super::{MemoryBlogStore, State};

const URL_CONSTRAINT: &str = "blogs_url_key";

fn matches_filter(blog: &BlogRecord, filter: &FilterQuery) -> bool {
    let type_in = |key: &str| {
        filter
            .texts(key)
            .map(|codes| codes.contains(&blog.blog_type.as_str()))
    };
    if type_in("type") == Some(false) || type_in("include_type") == Some(false) {
        return false;
    }
    if type_in("exclude_type") == Some(true) {
        return false;
    }
    let id_in = |key: &str, id: u64| {
        filter.ids(key).map(|ids| ids.contains(&id))
    };
    id_in("user_owner_id", blog.owner_id) != Some(false)
        && id_in("blog_id", blog.id) != Some(false)
}

fn compare(left: &BlogRecord, right: &BlogRecord, field: &str) -> Ordering {
    match field {
        "blog_title" => left.title.cmp(&right.title),
        "blog_rating" => left.rating.total_cmp(&right.rating),
        "blog_count_user" => left.count_user.cmp(&right.count_user),
        "blog_date_add" => left.created_at.cmp(&right.created_at),
        _ => left.id.cmp(&right.id),
    }
}

fn ensure_unique_url(
    state: &State,
    url: Option<&str>,
    except: Option<BlogId>,
) -> Result<(), RepoError> {
    let Some(url) = url else {
        return Ok(());
    };
    let taken = state
        .blogs
        .values()
        .any(|blog| blog.url.as_deref() == Some(url) && Some(blog.id) != except);
    if taken {
        return Err(RepoError::Duplicate {
            constraint: URL_CONSTRAINT.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl BlogsRepo for MemoryBlogStore {
    async fn find_by_ids(&self, ids: &[BlogId]) -> Result<Vec<BlogRecord>, RepoError> {
        let state = self.enter("find_by_ids", ids)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.blogs.get(id).cloned())
            .collect())
    }

    async fn find_by_filter(
        &self,
        filter: &FilterQuery,
    ) -> Result<RecordPage<BlogRecord>, RepoError> {
        let state = self.enter("find_by_filter", &[])?;
        let mut blogs: Vec<BlogRecord> = state
            .blogs
            .values()
            .filter(|blog| matches_filter(blog, filter))
            .cloned()
            .collect();

        blogs.sort_by(|left, right| {
            filter
                .order()
                .iter()
                .map(|(field, direction)| match direction {
                    SortDirection::Asc => compare(left, right, field),
                    SortDirection::Desc => compare(right, left, field),
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| left.id.cmp(&right.id))
        });

        let total = blogs.len() as u64;
        let items = match filter.paging() {
            Some(paging) => blogs
                .into_iter()
                .skip(paging.offset())
                .take(paging.per_page as usize)
                .collect(),
            None => blogs,
        };
        Ok(RecordPage::new(items, total))
    }

    async fn find_id_by_url(&self, url: &str) -> Result<Option<BlogId>, RepoError> {
        let state = self.enter("find_id_by_url", &[])?;
        Ok(state
            .blogs
            .values()
            .find(|blog| blog.url.as_deref() == Some(url))
            .map(|blog| blog.id))
    }

    async fn find_id_by_title(&self, title: &str) -> Result<Option<BlogId>, RepoError> {
        let state = self.enter("find_id_by_title", &[])?;
        Ok(state
            .blogs
            .values()
            .find(|blog| blog.title == title)
            .map(|blog| blog.id))
    }

    async fn find_personal_id(&self, owner_id: UserId) -> Result<Option<BlogId>, RepoError> {
        let state = self.enter("find_personal_id", &[owner_id])?;
        Ok(state
            .blogs
            .values()
            .find(|blog| blog.owner_id == owner_id && blog.blog_type == PERSONAL_BLOG_TYPE)
            .map(|blog| blog.id))
    }

    async fn list_ids_by_owner(&self, owner_id: UserId) -> Result<Vec<BlogId>, RepoError> {
        self.list_ids_by_owners(&[owner_id]).await
    }

    async fn list_ids_by_owners(&self, owner_ids: &[UserId]) -> Result<Vec<BlogId>, RepoError> {
        let state = self.enter("list_ids_by_owners", owner_ids)?;
        Ok(state
            .blogs
            .values()
            .filter(|blog| owner_ids.contains(&blog.owner_id))
            .map(|blog| blog.id)
            .collect())
    }

    async fn list_non_personal_ids(&self) -> Result<Vec<BlogId>, RepoError> {
        let state = self.enter("list_non_personal_ids", &[])?;
        Ok(state
            .blogs
            .values()
            .filter(|blog| blog.blog_type != PERSONAL_BLOG_TYPE)
            .map(|blog| blog.id)
            .collect())
    }

    async fn list_close_ids(&self) -> Result<Vec<BlogId>, RepoError> {
        let state = self.enter("list_close_ids", &[])?;
        Ok(state
            .blogs
            .values()
            .filter(|blog| blog.blog_type == CLOSE_BLOG_TYPE)
            .map(|blog| blog.id)
            .collect())
    }

    async fn list_author_ids(&self, blog_id: BlogId) -> Result<Vec<UserId>, RepoError> {
        let state = self.enter("list_author_ids", &[blog_id])?;
        let authors: BTreeSet<UserId> = state
            .topics
            .values()
            .filter(|topic| topic.blog_id == blog_id)
            .map(|topic| topic.author_id)
            .collect();
        Ok(authors.into_iter().collect())
    }

    async fn list_rating_join_ids(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<BlogId>, RepoError> {
        let state = self.enter("list_rating_join_ids", &[user_id])?;
        let mut joined: Vec<&BlogRecord> = state
            .relations
            .values()
            .filter(|relation| relation.user_id == user_id && relation.role.is_member_or_above())
            .filter_map(|relation| state.blogs.get(&relation.blog_id))
            .collect();
        joined.sort_by(|left, right| {
            right
                .rating
                .total_cmp(&left.rating)
                .then(left.id.cmp(&right.id))
        });
        Ok(joined
            .into_iter()
            .take(limit as usize)
            .map(|blog| blog.id)
            .collect())
    }

    async fn list_topic_ids(&self, blog_ids: &[BlogId]) -> Result<Vec<TopicId>, RepoError> {
        let state = self.enter("list_topic_ids", blog_ids)?;
        Ok(state
            .topics
            .iter()
            .filter(|(_, topic)| blog_ids.contains(&topic.blog_id))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn count_by_type(&self, type_code: &str) -> Result<u64, RepoError> {
        let state = self.enter("count_by_type", &[])?;
        Ok(state
            .blogs
            .values()
            .filter(|blog| blog.blog_type == type_code)
            .count() as u64)
    }
}

#[async_trait]
impl BlogsWriteRepo for MemoryBlogStore {
    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError> {
        let mut state = self.enter("create_blog", &[params.owner_id])?;
        ensure_unique_url(&state, params.url.as_deref(), None)?;

        let record = BlogRecord {
            id: state.next_blog_id(),
            owner_id: params.owner_id,
            title: params.title,
            description: params.description,
            blog_type: params.blog_type,
            url: params.url,
            avatar: params.avatar,
            rating: 0.0,
            count_user: 0,
            count_topic: 0,
            limit_rating_topic: params.limit_rating_topic,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        state.blogs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_blog(&self, params: UpdateBlogParams) -> Result<BlogRecord, RepoError> {
        let mut state = self.enter("update_blog", &[params.id])?;
        ensure_unique_url(&state, params.url.as_deref(), Some(params.id))?;

        let blog = state.blogs.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        blog.title = params.title;
        blog.description = params.description;
        blog.blog_type = params.blog_type;
        blog.url = params.url;
        blog.avatar = params.avatar;
        blog.limit_rating_topic = params.limit_rating_topic;
        blog.updated_at = Some(OffsetDateTime::now_utc());
        Ok(blog.clone())
    }

    async fn delete_blogs(&self, ids: &[BlogId]) -> Result<u64, RepoError> {
        let mut state = self.enter("delete_blogs", ids)?;
        let mut deleted = 0;
        for id in ids {
            if state.blogs.remove(id).is_some() {
                deleted += 1;
            }
        }
        state.topics.retain(|_, topic| !ids.contains(&topic.blog_id));
        state.relations.retain(|(blog_id, _), _| !ids.contains(blog_id));
        state.votes.retain(|vote| !ids.contains(&vote.target_id));
        Ok(deleted)
    }

    async fn recalculate_topic_counts(&self, blog_id: Option<BlogId>) -> Result<(), RepoError> {
        let ids: Vec<BlogId> = blog_id.into_iter().collect();
        let mut state = self.enter("recalculate_topic_counts", &ids)?;
        let State { blogs, topics, .. } = &mut *state;
        for blog in blogs.values_mut() {
            if blog_id.is_some_and(|id| id != blog.id) {
                continue;
            }
            let count = topics
                .values()
                .filter(|topic| topic.blog_id == blog.id)
                .count();
            blog.count_topic = u32::try_from(count).unwrap_or(u32::MAX);
        }
        Ok(())
    }
}
