use async_trait::async_trait;

use crate::application::repos::{BlogUsersRepo, BlogUsersWriteRepo, RecordPage, RepoError};
use crate::cache::FilterQuery;
use crate::domain::entities::BlogUserRecord;
use crate::domain::types::{BlogId, UserId};

use super::MemoryBlogStore;

const RELATION_CONSTRAINT: &str = "blog_user_pkey";

fn matches_filter(relation: &BlogUserRecord, filter: &FilterQuery) -> bool {
    let id_in = |key: &str, id: u64| {
        filter.ids(key).is_none_or(|ids| ids.contains(&id))
    };
    if !id_in("blog_id", relation.blog_id) || !id_in("user_id", relation.user_id) {
        return false;
    }
    match filter.ints("user_role") {
        Some(roles) => roles.contains(&i64::from(relation.role.code())),
        None => relation.role.is_member_or_above(),
    }
}

#[async_trait]
impl BlogUsersRepo for MemoryBlogStore {
    async fn find_for_blogs(
        &self,
        blog_ids: &[BlogId],
        user_id: UserId,
    ) -> Result<Vec<BlogUserRecord>, RepoError> {
        let state = self.enter("find_for_blogs", blog_ids)?;
        Ok(blog_ids
            .iter()
            .filter_map(|blog_id| state.relations.get(&(*blog_id, user_id)).cloned())
            .collect())
    }

    async fn list_by_filter(
        &self,
        filter: &FilterQuery,
    ) -> Result<RecordPage<BlogUserRecord>, RepoError> {
        let state = self.enter("list_relations_by_filter", &[])?;
        let relations: Vec<BlogUserRecord> = state
            .relations
            .values()
            .filter(|relation| matches_filter(relation, filter))
            .cloned()
            .collect();

        let total = relations.len() as u64;
        let items = match filter.paging() {
            Some(paging) => relations
                .into_iter()
                .skip(paging.offset())
                .take(paging.per_page as usize)
                .collect(),
            None => relations,
        };
        Ok(RecordPage::new(items, total))
    }
}

#[async_trait]
impl BlogUsersWriteRepo for MemoryBlogStore {
    async fn insert_relation(&self, record: BlogUserRecord) -> Result<(), RepoError> {
        let mut state = self.enter("insert_relation", &[record.blog_id, record.user_id])?;
        if !state.blogs.contains_key(&record.blog_id) {
            return Err(RepoError::Integrity {
                message: format!("blog {} does not exist", record.blog_id),
            });
        }
        let key = (record.blog_id, record.user_id);
        if state.relations.contains_key(&key) {
            return Err(RepoError::Duplicate {
                constraint: RELATION_CONSTRAINT.to_string(),
            });
        }
        state.relations.insert(key, record);
        Ok(())
    }

    async fn update_relation(&self, record: BlogUserRecord) -> Result<(), RepoError> {
        let mut state = self.enter("update_relation", &[record.blog_id, record.user_id])?;
        let stored = state
            .relations
            .get_mut(&(record.blog_id, record.user_id))
            .ok_or(RepoError::NotFound)?;
        *stored = record;
        Ok(())
    }

    async fn delete_relation(&self, blog_id: BlogId, user_id: UserId) -> Result<(), RepoError> {
        let mut state = self.enter("delete_relation", &[blog_id, user_id])?;
        state
            .relations
            .remove(&(blog_id, user_id))
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BlogRole;

    #[tokio::test]
    async fn default_listing_keeps_member_roles_only() {
        let store = MemoryBlogStore::new();
        let blog = store.seed_blog(1, "Club", "close");
        store.seed_relation(blog.id, 2, BlogRole::Member);
        store.seed_relation(blog.id, 3, BlogRole::Invite);
        store.seed_relation(blog.id, 4, BlogRole::Ban);

        let members = store
            .list_by_filter(&FilterQuery::new().with("blog_id", blog.id))
            .await
            .expect("members");
        assert_eq!(members.total, 1);
        assert_eq!(members.items[0].user_id, 2);

        let banned = store
            .list_by_filter(
                &FilterQuery::new()
                    .with("blog_id", blog.id)
                    .with("user_role", i64::from(BlogRole::Ban.code())),
            )
            .await
            .expect("banned");
        assert_eq!(banned.items[0].user_id, 4);
    }
}
