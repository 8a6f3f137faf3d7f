use async_trait::async_trait;

use crate::application::repos::{
    BlogTypesRepo, BlogTypesWriteRepo, CreateBlogTypeParams, RepoError,
};
use crate::domain::entities::BlogTypeRecord;
use crate::domain::types::BlogTypeId;

use super::MemoryBlogStore;

const TYPE_CODE_CONSTRAINT: &str = "blog_types_type_code_key";

#[async_trait]
impl BlogTypesRepo for MemoryBlogStore {
    async fn list_blog_types(&self) -> Result<Vec<BlogTypeRecord>, RepoError> {
        let state = self.enter("list_blog_types", &[])?;
        Ok(state.blog_types.values().cloned().collect())
    }

    async fn find_blog_type(&self, id: BlogTypeId) -> Result<Option<BlogTypeRecord>, RepoError> {
        let state = self.enter("find_blog_type", &[id])?;
        Ok(state.blog_types.get(&id).cloned())
    }
}

#[async_trait]
impl BlogTypesWriteRepo for MemoryBlogStore {
    async fn create_blog_type(
        &self,
        params: CreateBlogTypeParams,
    ) -> Result<BlogTypeRecord, RepoError> {
        let mut state = self.enter("create_blog_type", &[])?;
        if state
            .blog_types
            .values()
            .any(|record| record.type_code == params.type_code)
        {
            return Err(RepoError::Duplicate {
                constraint: TYPE_CODE_CONSTRAINT.to_string(),
            });
        }
        let record = BlogTypeRecord {
            id: state.next_type_id(),
            type_code: params.type_code,
            name: params.name,
            active: params.active,
            allow_add: params.allow_add,
            show_title: params.show_title,
            min_rate_add: params.min_rate_add,
            min_rate_list: params.min_rate_list,
        };
        state.blog_types.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_blog_type(&self, record: BlogTypeRecord) -> Result<BlogTypeRecord, RepoError> {
        let mut state = self.enter("update_blog_type", &[record.id])?;
        let stored = state
            .blog_types
            .get_mut(&record.id)
            .ok_or(RepoError::NotFound)?;
        *stored = record.clone();
        Ok(record)
    }

    async fn delete_blog_type(&self, id: BlogTypeId) -> Result<(), RepoError> {
        let mut state = self.enter("delete_blog_type", &[id])?;
        state
            .blog_types
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}
