use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::application::context::Viewer;
use crate::application::error::AppError;
use crate::application::repos::{BlogTypesRepo, BlogTypesWriteRepo, BlogsRepo, CreateBlogTypeParams};
use crate::cache::{CacheKey, CacheLayer, EntryPolicy, Mutation, Tag, expiry};
use crate::domain::entities::BlogTypeRecord;
use crate::domain::error::DomainError;
use crate::domain::types::{BlogTypeAction, BlogTypeId, PERSONAL_BLOG_TYPE};

const SOURCE: &str = "application::blog_types";

/// In-memory criteria applied to the cached list of blog types.
///
/// Unset criteria match everything. Rating bounds keep the types whose
/// minimum rating does not exceed the given value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlogTypeFilter {
    pub include_type: Option<String>,
    pub exclude_type: Option<String>,
    pub is_active: bool,
    pub not_active: bool,
    pub allow_add: bool,
    pub allow_list: bool,
    pub min_rate_add: Option<f64>,
    pub min_rate_list: Option<f64>,
}

impl BlogTypeFilter {
    pub fn matches(&self, record: &BlogTypeRecord) -> bool {
        if let Some(code) = &self.include_type
            && record.type_code != *code
        {
            return false;
        }
        if let Some(code) = &self.exclude_type
            && record.type_code == *code
        {
            return false;
        }
        if self.is_active && !record.active {
            return false;
        }
        if self.not_active && record.active {
            return false;
        }
        if self.allow_add && !record.allow_add {
            return false;
        }
        if self.allow_list && !record.show_title {
            return false;
        }
        if let Some(rating) = self.min_rate_add
            && record.min_rate_add > rating
        {
            return false;
        }
        if let Some(rating) = self.min_rate_list
            && record.min_rate_list > rating
        {
            return false;
        }
        true
    }

    /// Types a viewer may use for `action`; personal and inactive types never qualify.
    pub fn allowed_for(viewer: Option<&Viewer>, action: BlogTypeAction) -> Self {
        let mut filter = Self {
            exclude_type: Some(PERSONAL_BLOG_TYPE.to_string()),
            is_active: true,
            ..Self::default()
        };
        match viewer {
            Some(viewer) if viewer.is_administrator => {}
            viewer => {
                let rating = viewer.map(|viewer| viewer.rating);
                match action {
                    BlogTypeAction::Add => {
                        filter.allow_add = true;
                        filter.min_rate_add = rating;
                    }
                    BlogTypeAction::List => {
                        filter.allow_list = true;
                        filter.min_rate_list = rating;
                    }
                }
            }
        }
        filter
    }
}

#[derive(Clone)]
pub struct BlogTypeService {
    reader: Arc<dyn BlogTypesRepo>,
    writer: Arc<dyn BlogTypesWriteRepo>,
    blogs: Arc<dyn BlogsRepo>,
    cache: Arc<CacheLayer>,
}

impl BlogTypeService {
    pub fn new(
        reader: Arc<dyn BlogTypesRepo>,
        writer: Arc<dyn BlogTypesWriteRepo>,
        blogs: Arc<dyn BlogsRepo>,
        cache: Arc<CacheLayer>,
    ) -> Self {
        Self {
            reader,
            writer,
            blogs,
            cache,
        }
    }

    /// Blog types matching `filter`, keyed by type code.
    pub async fn get_blog_types(
        &self,
        filter: &BlogTypeFilter,
    ) -> Result<BTreeMap<String, BlogTypeRecord>, AppError> {
        let all = self.all_blog_types().await?;
        Ok(all
            .into_iter()
            .filter(|record| filter.matches(record))
            .map(|record| (record.type_code.clone(), record))
            .collect())
    }

    pub async fn get_allowed_blog_types(
        &self,
        viewer: Option<&Viewer>,
        action: BlogTypeAction,
    ) -> Result<BTreeMap<String, BlogTypeRecord>, AppError> {
        self.get_blog_types(&BlogTypeFilter::allowed_for(viewer, action))
            .await
    }

    pub async fn get_allowed_blog_type_codes(
        &self,
        viewer: Option<&Viewer>,
        action: BlogTypeAction,
    ) -> Result<Vec<String>, AppError> {
        Ok(self
            .get_allowed_blog_types(viewer, action)
            .await?
            .into_keys()
            .collect())
    }

    pub async fn get_blog_type_by_id(
        &self,
        id: BlogTypeId,
    ) -> Result<Option<BlogTypeRecord>, AppError> {
        let policy = self.type_policy();
        let reader = Arc::clone(&self.reader);
        let record = self
            .cache
            .queries()
            .cached_optional(
                CacheKey::BlogType(id),
                |_| policy.clone(),
                policy.clone(),
                || async move { reader.find_blog_type(id).await },
            )
            .await?;
        Ok(record)
    }

    pub async fn get_blog_type_by_code(
        &self,
        code: &str,
    ) -> Result<Option<BlogTypeRecord>, AppError> {
        Ok(self
            .all_blog_types()
            .await?
            .into_iter()
            .find(|record| record.type_code == code))
    }

    pub async fn blog_type_enabled(&self, code: &str) -> Result<bool, AppError> {
        Ok(self
            .get_blog_type_by_code(code)
            .await?
            .is_some_and(|record| record.active))
    }

    pub async fn add_blog_type(
        &self,
        params: CreateBlogTypeParams,
    ) -> Result<BlogTypeRecord, AppError> {
        if params.type_code.trim().is_empty() {
            return Err(AppError::validation("blog type code must not be empty"));
        }
        let record = self.writer.create_blog_type(params).await?;
        info!(
            source = SOURCE,
            type_id = record.id,
            type_code = %record.type_code,
            "Blog type created"
        );
        self.cache
            .invalidator()
            .apply(Mutation::BlogTypeChanged { type_id: record.id })
            .await;
        Ok(record)
    }

    pub async fn update_blog_type(
        &self,
        record: BlogTypeRecord,
    ) -> Result<BlogTypeRecord, AppError> {
        let updated = self.writer.update_blog_type(record).await?;
        self.cache
            .invalidator()
            .apply(Mutation::BlogTypeChanged {
                type_id: updated.id,
            })
            .await;
        Ok(updated)
    }

    /// Remove a blog type that no blog uses any more.
    pub async fn delete_blog_type(&self, record: &BlogTypeRecord) -> Result<(), AppError> {
        let count = self.blogs.count_by_type(&record.type_code).await?;
        if count > 0 {
            return Err(DomainError::in_use("blog type", count).into());
        }
        self.writer.delete_blog_type(record.id).await?;
        info!(
            source = SOURCE,
            type_id = record.id,
            type_code = %record.type_code,
            "Blog type deleted"
        );
        self.cache
            .invalidator()
            .apply(Mutation::BlogTypeChanged { type_id: record.id })
            .await;
        Ok(())
    }

    async fn all_blog_types(&self) -> Result<Vec<BlogTypeRecord>, AppError> {
        let ttl = &self.cache.config().ttl;
        let reader = Arc::clone(&self.reader);
        let types = self
            .cache
            .queries()
            .cached(
                CacheKey::BlogTypes,
                EntryPolicy::new(vec![Tag::BlogUpdate, Tag::BlogNew], expiry(ttl.blog_types)),
                || async move { reader.list_blog_types().await },
            )
            .await?;
        Ok(types)
    }

    fn type_policy(&self) -> EntryPolicy {
        EntryPolicy::new(
            vec![Tag::BlogUpdate, Tag::BlogNew],
            expiry(self.cache.config().ttl.blog_type),
        )
    }
}
