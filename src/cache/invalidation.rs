//! Mutation-driven invalidation.
//!
//! Every successful write is described as a [`Mutation`]; mutations are
//! merged into one [`InvalidationPlan`] listing the tags to purge and the keys
//! to delete, which the [`Invalidator`] then applies.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, warn};

use crate::domain::types::{BlogId, BlogTypeId, TopicId, UserId};

use super::keys::{CacheKey, Tag};
use super::store::CacheStore;

const SOURCE: &str = "cache::invalidation";
const METRIC_INVALIDATE_MS: &str = "blogcache_invalidate_ms";

/// Store writes that affect cached data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    BlogCreated,
    /// `retyped_authors` lists topic authors whose topics moved with a type change.
    BlogUpdated {
        blog_id: BlogId,
        retyped_authors: Vec<UserId>,
    },
    BlogsDeleted {
        blog_ids: Vec<BlogId>,
        topic_ids: Vec<TopicId>,
    },
    /// A membership was added, changed or removed.
    RelationChanged { blog_id: BlogId, user_id: UserId },
    /// A blog type was added, changed or removed.
    BlogTypeChanged { type_id: BlogTypeId },
    TopicCountsRecalculated { blog_id: Option<BlogId> },
}

/// Tags to purge and keys to delete, each listed once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub tags: BTreeSet<Tag>,
    pub keys: BTreeSet<CacheKey>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ tags: {}, keys: {} }}",
            self.tags.len(),
            self.keys.len()
        )
    }
}

impl InvalidationPlan {
    pub fn from_mutation(mutation: &Mutation) -> Self {
        let mut plan = Self::default();
        plan.add(mutation);
        plan
    }

    /// Merge several mutations into one deduplicated plan.
    pub fn from_mutations<'a>(mutations: impl IntoIterator<Item = &'a Mutation>) -> Self {
        let mut plan = Self::default();
        for mutation in mutations {
            plan.add(mutation);
        }
        plan
    }

    pub fn merge(&mut self, other: InvalidationPlan) {
        self.tags.extend(other.tags);
        self.keys.extend(other.keys);
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.keys.is_empty()
    }

    fn add(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::BlogCreated => {
                self.tags.insert(Tag::BlogNew);
            }
            Mutation::BlogUpdated {
                blog_id,
                retyped_authors,
            } => {
                self.tags.insert(Tag::BlogUpdate);
                self.tags.insert(Tag::BlogUpdateId(*blog_id));
                self.tags.insert(Tag::TopicUpdate);
                self.tags
                    .extend(retyped_authors.iter().map(|user| Tag::TopicUpdateUser(*user)));
                self.keys.insert(CacheKey::Blog(*blog_id));
            }
            Mutation::BlogsDeleted {
                blog_ids,
                topic_ids,
            } => {
                self.tags.extend([
                    Tag::BlogUpdate,
                    Tag::TopicUpdate,
                    Tag::CommentOnlineUpdateTopic,
                    Tag::CommentUpdate,
                ]);
                for blog_id in blog_ids {
                    self.tags.insert(Tag::RelationChangeBlog(*blog_id));
                    self.keys.insert(CacheKey::Blog(*blog_id));
                }
                self.keys
                    .extend(topic_ids.iter().map(|topic| CacheKey::Topic(*topic)));
            }
            Mutation::RelationChanged { blog_id, user_id } => {
                self.tags.insert(Tag::RelationChangeUser(*user_id));
                self.tags.insert(Tag::RelationChangeBlog(*blog_id));
                self.keys.insert(CacheKey::BlogUser {
                    blog_id: *blog_id,
                    user_id: *user_id,
                });
            }
            Mutation::BlogTypeChanged { type_id } => {
                self.tags.insert(Tag::BlogUpdate);
                self.keys.insert(CacheKey::BlogType(*type_id));
            }
            Mutation::TopicCountsRecalculated { blog_id } => {
                self.tags.insert(Tag::BlogUpdate);
                if let Some(blog_id) = blog_id {
                    self.tags.insert(Tag::BlogUpdateId(*blog_id));
                    self.keys.insert(CacheKey::Blog(*blog_id));
                }
            }
        }
    }
}

/// What an applied plan actually did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub purged_keys: usize,
    pub deleted_keys: usize,
    /// Steps that failed against the medium and were skipped.
    pub failures: usize,
}

impl InvalidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Applies invalidation plans after successful store writes.
pub struct Invalidator {
    store: Arc<CacheStore>,
    enabled: bool,
}

impl Invalidator {
    pub fn new(store: Arc<CacheStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    pub async fn apply(&self, mutation: Mutation) -> InvalidationReport {
        self.apply_plan(InvalidationPlan::from_mutation(&mutation))
            .await
    }

    pub async fn apply_all(&self, mutations: &[Mutation]) -> InvalidationReport {
        self.apply_plan(InvalidationPlan::from_mutations(mutations))
            .await
    }

    /// Purge the plan's tags, then delete its keys.
    ///
    /// Medium failures are logged and counted in the report, never returned:
    /// the write that caused the plan has already succeeded.
    pub async fn apply_plan(&self, plan: InvalidationPlan) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        if !self.enabled || plan.is_empty() {
            return report;
        }
        let started_at = Instant::now();

        let tags: Vec<Tag> = plan.tags.iter().cloned().collect();
        match self.store.purge_tags(&tags).await {
            Ok(purged) => report.purged_keys = purged,
            Err(err) => {
                report.failures += 1;
                warn!(
                    source = SOURCE,
                    tags = tags.len(),
                    error = %err,
                    "Tag purge failed; entries stay until expiry or the next purge"
                );
            }
        }

        let keys: Vec<CacheKey> = plan.keys.iter().cloned().collect();
        match self.store.delete_many(&keys).await {
            Ok(()) => report.deleted_keys = keys.len(),
            Err(err) => {
                report.failures += 1;
                warn!(
                    source = SOURCE,
                    keys = keys.len(),
                    error = %err,
                    "Key deletion failed; entries stay until expiry"
                );
            }
        }

        info!(
            source = SOURCE,
            plan = %plan,
            purged = report.purged_keys,
            deleted = report.deleted_keys,
            failures = report.failures,
            "Cache invalidation applied"
        );
        histogram!(
            METRIC_INVALIDATE_MS,
            "result" => if report.is_clean() { "ok" } else { "partial" }
        )
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }
}
