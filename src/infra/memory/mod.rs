//! In-process repository implementations.
//!
//! [`MemoryBlogStore`] keeps every record in one mutex-guarded state and
//! implements all repository traits. Each call is recorded so callers can
//! observe how often the store was actually reached.

mod blog_types;
mod blog_users;
mod blogs;
mod users;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;

use crate::application::repos::RepoError;
use crate::cache::lock::mutex_guard;
use crate::domain::entities::{BlogRecord, BlogTypeRecord, BlogUserRecord, UserRecord, VoteRecord};
use crate::domain::types::{
    BlogId, BlogRole, BlogTypeId, CLOSE_BLOG_TYPE, PERSONAL_BLOG_TYPE, TopicId, UserId,
};

const SOURCE: &str = "infra::memory";

/// One repository call as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: &'static str,
    /// Ids the call asked for, when it asked for any.
    pub ids: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
struct TopicRow {
    blog_id: BlogId,
    author_id: UserId,
}

#[derive(Default)]
struct State {
    blogs: BTreeMap<BlogId, BlogRecord>,
    blog_types: BTreeMap<BlogTypeId, BlogTypeRecord>,
    relations: BTreeMap<(BlogId, UserId), BlogUserRecord>,
    users: BTreeMap<UserId, UserRecord>,
    votes: Vec<VoteRecord>,
    topics: BTreeMap<TopicId, TopicRow>,
    next_blog_id: BlogId,
    next_type_id: BlogTypeId,
    next_topic_id: TopicId,
    calls: Vec<StoreCall>,
}

impl State {
    fn next_blog_id(&mut self) -> BlogId {
        self.next_blog_id += 1;
        self.next_blog_id
    }

    fn next_type_id(&mut self) -> BlogTypeId {
        self.next_type_id += 1;
        self.next_type_id
    }

    fn next_topic_id(&mut self) -> TopicId {
        self.next_topic_id += 1;
        self.next_topic_id
    }
}

/// Blog store held entirely in memory.
#[derive(Default)]
pub struct MemoryBlogStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryBlogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the `personal`, `open` and `close` blog types.
    pub fn with_default_types() -> Self {
        let store = Self::new();
        store.seed_blog_type(PERSONAL_BLOG_TYPE, true, false, false);
        store.seed_blog_type("open", true, true, true);
        store.seed_blog_type(CLOSE_BLOG_TYPE, true, true, true);
        store
    }

    /// Make every following call fail until availability is restored.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock("calls").calls.clone()
    }

    /// Ids requested by each recorded call to `op`, oldest first.
    pub fn calls_to(&self, op: &str) -> Vec<Vec<u64>> {
        self.lock("calls_to")
            .calls
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.ids.clone())
            .collect()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock("call_count")
            .calls
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    pub fn reset_calls(&self) {
        self.lock("reset_calls").calls.clear();
    }

    pub fn seed_blog_type(
        &self,
        type_code: &str,
        active: bool,
        allow_add: bool,
        show_title: bool,
    ) -> BlogTypeRecord {
        let mut state = self.lock("seed_blog_type");
        let record = BlogTypeRecord {
            id: state.next_type_id(),
            type_code: type_code.to_string(),
            name: type_code.to_string(),
            active,
            allow_add,
            show_title,
            min_rate_add: 0.0,
            min_rate_list: 0.0,
        };
        state.blog_types.insert(record.id, record.clone());
        record
    }

    pub fn seed_user(&self, id: UserId, login: &str, rating: f64) -> UserRecord {
        let record = UserRecord {
            id,
            login: login.to_string(),
            rating,
            is_administrator: false,
        };
        self.lock("seed_user").users.insert(id, record.clone());
        record
    }

    /// Insert a blog; its url is derived from the title.
    pub fn seed_blog(&self, owner_id: UserId, title: &str, blog_type: &str) -> BlogRecord {
        let mut state = self.lock("seed_blog");
        let record = BlogRecord {
            id: state.next_blog_id(),
            owner_id,
            title: title.to_string(),
            description: String::new(),
            blog_type: blog_type.to_string(),
            url: Some(title.to_lowercase().replace(' ', "-")),
            avatar: None,
            rating: 0.0,
            count_user: 0,
            count_topic: 0,
            limit_rating_topic: 0.0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        state.blogs.insert(record.id, record.clone());
        record
    }

    /// Change a stored blog behind the services' back.
    pub fn modify_blog(&self, id: BlogId, change: impl FnOnce(&mut BlogRecord)) -> bool {
        match self.lock("modify_blog").blogs.get_mut(&id) {
            Some(blog) => {
                change(blog);
                true
            }
            None => false,
        }
    }

    pub fn seed_relation(&self, blog_id: BlogId, user_id: UserId, role: BlogRole) {
        self.lock("seed_relation").relations.insert(
            (blog_id, user_id),
            BlogUserRecord {
                blog_id,
                user_id,
                role,
            },
        );
    }

    pub fn seed_topic(&self, blog_id: BlogId, author_id: UserId) -> TopicId {
        let mut state = self.lock("seed_topic");
        let id = state.next_topic_id();
        state.topics.insert(id, TopicRow { blog_id, author_id });
        id
    }

    pub fn seed_vote(&self, blog_id: BlogId, voter_id: UserId, direction: i8) {
        self.lock("seed_vote").votes.push(VoteRecord {
            target_id: blog_id,
            voter_id,
            direction,
            value: f64::from(direction),
        });
    }

    pub fn blog(&self, id: BlogId) -> Option<BlogRecord> {
        self.lock("blog").blogs.get(&id).cloned()
    }

    pub fn relation(&self, blog_id: BlogId, user_id: UserId) -> Option<BlogUserRecord> {
        self.lock("relation")
            .relations
            .get(&(blog_id, user_id))
            .cloned()
    }

    /// Record the call and fail it while the store is unavailable.
    fn enter(&self, op: &'static str, ids: &[u64]) -> Result<MutexGuard<'_, State>, RepoError> {
        let mut state = self.lock(op);
        state.calls.push(StoreCall {
            op,
            ids: ids.to_vec(),
        });
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("memory store unavailable"));
        }
        Ok(state)
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, State> {
        mutex_guard(&self.state, SOURCE, op)
    }
}
