//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::{
    BlogId, BlogRole, BlogTypeId, CLOSE_BLOG_TYPE, PERSONAL_BLOG_TYPE, UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogRecord {
    pub id: BlogId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub blog_type: String,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub rating: f64,
    pub count_user: u32,
    pub count_topic: u32,
    pub limit_rating_topic: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
}

impl BlogRecord {
    pub fn is_personal(&self) -> bool {
        self.blog_type == PERSONAL_BLOG_TYPE
    }

    pub fn is_closed(&self) -> bool {
        self.blog_type == CLOSE_BLOG_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogTypeRecord {
    pub id: BlogTypeId,
    pub type_code: String,
    pub name: String,
    pub active: bool,
    pub allow_add: bool,
    /// Blogs of this type are listed publicly.
    pub show_title: bool,
    pub min_rate_add: f64,
    pub min_rate_list: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogUserRecord {
    pub blog_id: BlogId,
    pub user_id: UserId,
    pub role: BlogRole,
}

impl BlogUserRecord {
    pub fn is_administrator(&self) -> bool {
        self.role == BlogRole::Administrator
    }

    pub fn is_moderator(&self) -> bool {
        self.role == BlogRole::Moderator
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub login: String,
    pub rating: f64,
    pub is_administrator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub target_id: u64,
    pub voter_id: UserId,
    pub direction: i8,
    pub value: f64,
}
