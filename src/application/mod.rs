//! Blog services reading through the tagged cache.

pub mod blog_types;
pub mod blog_users;
pub mod blogs;
pub mod context;
pub mod error;
pub mod repos;
pub(crate) mod sources;

pub use blog_types::{BlogTypeFilter, BlogTypeService};
pub use blog_users::{BlogMember, BlogUserService};
pub use blogs::{AdditionalData, BlogPage, BlogService, BlogView};
pub use context::Viewer;
pub use error::AppError;
