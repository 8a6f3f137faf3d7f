//! Blog data access behind a tagged read-through cache.
//!
//! Services in [`application`] load blogs, blog types and memberships
//! through the [`cache`] layer, which remembers both found and missing
//! entities and drops related entries by tag after every successful write.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
