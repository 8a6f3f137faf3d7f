mod support;

use std::sync::Arc;

use blogcache::application::repos::{CreateBlogParams, CreateBlogTypeParams, UpdateBlogParams};
use blogcache::application::{AdditionalData, AppError, BlogTypeFilter, Viewer};
use blogcache::cache::{CacheConfig, FilterQuery, Mutation, SortDirection};
use blogcache::domain::entities::{BlogRecord, BlogUserRecord};
use blogcache::domain::error::DomainError;
use blogcache::domain::types::BlogRole;

use support::{AuthorsDown, Harness};

fn open_blog(owner_id: u64, title: &str, url: &str) -> CreateBlogParams {
    CreateBlogParams {
        owner_id,
        title: title.to_string(),
        description: String::new(),
        blog_type: "open".to_string(),
        url: Some(url.to_string()),
        avatar: None,
        limit_rating_topic: 0.0,
    }
}

fn renamed(blog: &BlogRecord, title: &str, url: &str) -> UpdateBlogParams {
    UpdateBlogParams {
        id: blog.id,
        title: title.to_string(),
        description: blog.description.clone(),
        blog_type: blog.blog_type.clone(),
        url: Some(url.to_string()),
        avatar: blog.avatar.clone(),
        limit_rating_topic: blog.limit_rating_topic,
    }
}

fn open_blogs() -> FilterQuery {
    FilterQuery::new()
        .with("type", "open")
        .order_by("blog_id", SortDirection::Asc)
        .paged(1, 20)
}

async fn open_titles(h: &Harness) -> Vec<String> {
    h.blogs
        .get_blogs_by_filter(&open_blogs(), AdditionalData::none(), None)
        .await
        .expect("filter")
        .items
        .into_iter()
        .map(|view| view.blog.title)
        .collect()
}

#[tokio::test]
async fn new_blog_shows_up_in_cached_lists_and_lookups() {
    let h = Harness::new();
    h.store.seed_blog(1, "Rust", "open");
    assert_eq!(open_titles(&h).await, ["Rust"]);
    let missing = h
        .blogs
        .get_blog_by_url("zig", None)
        .await
        .expect("lookup");
    assert!(missing.is_none());

    let created = h
        .blogs
        .add_blog(open_blog(2, "Zig", "zig"))
        .await
        .expect("create");

    assert_eq!(open_titles(&h).await, ["Rust", "Zig"]);
    let found = h
        .blogs
        .get_blog_by_url("zig", None)
        .await
        .expect("lookup");
    assert_eq!(found.map(|view| view.blog.id), Some(created.id));
}

#[tokio::test]
async fn updated_blog_replaces_cached_entity_and_lookups() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Rust", "open");
    h.blogs
        .get_blog_by_url("rust", None)
        .await
        .expect("warm lookup");
    h.blogs
        .get_blogs_by_ids(&[blog.id])
        .await
        .expect("warm entity");

    h.blogs
        .update_blog(renamed(&blog, "Rustaceans", "rustaceans"), Some("open"))
        .await
        .expect("update");

    let batch = h.blogs.get_blogs_by_ids(&[blog.id]).await.expect("load");
    assert_eq!(
        batch.get(blog.id).map(|blog| blog.title.as_str()),
        Some("Rustaceans")
    );
    let old = h
        .blogs
        .get_blog_by_url("rust", None)
        .await
        .expect("old url");
    assert!(old.is_none());
    let new = h
        .blogs
        .get_blog_by_url("rustaceans", None)
        .await
        .expect("new url");
    assert_eq!(new.map(|view| view.blog.id), Some(blog.id));
}

#[tokio::test]
async fn failed_write_leaves_cached_entries_in_place() {
    let h = Harness::new();
    h.store.seed_blog(1, "Rust", "open");
    assert_eq!(open_titles(&h).await, ["Rust"]);

    h.store.set_unavailable(true);
    let err = h
        .blogs
        .add_blog(open_blog(2, "Zig", "zig"))
        .await
        .expect_err("store is down");
    assert!(err.is_store_failure());
    h.store.set_unavailable(false);
    h.store.reset_calls();

    assert_eq!(open_titles(&h).await, ["Rust"]);
    assert_eq!(h.store.call_count("find_by_filter"), 0);
}

#[tokio::test]
async fn duplicate_url_is_reported_as_conflict() {
    let h = Harness::new();
    h.store.seed_blog(1, "Rust", "open");

    let err = h
        .blogs
        .add_blog(open_blog(2, "Other Rust", "rust"))
        .await
        .expect_err("url is taken");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn cache_outage_does_not_fail_writes() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Rust", "open");
    h.medium.set_failing(true);

    h.blogs
        .add_blog(open_blog(2, "Zig", "zig"))
        .await
        .expect("create while cache is down");
    h.blogs
        .update_blog(renamed(&blog, "Rust 2024", "rust"), None)
        .await
        .expect("update while cache is down");
    let deleted = h
        .blogs
        .delete_blogs(&[blog.id])
        .await
        .expect("delete while cache is down");
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn repeated_invalidation_is_harmless() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Rust", "open");
    open_titles(&h).await;

    let mutation = Mutation::BlogUpdated {
        blog_id: blog.id,
        retyped_authors: Vec::new(),
    };
    let first = h.cache.invalidator().apply(mutation.clone()).await;
    let second = h.cache.invalidator().apply(mutation).await;

    assert!(first.purged_keys > 0);
    assert_eq!(second.purged_keys, 0);
    assert!(first.is_clean() && second.is_clean());
    assert_eq!(open_titles(&h).await, ["Rust"]);
}

#[tokio::test]
async fn deleted_blogs_disappear_with_their_relations() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Rust", "open");
    h.store.seed_relation(blog.id, 7, BlogRole::Member);
    h.store.seed_topic(blog.id, 7);

    let viewer = Viewer::new(7, 0.0);
    assert!(
        h.blogs
            .get_blog_by_id(blog.id, Some(&viewer))
            .await
            .expect("warm")
            .is_some()
    );
    assert_eq!(
        h.blogs
            .blog_users()
            .get_blog_ids_by_user(7, None)
            .await
            .expect("memberships"),
        vec![blog.id]
    );

    h.blogs.delete_blogs(&[blog.id, blog.id]).await.expect("delete");

    assert!(
        h.blogs
            .get_blog_by_id(blog.id, Some(&viewer))
            .await
            .expect("reload")
            .is_none()
    );
    assert!(open_titles(&h).await.is_empty());
    assert!(h.store.relation(blog.id, 7).is_none());
    assert_eq!(h.store.calls_to("delete_blogs"), vec![vec![blog.id]]);
}

#[tokio::test]
async fn relation_changes_refresh_membership_views() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Club", "close");
    let users = h.blogs.blog_users();

    assert!(users.get_blog_user(blog.id, 7).await.expect("lookup").is_none());
    assert!(users.get_blog_ids_by_user(7, None).await.expect("ids").is_empty());
    assert_eq!(
        h.blogs
            .get_inaccessible_blogs(Some(&Viewer::new(7, 0.0)))
            .await
            .expect("inaccessible"),
        vec![blog.id]
    );

    users
        .add_relation(BlogUserRecord {
            blog_id: blog.id,
            user_id: 7,
            role: BlogRole::Member,
        })
        .await
        .expect("join");

    let relation = users.get_blog_user(blog.id, 7).await.expect("lookup");
    assert_eq!(relation.map(|relation| relation.role), Some(BlogRole::Member));
    assert_eq!(
        users.get_blog_ids_by_user(7, None).await.expect("ids"),
        vec![blog.id]
    );
    assert!(
        h.blogs
            .get_inaccessible_blogs(Some(&Viewer::new(7, 0.0)))
            .await
            .expect("inaccessible")
            .is_empty()
    );

    users
        .update_relation(BlogUserRecord {
            blog_id: blog.id,
            user_id: 7,
            role: BlogRole::Moderator,
        })
        .await
        .expect("promote");
    let members = users
        .get_blog_users_by_blog(blog.id, None, 1, 0)
        .await
        .expect("members");
    assert_eq!(members.total, 1);
    assert_eq!(members.items[0].relation.role, BlogRole::Moderator);

    users.delete_relation(blog.id, 7).await.expect("leave");
    assert!(users.get_blog_user(blog.id, 7).await.expect("lookup").is_none());
    assert_eq!(
        users
            .get_blog_users_by_blog(blog.id, None, 1, 0)
            .await
            .expect("members")
            .total,
        0
    );
}

#[tokio::test]
async fn accessible_blogs_follow_ownership_and_membership() {
    let h = Harness::new();
    let own = h.store.seed_blog(7, "Mine", "open");
    let other = h.store.seed_blog(1, "Theirs", "close");
    let viewer = Viewer::new(7, 0.0);

    assert_eq!(
        h.blogs.get_accessible_blogs(&viewer).await.expect("ids"),
        vec![own.id]
    );

    h.blogs
        .blog_users()
        .add_relation(BlogUserRecord {
            blog_id: other.id,
            user_id: 7,
            role: BlogRole::Member,
        })
        .await
        .expect("join");

    assert_eq!(
        h.blogs.get_accessible_blogs(&viewer).await.expect("ids"),
        vec![own.id, other.id]
    );
    assert!(
        h.blogs
            .get_inaccessible_blogs(Some(&Viewer::administrator(99)))
            .await
            .expect("admin")
            .is_empty()
    );
    assert_eq!(
        h.blogs.get_inaccessible_blogs(None).await.expect("guest"),
        vec![other.id]
    );
}

#[tokio::test]
async fn blog_type_changes_refresh_the_cached_type_list() {
    let h = Harness::new();
    let types = h.blogs.blog_types();
    let before = types
        .get_blog_types(&BlogTypeFilter::default())
        .await
        .expect("types");
    assert!(!before.contains_key("gallery"));

    let gallery = types
        .add_blog_type(CreateBlogTypeParams {
            type_code: "gallery".to_string(),
            name: "Gallery".to_string(),
            active: true,
            allow_add: true,
            show_title: true,
            min_rate_add: 0.0,
            min_rate_list: 0.0,
        })
        .await
        .expect("add type");

    let after = types
        .get_blog_types(&BlogTypeFilter::default())
        .await
        .expect("types");
    assert!(after.contains_key("gallery"));
    assert_eq!(
        types.get_blog_type_by_id(gallery.id).await.expect("by id"),
        Some(gallery.clone())
    );

    types
        .update_blog_type(blogcache::domain::entities::BlogTypeRecord {
            active: false,
            ..gallery.clone()
        })
        .await
        .expect("deactivate");
    assert!(!types.blog_type_enabled("gallery").await.expect("enabled"));
    assert_eq!(
        types
            .get_blog_type_by_id(gallery.id)
            .await
            .expect("by id")
            .map(|record| record.active),
        Some(false)
    );

    types.delete_blog_type(&gallery).await.expect("delete");
    assert!(types.get_blog_type_by_id(gallery.id).await.expect("by id").is_none());
    assert!(types.get_blog_type_by_code("gallery").await.expect("by code").is_none());
}

#[tokio::test]
async fn blog_type_in_use_cannot_be_deleted() {
    let h = Harness::new();
    h.store.seed_blog(1, "Rust", "open");
    let types = h.blogs.blog_types();
    let open = types
        .get_blog_type_by_code("open")
        .await
        .expect("lookup")
        .expect("open type exists");

    let err = types.delete_blog_type(&open).await.expect_err("in use");
    assert!(matches!(
        err,
        AppError::Domain(DomainError::InUse { count: 1, .. })
    ));
    assert!(types.blog_type_enabled("open").await.expect("enabled"));
}

#[tokio::test]
async fn personal_blog_is_created_only_while_the_type_is_enabled() {
    let h = Harness::new();
    let owner = h.store.seed_user(5, "ferris", 0.0);

    let blog = h
        .blogs
        .create_personal_blog(&owner)
        .await
        .expect("create")
        .expect("personal type enabled");
    assert!(blog.is_personal());
    assert!(blog.title.ends_with(" ferris"));
    let personal = h
        .blogs
        .get_personal_blog_by_user(5, None)
        .await
        .expect("lookup");
    assert_eq!(personal.map(|view| view.blog.id), Some(blog.id));

    let types = h.blogs.blog_types();
    let personal_type = types
        .get_blog_type_by_code("personal")
        .await
        .expect("lookup")
        .expect("personal type exists");
    types
        .update_blog_type(blogcache::domain::entities::BlogTypeRecord {
            active: false,
            ..personal_type
        })
        .await
        .expect("disable");

    let other = h.store.seed_user(6, "corro", 0.0);
    assert!(
        h.blogs
            .create_personal_blog(&other)
            .await
            .expect("skip")
            .is_none()
    );
    assert_eq!(h.store.call_count("create_blog"), 1);
}

#[tokio::test]
async fn retyped_blog_reports_its_authors() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Rust", "open");
    h.store.seed_topic(blog.id, 3);
    h.store.seed_topic(blog.id, 4);

    assert_eq!(
        h.blogs.get_authors_by_blog(blog.id).await.expect("authors"),
        vec![3, 4]
    );

    let mut params = renamed(&blog, "Rust", "rust");
    params.blog_type = "close".to_string();
    let updated = h
        .blogs
        .update_blog(params, Some("open"))
        .await
        .expect("retype");
    assert!(updated.is_closed());
    assert_eq!(
        h.blogs.get_inaccessible_blogs(None).await.expect("guest"),
        vec![blog.id]
    );
}

#[tokio::test]
async fn failed_author_lookup_leaves_store_and_cache_agreeing() {
    let h = Harness::with_reader(CacheConfig::default(), |store| Arc::new(AuthorsDown(store)));
    let blog = h.store.seed_blog(1, "Rust", "open");
    h.store.seed_topic(blog.id, 3);

    let cached = h.blogs.get_blogs_by_ids(&[blog.id]).await.expect("warm");
    assert_eq!(
        cached.get(blog.id).map(|blog| blog.blog_type.as_str()),
        Some("open")
    );

    let mut params = renamed(&blog, "Rust", "rust");
    params.blog_type = "close".to_string();
    let err = h
        .blogs
        .update_blog(params, Some("open"))
        .await
        .expect_err("authors unavailable");
    assert!(err.is_store_failure());
    assert_eq!(h.store.call_count("update_blog"), 0);

    let stored = h.store.blog(blog.id).expect("blog still stored");
    let served = h.blogs.get_blogs_by_ids(&[blog.id]).await.expect("reload");
    assert_eq!(
        served.get(blog.id).map(|blog| blog.blog_type.as_str()),
        Some(stored.blog_type.as_str())
    );
    assert_eq!(stored.blog_type, "open");
}

#[tokio::test]
async fn recalculated_topic_counts_replace_cached_blogs() {
    let h = Harness::new();
    let blog = h.store.seed_blog(1, "Rust", "open");
    h.store.seed_topic(blog.id, 3);
    h.store.seed_topic(blog.id, 3);

    let cached = h.blogs.get_blogs_by_ids(&[blog.id]).await.expect("warm");
    assert_eq!(cached.get(blog.id).map(|blog| blog.count_topic), Some(0));

    h.blogs
        .recalculate_topic_counts_for(blog.id)
        .await
        .expect("recalculate");

    let fresh = h.blogs.get_blogs_by_ids(&[blog.id]).await.expect("reload");
    assert_eq!(fresh.get(blog.id).map(|blog| blog.count_topic), Some(2));
    assert_eq!(h.store.calls_to("recalculate_topic_counts"), vec![vec![blog.id]]);
}
