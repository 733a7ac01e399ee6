#![cfg(test)]

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use serde_json::Value;

use crate::analytics::{extract_domain, parse_user_agent, resolve_range};
use crate::db::{DbPool, run_migrations, seed_defaults};
use crate::image_paths::UploadRoots;
use crate::models::settings::Setting;
use crate::models::post::{Post, PostData};
use crate::models::category::{Category, CategoryForm};
use crate::models::tag::{Tag, TagForm};
use crate::models::comment::{Comment, CommentForm};
use crate::models::user::User;
use crate::models::analytics::{Dashboard, Event, NewEvent, NewPageView, PageView};
use crate::rate_limit::RateLimiter;
use crate::reconcile::{ImageRef, Thumbnail};
use crate::security::auth;

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Create a fresh in-memory SQLite pool with all migrations + seed defaults applied.
/// Uses a named shared-cache in-memory DB so multiple connections see the same data
/// (route handlers and models each draw their own connection from the pool).
/// Pre-inserts the admin account with a fast bcrypt hash so seed_defaults skips the
/// expensive DEFAULT_COST hash (which can take 60s+ in debug builds).
fn test_pool() -> DbPool {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let uri = format!("file:testdb_{}?mode=memory&cache=shared", id);
    let manager = SqliteConnectionManager::file(uri);
    let pool = Pool::builder()
        .max_size(2)
        .build(manager)
        .expect("Failed to create test pool");
    {
        let conn = pool.get().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    }
    run_migrations(&pool).expect("Failed to run migrations");
    // Pre-insert the admin user so seed_defaults skips the slow bcrypt call
    {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role)
             VALUES ('admin', 'admin@test.local', ?1, 'admin')",
            rusqlite::params![fast_hash("admin")],
        )
        .unwrap();
    }
    seed_defaults(&pool).expect("Failed to seed defaults");
    pool
}

/// Fast bcrypt hash for tests (cost=4 instead of DEFAULT_COST=12).
fn fast_hash(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

fn post_data(title: &str, slug: &str, status: &str) -> PostData {
    PostData {
        title: title.to_string(),
        slug: slug.to_string(),
        content: "<p>Some words to fill the body of a test post.</p>".to_string(),
        summary: Some("A short summary".to_string()),
        category: "Technology".to_string(),
        tags: vec![],
        author_id: None,
        featured: false,
        status: status.to_string(),
        publish_date: None,
        images: vec![],
        thumbnail: None,
    }
}

fn comment_form(post_id: i64, name: &str, content: &str) -> CommentForm {
    CommentForm {
        post_id,
        author_name: name.to_string(),
        author_email: None,
        content: content.to_string(),
        honeypot: None,
    }
}

fn page_view(path: &str, session_key: Option<&str>, ip_hash: &str) -> NewPageView {
    NewPageView {
        page: Some("blog".to_string()),
        path: path.to_string(),
        post_id: None,
        session_key: session_key.map(str::to_string),
        referrer: None,
        user_agent: None,
        device: Some("desktop".to_string()),
        browser: Some("Chrome".to_string()),
        os: Some("Linux".to_string()),
        ip_hash: ip_hash.to_string(),
    }
}

fn event(event_type: &str, category: Option<&str>, value: Option<f64>, post_id: Option<i64>) -> NewEvent {
    NewEvent {
        event_type: event_type.to_string(),
        category: category.map(str::to_string),
        action: None,
        label: None,
        value,
        page: None,
        path: None,
        post_id,
        session_key: None,
    }
}

/// A window wide enough that rows written during the test always land inside it.
fn window() -> (NaiveDateTime, NaiveDateTime) {
    let now = Utc::now().naive_utc();
    (now - Duration::days(1), now + Duration::days(1))
}

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

#[test]
fn settings_set_and_get() {
    let pool = test_pool();
    Setting::set(&pool, "test_key", "hello").unwrap();
    assert_eq!(Setting::get(&pool, "test_key"), Some("hello".to_string()));
    assert_eq!(Setting::get(&pool, "missing_key"), None);
    assert_eq!(Setting::get_or(&pool, "missing_key", "fallback"), "fallback");

    // set is an upsert
    Setting::set(&pool, "test_key", "changed").unwrap();
    assert_eq!(Setting::get(&pool, "test_key"), Some("changed".to_string()));
}

#[test]
fn settings_typed_accessors() {
    let pool = test_pool();
    Setting::set(&pool, "flag_true", "true").unwrap();
    Setting::set(&pool, "flag_one", "1").unwrap();
    Setting::set(&pool, "flag_off", "false").unwrap();
    assert!(Setting::get_bool(&pool, "flag_true"));
    assert!(Setting::get_bool(&pool, "flag_one"));
    assert!(!Setting::get_bool(&pool, "flag_off"));
    assert!(!Setting::get_bool(&pool, "flag_missing"));

    Setting::set(&pool, "num", "42").unwrap();
    Setting::set(&pool, "not_num", "forty-two").unwrap();
    assert_eq!(Setting::get_i64_or(&pool, "num", 7), 42);
    assert_eq!(Setting::get_i64_or(&pool, "not_num", 7), 7);
    assert_eq!(Setting::get_i64_or(&pool, "missing", 7), 7);
}

#[test]
fn settings_set_many_and_all() {
    let pool = test_pool();
    let mut batch = HashMap::new();
    batch.insert("site_name".to_string(), "My Blog".to_string());
    batch.insert("posts_per_page".to_string(), "25".to_string());
    Setting::set_many(&pool, &batch).unwrap();

    let all = Setting::all(&pool);
    assert_eq!(all.get("site_name"), Some(&"My Blog".to_string()));
    assert_eq!(all.get("posts_per_page"), Some(&"25".to_string()));
}

#[test]
fn settings_seeded_defaults() {
    let pool = test_pool();
    assert_eq!(Setting::get_or(&pool, "site_name", ""), "Inkpot");
    assert_eq!(Setting::get_i64_or(&pool, "posts_per_page", 0), 10);
    assert!(Setting::get_bool(&pool, "comments_enabled"));
    assert_eq!(Setting::get_or(&pool, "comments_moderation", ""), "manual");
    assert_eq!(Setting::get_i64_or(&pool, "analytics_retention_days", 0), 90);
    assert_eq!(Setting::get_i64_or(&pool, "session_expiry_hours", 0), 24);
}

// ═══════════════════════════════════════════════════════════
// Posts
// ═══════════════════════════════════════════════════════════

#[test]
fn post_create_and_find() {
    let pool = test_pool();
    let id = Post::create(&pool, &post_data("First Post", "first-post", "published")).unwrap();

    let post = Post::find_by_id(&pool, id).unwrap();
    assert_eq!(post.title, "First Post");
    assert_eq!(post.status, "published");
    assert_eq!(post.views, 0);
    assert!(post.author_name.is_none());

    let by_slug = Post::find_by_slug(&pool, "first-post").unwrap();
    assert_eq!(by_slug.id, id);
    assert!(Post::find_by_slug(&pool, "no-such-slug").is_none());
}

#[test]
fn post_update_fields() {
    let pool = test_pool();
    let id = Post::create(&pool, &post_data("Original", "original", "draft")).unwrap();

    let mut data = post_data("Renamed", "renamed", "published");
    data.tags = vec!["rust".to_string()];
    data.featured = true;
    Post::update(&pool, id, &data).unwrap();

    let post = Post::find_by_id(&pool, id).unwrap();
    assert_eq!(post.title, "Renamed");
    assert_eq!(post.slug, "renamed");
    assert_eq!(post.status, "published");
    assert_eq!(post.tags, vec!["rust"]);
    assert!(post.featured);
}

#[test]
fn post_stores_images_and_thumbnail() {
    let pool = test_pool();
    let mut data = post_data("Gallery", "gallery", "draft");
    data.tags = vec!["rust".to_string(), "sqlite".to_string()];
    data.images = vec![ImageRef {
        url: "/uploads/image-1-1.jpg".to_string(),
        alt: "Blog post image".to_string(),
        origin_filename: Some("image-1-1.jpg".to_string()),
    }];
    data.thumbnail = Some(Thumbnail {
        url: "/uploads/image-1-1.jpg".to_string(),
        alt: "Blog post image".to_string(),
    });
    let id = Post::create(&pool, &data).unwrap();

    let post = Post::find_by_id(&pool, id).unwrap();
    assert_eq!(post.tags, vec!["rust", "sqlite"]);
    assert_eq!(post.images.len(), 1);
    assert_eq!(post.images[0].url, "/uploads/image-1-1.jpg");
    assert_eq!(post.images[0].origin_filename.as_deref(), Some("image-1-1.jpg"));
    assert_eq!(post.thumbnail.unwrap().url, "/uploads/image-1-1.jpg");
}

#[test]
fn post_row_with_bad_json_still_loads() {
    let pool = test_pool();
    let id = Post::create(&pool, &post_data("Broken", "broken", "draft")).unwrap();
    {
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE posts SET tags = 'not json', images = '{', thumbnail = 'nope' WHERE id = ?1",
            rusqlite::params![id],
        )
        .unwrap();
    }

    let post = Post::find_by_id(&pool, id).unwrap();
    assert!(post.tags.is_empty());
    assert!(post.images.is_empty());
    assert!(post.thumbnail.is_none());
}

#[test]
fn post_list_filters_by_status_and_category() {
    let pool = test_pool();
    Post::create(&pool, &post_data("Pub", "pub", "published")).unwrap();
    Post::create(&pool, &post_data("Dr", "dr", "draft")).unwrap();
    let mut health = post_data("H", "h", "published");
    health.category = "Health".to_string();
    Post::create(&pool, &health).unwrap();

    let published = Post::list(&pool, Some("published"), None, None, None, 10, 0);
    assert_eq!(published.len(), 2);
    let drafts = Post::list(&pool, Some("draft"), None, None, None, 10, 0);
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].slug, "dr");

    let tech = Post::list(&pool, Some("published"), Some("Technology"), None, None, 10, 0);
    assert_eq!(tech.len(), 1);
    assert_eq!(tech[0].slug, "pub");

    assert_eq!(Post::count(&pool, Some("published"), None, None, None), 2);
    assert_eq!(Post::count(&pool, None, None, None, None), 3);
}

#[test]
fn post_list_filters_by_tag_exactly() {
    let pool = test_pool();
    let mut rust_post = post_data("Rust tips", "rust-tips", "published");
    rust_post.tags = vec!["rust".to_string()];
    Post::create(&pool, &rust_post).unwrap();
    let mut other = post_data("Rustlings", "rustlings", "published");
    other.tags = vec!["rustlings".to_string()];
    Post::create(&pool, &other).unwrap();

    let hits = Post::list(&pool, None, None, Some("rust"), None, 10, 0);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].slug, "rust-tips");

    // A prefix that is not a whole tag name matches nothing
    assert!(Post::list(&pool, None, None, Some("rus"), None, 10, 0).is_empty());
    assert_eq!(Post::count(&pool, None, None, Some("rust"), None), 1);
}

#[test]
fn post_list_search_matches_title_and_content() {
    let pool = test_pool();
    let mut a = post_data("Async in practice", "async-in-practice", "published");
    a.content = "<p>Executors and wakers.</p>".to_string();
    Post::create(&pool, &a).unwrap();
    let mut b = post_data("Unrelated title", "unrelated-title", "published");
    b.content = "<p>Contains ASYNC in the body.</p>".to_string();
    Post::create(&pool, &b).unwrap();
    Post::create(&pool, &post_data("Third", "third", "published")).unwrap();

    // LIKE matching is case-insensitive for ASCII
    let hits = Post::list(&pool, None, None, None, Some("async"), 10, 0);
    assert_eq!(hits.len(), 2);
    assert_eq!(Post::count(&pool, None, None, None, Some("async")), 2);
}

#[test]
fn post_list_pagination() {
    let pool = test_pool();
    for i in 0..5 {
        Post::create(&pool, &post_data(&format!("P{}", i), &format!("p{}", i), "published")).unwrap();
    }
    let first = Post::list(&pool, None, None, None, None, 2, 0);
    let second = Post::list(&pool, None, None, None, None, 2, 2);
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_ne!(first[0].id, second[0].id);
    assert_eq!(Post::list(&pool, None, None, None, None, 2, 4).len(), 1);
}

#[test]
fn post_unique_slug_appends_counter() {
    let pool = test_pool();
    assert_eq!(Post::unique_slug(&pool, "Hello World", None), "hello-world");

    let id = Post::create(&pool, &post_data("Hello World", "hello-world", "draft")).unwrap();
    assert_eq!(Post::unique_slug(&pool, "Hello World", None), "hello-world-2");

    Post::create(&pool, &post_data("Hello World again", "hello-world-2", "draft")).unwrap();
    assert_eq!(Post::unique_slug(&pool, "Hello World", None), "hello-world-3");

    // A post keeps its own slug when it is the one being updated
    assert_eq!(Post::unique_slug(&pool, "Hello World", Some(id)), "hello-world");

    // Titles with nothing sluggable fall back to a fixed stem
    assert_eq!(Post::unique_slug(&pool, "!!!", None), "post");
}

#[test]
fn post_generate_summary_strips_markup_and_truncates() {
    assert_eq!(Post::generate_summary("<p>Hello <b>world</b></p>"), "Hello world");

    let long = format!("<p>{}</p>", "a".repeat(300));
    let summary = Post::generate_summary(&long);
    assert!(summary.ends_with("..."));
    assert_eq!(summary.chars().count(), 203);
}

#[test]
fn post_publish_due_promotes_past_schedules() {
    let pool = test_pool();
    let now = Utc::now().naive_utc();

    let mut due = post_data("Due", "due", "scheduled");
    due.publish_date = Some(now - Duration::days(2));
    let due_id = Post::create(&pool, &due).unwrap();

    let mut future = post_data("Future", "future", "scheduled");
    future.publish_date = Some(now + Duration::days(2));
    let future_id = Post::create(&pool, &future).unwrap();

    Post::create(&pool, &post_data("Draft", "draft-post", "draft")).unwrap();

    let promoted = Post::publish_due(&pool).unwrap();
    assert_eq!(promoted, vec![(due_id, "Due".to_string())]);
    assert_eq!(Post::find_by_id(&pool, due_id).unwrap().status, "published");
    assert_eq!(Post::find_by_id(&pool, future_id).unwrap().status, "scheduled");

    // Nothing left to promote on the second run
    assert!(Post::publish_due(&pool).unwrap().is_empty());
}

#[test]
fn post_views_and_popular_ordering() {
    let pool = test_pool();
    let a = Post::create(&pool, &post_data("A", "a", "published")).unwrap();
    let b = Post::create(&pool, &post_data("B", "b", "published")).unwrap();
    let hidden = Post::create(&pool, &post_data("Hidden", "hidden", "draft")).unwrap();

    for _ in 0..3 {
        Post::increment_views(&pool, b).unwrap();
    }
    Post::increment_views(&pool, a).unwrap();
    Post::increment_views(&pool, hidden).unwrap();

    let top = Post::popular(&pool, 10);
    assert_eq!(top.len(), 2, "drafts never chart");
    assert_eq!(top[0].slug, "b");
    assert_eq!(top[0].views, 3);
    assert_eq!(top[1].slug, "a");
}

#[test]
fn post_delete_removes_its_comments() {
    let pool = test_pool();
    let id = Post::create(&pool, &post_data("Discussed", "discussed", "published")).unwrap();
    Comment::create(&pool, &comment_form(id, "Ann", "First"), true).unwrap();
    Comment::create(&pool, &comment_form(id, "Ben", "Second"), false).unwrap();
    assert_eq!(Comment::count(&pool, None), 2);

    Post::delete(&pool, id).unwrap();
    assert!(Post::find_by_id(&pool, id).is_none());
    assert_eq!(Comment::count(&pool, None), 0);
}

#[test]
fn post_author_name_joined() {
    let pool = test_pool();
    let author = User::create(&pool, "casey", "casey@example.com", &fast_hash("pw"), "author").unwrap();
    let mut data = post_data("Bylined", "bylined", "published");
    data.author_id = Some(author);
    let id = Post::create(&pool, &data).unwrap();

    let post = Post::find_by_id(&pool, id).unwrap();
    assert_eq!(post.author_id, Some(author));
    assert_eq!(post.author_name.as_deref(), Some("casey"));
}

// ═══════════════════════════════════════════════════════════
// Comments
// ═══════════════════════════════════════════════════════════

#[test]
fn comment_create_validations() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("P", "p", "published")).unwrap();

    let mut spam = comment_form(post_id, "Bot", "Buy things");
    spam.honeypot = Some("gotcha".to_string());
    assert_eq!(Comment::create(&pool, &spam, true), Err("Spam detected".to_string()));

    assert_eq!(
        Comment::create(&pool, &comment_form(post_id, "   ", "Hi"), true),
        Err("Name is required".to_string())
    );
    assert_eq!(
        Comment::create(&pool, &comment_form(post_id, "Ann", "   "), true),
        Err("Comment text is required".to_string())
    );

    // An empty honeypot is what a normal browser submits
    let mut ok = comment_form(post_id, "  Ann  ", "Hello");
    ok.honeypot = Some(String::new());
    let id = Comment::create(&pool, &ok, false).unwrap();
    let saved = Comment::find_by_id(&pool, id).unwrap();
    assert_eq!(saved.author_name, "Ann", "author name is trimmed");
    assert!(!saved.approved);
}

#[test]
fn comment_moderation_flow() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("P", "p", "published")).unwrap();
    let pending = Comment::create(&pool, &comment_form(post_id, "Ann", "First"), false).unwrap();
    let live = Comment::create(&pool, &comment_form(post_id, "Ben", "Second"), true).unwrap();
    {
        // Deterministic ordering for the assertions below
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE comments SET created_at = datetime('now', '-1 hour') WHERE id = ?1",
            rusqlite::params![pending],
        )
        .unwrap();
    }

    // The public view shows approved comments only, oldest first
    let visible = Comment::for_post(&pool, post_id);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, live);

    Comment::set_approved(&pool, pending, true).unwrap();
    let visible = Comment::for_post(&pool, post_id);
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0].id, pending);

    assert_eq!(Comment::count(&pool, Some(true)), 2);
    assert_eq!(Comment::count(&pool, Some(false)), 0);

    Comment::set_approved(&pool, live, false).unwrap();
    assert_eq!(Comment::count(&pool, Some(false)), 1);
}

#[test]
fn comment_admin_list_joins_post_title() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("Titled", "titled", "published")).unwrap();
    Comment::create(&pool, &comment_form(post_id, "Ann", "Hi"), false).unwrap();

    let all = Comment::list(&pool, None, 50, 0);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].post_title.as_deref(), Some("Titled"));

    assert!(Comment::list(&pool, Some(true), 50, 0).is_empty());
    assert_eq!(Comment::list(&pool, Some(false), 50, 0).len(), 1);
}

#[test]
fn comment_delete() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("P", "p", "published")).unwrap();
    let id = Comment::create(&pool, &comment_form(post_id, "Ann", "Bye"), true).unwrap();

    Comment::delete(&pool, id).unwrap();
    assert!(Comment::find_by_id(&pool, id).is_none());
}

// ═══════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════

#[test]
fn user_create_and_login_lookup() {
    let pool = test_pool();
    let id = User::create(&pool, "casey", "casey@example.com", &fast_hash("secret"), "editor").unwrap();

    let by_name = User::find_by_login(&pool, "casey").unwrap();
    let by_email = User::find_by_login(&pool, "casey@example.com").unwrap();
    assert_eq!(by_name.id, id);
    assert_eq!(by_email.id, id);
    assert_eq!(by_name.role, "editor");
    assert!(User::find_by_login(&pool, "nobody").is_none());

    assert_eq!(User::find_by_email(&pool, "casey@example.com").unwrap().id, id);
}

#[test]
fn user_roles_and_safe_json() {
    let pool = test_pool();
    let admin = User::find_by_login(&pool, "admin").unwrap();
    assert!(admin.is_admin());
    assert!(admin.is_editor_or_above());
    assert!(admin.is_author_or_above());

    let id = User::create(&pool, "author1", "a1@example.com", &fast_hash("pw"), "author").unwrap();
    let author = User::find_by_id(&pool, id).unwrap();
    assert!(!author.is_admin());
    assert!(!author.is_editor_or_above());
    assert!(author.is_author_or_above());

    let json = author.safe_json();
    assert_eq!(json["username"], "author1");
    assert_eq!(json["role"], "author");
    assert!(json.get("password_hash").is_none(), "hash never leaves the server");
}

#[test]
fn user_update_and_password() {
    let pool = test_pool();
    let id = User::create(&pool, "old", "old@example.com", &fast_hash("pw"), "author").unwrap();

    User::update(&pool, id, "new", "new@example.com", "editor").unwrap();
    let user = User::find_by_id(&pool, id).unwrap();
    assert_eq!(user.username, "new");
    assert_eq!(user.email, "new@example.com");
    assert_eq!(user.role, "editor");

    User::update_password(&pool, id, &fast_hash("changed")).unwrap();
    let user = User::find_by_id(&pool, id).unwrap();
    assert!(auth::verify_password("changed", &user.password_hash));
    assert!(!auth::verify_password("pw", &user.password_hash));
}

#[test]
fn user_delete_detaches_content() {
    let pool = test_pool();
    let id = User::create(&pool, "writer", "w@example.com", &fast_hash("pw"), "author").unwrap();
    let mut data = post_data("Theirs", "theirs", "published");
    data.author_id = Some(id);
    let post_id = Post::create(&pool, &data).unwrap();
    let session = auth::create_session(&pool, id, Some("10.0.0.1"), Some("test-agent")).unwrap();

    User::delete(&pool, id).unwrap();
    assert!(User::find_by_id(&pool, id).is_none());
    // The post survives without an author; the session does not survive
    assert_eq!(Post::find_by_id(&pool, post_id).unwrap().author_id, None);
    assert!(User::find_by_session(&pool, &session).is_none());
}

#[test]
fn user_list_includes_seeded_admin() {
    let pool = test_pool();
    User::create(&pool, "second", "s@example.com", &fast_hash("pw"), "author").unwrap();

    let users = User::list_all(&pool);
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].username, "admin");
    assert_eq!(users[1].username, "second");
}

// ═══════════════════════════════════════════════════════════
// Tags
// ═══════════════════════════════════════════════════════════

#[test]
fn tag_create_and_find_or_create() {
    let pool = test_pool();
    let id = Tag::find_or_create(&pool, "rust").unwrap();
    assert_eq!(Tag::find_or_create(&pool, "rust").unwrap(), id);

    let tag = Tag::find_by_name(&pool, "rust").unwrap();
    assert_eq!(tag.slug, "rust");
    assert_eq!(Tag::find_by_id(&pool, id).unwrap().name, "rust");

    assert_eq!(
        Tag::create(&pool, &TagForm { name: "   ".to_string(), description: None }),
        Err("Tag name is required".to_string())
    );
}

#[test]
fn tag_update() {
    let pool = test_pool();
    let id = Tag::find_or_create(&pool, "draft-name").unwrap();
    let form = TagForm {
        name: "Final Name".to_string(),
        description: Some("What this tag covers".to_string()),
    };
    Tag::update(&pool, id, &form).unwrap();

    let tag = Tag::find_by_id(&pool, id).unwrap();
    assert_eq!(tag.name, "Final Name");
    assert_eq!(tag.slug, "final-name");
    assert_eq!(tag.description.as_deref(), Some("What this tag covers"));
}

#[test]
fn tag_counts_published_posts_only() {
    let pool = test_pool();
    Tag::find_or_create(&pool, "rust").unwrap();
    let mut published = post_data("Pub", "pub", "published");
    published.tags = vec!["rust".to_string()];
    Post::create(&pool, &published).unwrap();
    let mut draft = post_data("Dr", "dr", "draft");
    draft.tags = vec!["rust".to_string()];
    Post::create(&pool, &draft).unwrap();

    let summaries = Tag::list_with_counts(&pool, None, "name", false, 50, 0);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].post_count, 1, "the draft does not count");

    // The raw usage count, which guards deletion, sees every status
    assert_eq!(Tag::post_count(&pool, "rust"), 2);
}

#[test]
fn tag_search_and_sort() {
    let pool = test_pool();
    for name in ["alpha", "beta", "alphabet"] {
        Tag::find_or_create(&pool, name).unwrap();
    }

    let hits = Tag::list_with_counts(&pool, Some("alpha"), "name", false, 50, 0);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].name, "alpha");
    assert_eq!(hits[1].name, "alphabet");

    let reversed = Tag::list_with_counts(&pool, Some("alpha"), "name", true, 50, 0);
    assert_eq!(reversed[0].name, "alphabet");

    assert_eq!(Tag::count(&pool, Some("alpha")), 2);
    assert_eq!(Tag::count(&pool, None), 3);
}

#[test]
fn tag_delete_refused_while_used() {
    let pool = test_pool();
    let id = Tag::find_or_create(&pool, "busy").unwrap();
    let mut p = post_data("Uses busy", "uses-busy", "draft");
    p.tags = vec!["busy".to_string()];
    let post_id = Post::create(&pool, &p).unwrap();

    assert_eq!(
        Tag::delete(&pool, id),
        Err("Cannot delete a tag that is still used by posts".to_string())
    );

    Post::delete(&pool, post_id).unwrap();
    Tag::delete(&pool, id).unwrap();
    assert!(Tag::find_by_id(&pool, id).is_none());
    assert_eq!(Tag::delete(&pool, id), Err("Tag not found".to_string()));
}

// ═══════════════════════════════════════════════════════════
// Categories
// ═══════════════════════════════════════════════════════════

#[test]
fn categories_seeded_with_built_ins() {
    let pool = test_pool();
    let all = Category::list(&pool);
    assert_eq!(all.len(), 13);
    assert!(all.iter().all(|c| c.built_in));

    let other = Category::find_by_name(&pool, "Other").unwrap();
    assert_eq!(other.slug, "other");
    assert!(Category::find_by_name(&pool, "Technology").is_some());
}

#[test]
fn category_built_ins_are_protected() {
    let pool = test_pool();
    let tech = Category::find_by_name(&pool, "Technology").unwrap();
    let form = CategoryForm { name: "Tech".to_string(), description: None };
    assert_eq!(
        Category::update(&pool, tech.id, &form),
        Err("Built-in categories cannot be edited".to_string())
    );
    assert_eq!(
        Category::delete(&pool, tech.id),
        Err("Built-in categories cannot be deleted".to_string())
    );
}

#[test]
fn category_custom_lifecycle() {
    let pool = test_pool();
    let form = CategoryForm {
        name: "Gardening".to_string(),
        description: Some("Plants and soil".to_string()),
    };
    let id = Category::create(&pool, &form).unwrap();
    assert!(!Category::find_by_id(&pool, id).unwrap().built_in);

    let mut p = post_data("Soil", "soil", "published");
    p.category = "Gardening".to_string();
    let post_id = Post::create(&pool, &p).unwrap();

    // Renaming a category moves the posts that point at the old name
    let renamed = CategoryForm { name: "Horticulture".to_string(), description: None };
    Category::update(&pool, id, &renamed).unwrap();
    assert_eq!(Post::find_by_id(&pool, post_id).unwrap().category, "Horticulture");

    assert_eq!(
        Category::delete(&pool, id),
        Err("Cannot delete a category that still has posts".to_string())
    );
    Post::delete(&pool, post_id).unwrap();
    Category::delete(&pool, id).unwrap();
    assert!(Category::find_by_id(&pool, id).is_none());
}

#[test]
fn category_counts_published_posts_only() {
    let pool = test_pool();
    let mut pub_post = post_data("T1", "t1", "published");
    pub_post.category = "Science".to_string();
    Post::create(&pool, &pub_post).unwrap();
    let mut draft = post_data("T2", "t2", "draft");
    draft.category = "Science".to_string();
    Post::create(&pool, &draft).unwrap();

    let science = Category::list_with_counts(&pool)
        .into_iter()
        .find(|c| c.name == "Science")
        .unwrap();
    assert_eq!(science.post_count, 1);
    assert_eq!(Category::post_count(&pool, "Science"), 2);
}

#[test]
fn category_create_validation() {
    let pool = test_pool();
    assert_eq!(
        Category::create(&pool, &CategoryForm { name: "  ".to_string(), description: None }),
        Err("Category name is required".to_string())
    );
}

// ═══════════════════════════════════════════════════════════
// Security: passwords and sessions
// ═══════════════════════════════════════════════════════════

#[test]
fn password_verify_rejects_wrong_password() {
    let hash = fast_hash("correct");
    assert!(auth::verify_password("correct", &hash));
    assert!(!auth::verify_password("wrong", &hash));
    assert!(!auth::verify_password("correct", "not-a-bcrypt-hash"));
}

#[test]
fn hash_ip_is_stable_hex() {
    let a = auth::hash_ip("203.0.113.9");
    let b = auth::hash_ip("203.0.113.9");
    let c = auth::hash_ip("203.0.113.10");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
}

#[test]
fn session_create_and_resolve() {
    let pool = test_pool();
    let admin = User::find_by_login(&pool, "admin").unwrap();
    let session = auth::create_session(&pool, admin.id, Some("10.0.0.1"), Some("test-agent")).unwrap();

    let resolved = User::find_by_session(&pool, &session).unwrap();
    assert_eq!(resolved.id, admin.id);
    assert!(User::find_by_session(&pool, "bogus-session").is_none());

    auth::destroy_session(&pool, &session).unwrap();
    assert!(User::find_by_session(&pool, &session).is_none());
}

#[test]
fn session_expiry_and_purge() {
    let pool = test_pool();
    let admin = User::find_by_login(&pool, "admin").unwrap();
    let valid = auth::create_session(&pool, admin.id, None, None).unwrap();

    let now = Utc::now().naive_utc();
    {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ('stale', ?1, ?2, ?3)",
            rusqlite::params![admin.id, now - Duration::hours(2), now - Duration::hours(1)],
        )
        .unwrap();
    }

    assert!(User::find_by_session(&pool, "stale").is_none());
    assert_eq!(auth::purge_expired_sessions(&pool).unwrap(), 1);
    assert!(User::find_by_session(&pool, &valid).is_some());
}

// ═══════════════════════════════════════════════════════════
// Rate limiting
// ═══════════════════════════════════════════════════════════

#[test]
fn rate_limiter_blocks_over_limit() {
    let limiter = RateLimiter::new();
    let window = std::time::Duration::from_secs(60);
    for _ in 0..3 {
        assert!(limiter.check_and_record("login:abc", 3, window));
    }
    assert!(!limiter.check_and_record("login:abc", 3, window));

    // Another key is an independent bucket
    assert!(limiter.check_and_record("login:def", 3, window));
}

#[test]
fn rate_limiter_sweep_clears_stale_keys() {
    let limiter = RateLimiter::new();
    let window = std::time::Duration::from_secs(60);
    assert!(limiter.check_and_record("comment:x", 1, window));
    assert!(!limiter.check_and_record("comment:x", 1, window));

    limiter.sweep(std::time::Duration::from_secs(0));
    assert!(limiter.check_and_record("comment:x", 1, window));
}

// ═══════════════════════════════════════════════════════════
// Traffic classification
// ═══════════════════════════════════════════════════════════

#[test]
fn user_agent_classification() {
    let chrome_win = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    assert_eq!(parse_user_agent(chrome_win), ("desktop", "Chrome", "Windows"));

    let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    assert_eq!(parse_user_agent(iphone), ("mobile", "Safari", "iOS"));

    let ipad = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    assert_eq!(parse_user_agent(ipad), ("tablet", "Safari", "iOS"));

    let android_chrome = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    assert_eq!(parse_user_agent(android_chrome), ("mobile", "Chrome", "Android"));

    let edge = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    assert_eq!(parse_user_agent(edge), ("desktop", "Edge", "Windows"));

    let firefox_linux = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    assert_eq!(parse_user_agent(firefox_linux), ("desktop", "Firefox", "Linux"));

    assert_eq!(parse_user_agent(""), ("unknown", "unknown", "unknown"));
    assert_eq!(parse_user_agent("weird"), ("desktop", "Other", "Other"));
}

#[test]
fn referrer_domains() {
    assert_eq!(extract_domain("https://news.ycombinator.com/item?id=1"), "news.ycombinator.com");
    assert_eq!(extract_domain("http://example.com:8080/path"), "example.com");
    // Anything that does not parse as a URL passes through untouched
    assert_eq!(extract_domain("not a url"), "not a url");
    assert_eq!(extract_domain(""), "");
}

#[test]
fn range_resolution() {
    let (from, to) = resolve_range("today", None, None).unwrap();
    assert_eq!(to - from, Duration::days(1));
    assert_eq!(from.time(), chrono::NaiveTime::MIN);

    let (from, to) = resolve_range("week", None, None).unwrap();
    assert_eq!(from.weekday(), chrono::Weekday::Mon);
    assert_eq!(to - from, Duration::days(7));

    let (from, _) = resolve_range("month", None, None).unwrap();
    assert_eq!(from.day(), 1);

    let (from, to) = resolve_range("last30days", None, None).unwrap();
    assert_eq!(to - from, Duration::days(30));

    // Unrecognised filters fall back to the last seven days
    let (from, to) = resolve_range("bogus", None, None).unwrap();
    assert_eq!(to - from, Duration::days(7));
}

#[test]
fn custom_range_needs_valid_bounds() {
    let (from, to) = resolve_range("custom", Some("2025-01-01"), Some("2025-01-31")).unwrap();
    assert_eq!(from, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    // A bare end date covers that whole day
    assert_eq!(to, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());

    assert!(resolve_range("custom", Some("2025-01-01"), None).is_none());
    assert!(resolve_range("custom", None, Some("2025-01-31")).is_none());
    assert!(resolve_range("custom", Some("2025-02-01"), Some("2025-01-01")).is_none());
    assert!(resolve_range("custom", Some("garbage"), Some("2025-01-31")).is_none());
}

// ═══════════════════════════════════════════════════════════
// Analytics
// ═══════════════════════════════════════════════════════════

#[test]
fn pageview_totals_and_unique_visitors() {
    let pool = test_pool();
    PageView::record(&pool, &page_view("/blog/a", Some("s1"), "ip1")).unwrap();
    PageView::record(&pool, &page_view("/blog/a", Some("s1"), "ip1")).unwrap();
    PageView::record(&pool, &page_view("/blog/b", Some("s2"), "ip1")).unwrap();
    // Without a session key the hashed IP stands in as the visitor identity
    PageView::record(&pool, &page_view("/blog/b", None, "ip9")).unwrap();
    PageView::record(&pool, &page_view("/blog/b", Some(""), "ip9")).unwrap();

    let (from, to) = window();
    assert_eq!(PageView::total_views(&pool, &from, &to), 5);
    assert_eq!(PageView::unique_visitors(&pool, &from, &to), 3);
}

#[test]
fn pageview_breakdowns_and_percentages() {
    let pool = test_pool();
    for device in ["desktop", "desktop", "mobile", "tablet"] {
        let mut v = page_view("/", Some("s"), "ip");
        v.device = Some(device.to_string());
        PageView::record(&pool, &v).unwrap();
    }

    let (from, to) = window();
    let breakdown = PageView::device_breakdown(&pool, &from, &to);
    assert_eq!(breakdown.len(), 3);
    assert_eq!(breakdown[0].label, "desktop");
    assert_eq!(breakdown[0].count, 2);
    assert_eq!(breakdown[0].percentage, 50.0);
    let total: f64 = breakdown.iter().map(|b| b.percentage).sum();
    assert!((total - 100.0).abs() < 0.2);
}

#[test]
fn pageview_unknown_and_direct_labels() {
    let pool = test_pool();
    let mut v = page_view("/", Some("s"), "ip");
    v.device = None;
    v.browser = Some(String::new());
    PageView::record(&pool, &v).unwrap();

    let (from, to) = window();
    assert_eq!(PageView::device_breakdown(&pool, &from, &to)[0].label, "Unknown");
    assert_eq!(PageView::browser_breakdown(&pool, &from, &to)[0].label, "Unknown");
    assert_eq!(PageView::os_breakdown(&pool, &from, &to)[0].label, "Linux");
    assert_eq!(PageView::top_referrers(&pool, &from, &to, 10)[0].label, "Direct");
}

#[test]
fn pageview_top_pages_and_referrers() {
    let pool = test_pool();
    for (path, referrer) in [
        ("/blog/a", Some("news.ycombinator.com")),
        ("/blog/a", Some("news.ycombinator.com")),
        ("/blog/b", Some("google.com")),
        ("/blog/b", None),
    ] {
        let mut v = page_view(path, Some("s"), "ip");
        v.referrer = referrer.map(str::to_string);
        PageView::record(&pool, &v).unwrap();
    }

    let (from, to) = window();
    let pages = PageView::top_pages(&pool, &from, &to, 10);
    assert_eq!(pages[0].label, "/blog/a");
    assert_eq!(pages[0].count, 2);

    let refs = PageView::top_referrers(&pool, &from, &to, 10);
    assert_eq!(refs[0].label, "news.ycombinator.com");
    assert_eq!(refs[0].count, 2);
    assert!(refs.iter().any(|r| r.label == "Direct"));
}

#[test]
fn pageview_daily_and_per_post() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("Tracked", "tracked", "published")).unwrap();

    for session in ["s1", "s2"] {
        let mut v = page_view("/blog/tracked", Some(session), session);
        v.post_id = Some(post_id);
        v.referrer = Some("example.org".to_string());
        PageView::record(&pool, &v).unwrap();
    }
    PageView::record(&pool, &page_view("/other", Some("s3"), "ip3")).unwrap();

    let (from, to) = window();
    let daily_all = PageView::daily_views(&pool, None, &from, &to);
    assert_eq!(daily_all.iter().map(|d| d.count).sum::<i64>(), 3);
    let daily_post = PageView::daily_views(&pool, Some(post_id), &from, &to);
    assert_eq!(daily_post.iter().map(|d| d.count).sum::<i64>(), 2);
    let visitors = PageView::daily_visitors(&pool, &from, &to);
    assert_eq!(visitors.iter().map(|d| d.count).sum::<i64>(), 3);

    let popular = PageView::popular_posts(&pool, &from, &to, 5);
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0].post_id, post_id);
    assert_eq!(popular[0].title, "Tracked");
    assert_eq!(popular[0].views, 2);

    assert_eq!(PageView::post_total_views(&pool, post_id, &from, &to), 2);
    assert_eq!(PageView::post_unique_visitors(&pool, post_id, &from, &to), 2);
    assert_eq!(PageView::post_referrers(&pool, post_id, &from, &to, 5)[0].label, "example.org");
    let devices = PageView::post_device_breakdown(&pool, post_id, &from, &to);
    assert_eq!(devices[0].label, "desktop");
    assert_eq!(devices[0].count, 2);
}

#[test]
fn prune_removes_only_old_rows() {
    let pool = test_pool();
    PageView::record(&pool, &page_view("/fresh", Some("s"), "ip")).unwrap();
    {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO page_views (path, ip_hash, created_at)
             VALUES ('/old', 'ip', datetime('now', '-120 days'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO events (event_type, created_at)
             VALUES ('click', datetime('now', '-120 days'))",
            [],
        )
        .unwrap();
    }

    assert_eq!(PageView::prune(&pool, 90).unwrap(), 2);

    let (from, to) = window();
    assert_eq!(PageView::total_views(&pool, &from, &to), 1);
    // A second prune finds nothing
    assert_eq!(PageView::prune(&pool, 90).unwrap(), 0);
}

#[test]
fn event_record_validates_type() {
    let pool = test_pool();
    assert_eq!(
        Event::record(&pool, &event("   ", None, None, None)),
        Err("Event type is required".to_string())
    );
    Event::record(&pool, &event("click", None, None, None)).unwrap();
}

#[test]
fn event_time_on_page_average() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("Read", "read", "published")).unwrap();

    Event::record(&pool, &event("engagement", Some("timeOnPage"), Some(30.0), Some(post_id))).unwrap();
    Event::record(&pool, &event("engagement", Some("timeOnPage"), Some(90.0), Some(post_id))).unwrap();
    // Other engagement categories never enter the average
    Event::record(&pool, &event("engagement", Some("scroll"), Some(500.0), Some(post_id))).unwrap();
    Event::record(&pool, &event("click", None, None, Some(post_id))).unwrap();

    let (from, to) = window();
    assert_eq!(Event::avg_time_on_page(&pool, post_id, &from, &to), Some(60));
    assert_eq!(Event::avg_time_on_page(&pool, 999, &from, &to), None);

    let counts = Event::counts_by_type(&pool, &from, &to, 10);
    assert_eq!(counts[0].label, "engagement");
    assert_eq!(counts[0].count, 3);
    assert!(counts.iter().any(|c| c.label == "click"));
}

// ═══════════════════════════════════════════════════════════
// Dashboard
// ═══════════════════════════════════════════════════════════

#[test]
fn dashboard_stats_counts_and_trends() {
    let pool = test_pool();
    Post::create(&pool, &post_data("One", "one", "published")).unwrap();
    Post::create(&pool, &post_data("Two", "two", "draft")).unwrap();
    let mut scheduled = post_data("Later", "later", "scheduled");
    scheduled.publish_date = Some(Utc::now().naive_utc() + Duration::days(3));
    Post::create(&pool, &scheduled).unwrap();
    let post_id = Post::find_by_slug(&pool, "one").unwrap().id;
    Comment::create(&pool, &comment_form(post_id, "Ann", "Hi"), true).unwrap();

    let stats = Dashboard::stats(&pool, "today");
    assert_eq!(stats.posts.total, 3);
    assert_eq!(stats.posts.new_count, 3);
    assert_eq!(stats.posts.trend, 100.0, "nothing existed yesterday");
    assert_eq!(stats.users.total, 1);
    assert_eq!(stats.comments.total, 1);
    assert_eq!(stats.scheduled.total, 1);
    assert!(stats.read_time.minutes >= 0.0);
}

#[test]
fn dashboard_read_time_estimate() {
    let pool = test_pool();
    let mut data = post_data("Long", "long", "published");
    data.content = "word ".repeat(400).trim_end().to_string();
    Post::create(&pool, &data).unwrap();

    // 400 words at 200 wpm
    let stats = Dashboard::stats(&pool, "week");
    assert_eq!(stats.read_time.minutes, 2.0);
}

#[test]
fn dashboard_recent_activity_merges_sources() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("Fresh", "fresh", "published")).unwrap();
    User::create(&pool, "newbie", "n@example.com", &fast_hash("pw"), "author").unwrap();
    Comment::create(&pool, &comment_form(post_id, "Ann", "Hello there"), true).unwrap();

    let feed = Dashboard::recent_activity(&pool, 10);
    assert_eq!(feed.len(), 4, "post + comment + two users, seeded admin included");
    assert!(feed.iter().any(|e| e.kind == "post" && e.title == "Fresh"));
    assert!(feed.iter().any(|e| e.kind == "user" && e.title == "newbie"));
    assert!(feed.iter().any(|e| e.kind == "comment" && e.title == "Ann"));

    assert_eq!(Dashboard::recent_activity(&pool, 2).len(), 2);
}

#[test]
fn dashboard_notifications_feed() {
    let pool = test_pool();
    let post_id = Post::create(&pool, &post_data("Debated", "debated", "published")).unwrap();
    Comment::create(&pool, &comment_form(post_id, "Ann", "Needs a look"), false).unwrap();

    let mut today = post_data("Goes out", "goes-out", "scheduled");
    today.publish_date = Some(Utc::now().naive_utc().date().and_hms_opt(12, 0, 0).unwrap());
    let today_id = Post::create(&pool, &today).unwrap();

    let mut later = post_data("Much later", "much-later", "scheduled");
    later.publish_date = Some(Utc::now().naive_utc() + Duration::days(5));
    Post::create(&pool, &later).unwrap();

    let notes = Dashboard::notifications(&pool, 10);
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().any(|n| n.kind == "comment"
        && n.title.contains("Debated")
        && n.link == "/admin/comments?status=pending"));
    assert!(notes.iter().any(|n| n.kind == "scheduled-post"
        && n.title.contains("Goes out")
        && n.link == format!("/admin/posts/{}", today_id)));
}

// ═══════════════════════════════════════════════════════════
// API routes
// ═══════════════════════════════════════════════════════════

/// Build a client against the API surface. File serving and background
/// tasks stay out; they touch the filesystem and wall clock.
fn test_client() -> (Client, DbPool) {
    let pool = test_pool();
    let rocket = rocket::build()
        .manage(pool.clone())
        .manage(UploadRoots::from_env())
        .manage(Arc::new(RateLimiter::new()))
        .mount("/", crate::routes::api::root_routes())
        .mount("/api", crate::routes::api::routes())
        .mount("/api/auth", crate::routes::auth::routes())
        .mount("/admin/api", crate::routes::admin::routes())
        .register(
            "/",
            catchers![
                crate::unauthorized,
                crate::forbidden,
                crate::not_found,
                crate::unprocessable,
                crate::server_error
            ],
        );
    let client = Client::tracked(rocket).expect("valid rocket instance");
    (client, pool)
}

fn login(client: &Client, email: &str, password: &str) -> Value {
    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(format!(r#"{{"email": "{}", "password": "{}"}}"#, email, password))
        .dispatch();
    response.into_json::<Value>().unwrap()
}

#[test]
fn api_root_banner() {
    let (client, _pool) = test_client();
    let response = client.get("/").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "API is running...");
}

#[test]
fn api_health_reports_database() {
    let (client, _pool) = test_client();
    let response = client.get("/api/health").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}

#[test]
fn api_unknown_route_is_json_404() {
    let (client, _pool) = test_client();
    let response = client.get("/api/no-such-thing").dispatch();
    assert_eq!(response.status(), Status::NotFound);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Resource not found");
}

#[test]
fn api_guarded_routes_reject_anonymous() {
    let (client, _pool) = test_client();

    let me = client.get("/api/auth/me").dispatch();
    assert_eq!(me.status(), Status::Unauthorized);
    let body = me.into_json::<Value>().unwrap();
    assert_eq!(body["message"], "Not authorized to access this resource");

    let stats = client.get("/admin/api/stats/dashboard").dispatch();
    assert_eq!(stats.status(), Status::Unauthorized);
}

#[test]
fn api_login_validates_credentials() {
    let (client, _pool) = test_client();

    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body("{}")
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Please provide email and password");

    let body = login(&client, "admin@test.local", "wrong");
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid credentials");

    let body = login(&client, "ghost@test.local", "admin");
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid credentials");
}

#[test]
fn api_malformed_json_body() {
    let (client, _pool) = test_client();
    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body("[1, 2, 3]")
        .dispatch();
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["message"], "Malformed request body");
}

#[test]
fn api_login_and_session_flow() {
    let (client, _pool) = test_client();

    let body = login(&client, "admin@test.local", "admin");
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "admin");

    // The private session cookie now rides along on every request
    let me = client.get("/api/auth/me").dispatch();
    assert_eq!(me.status(), Status::Ok);
    let body = me.into_json::<Value>().unwrap();
    assert_eq!(body["data"]["username"], "admin");
    assert!(body["data"].get("password_hash").is_none());

    let stats = client.get("/admin/api/stats/dashboard").dispatch();
    assert_eq!(stats.status(), Status::Ok);
    let body = stats.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);

    let logout = client.post("/api/auth/logout").dispatch();
    assert_eq!(logout.status(), Status::Ok);
    let me = client.get("/api/auth/me").dispatch();
    assert_eq!(me.status(), Status::Unauthorized);
}

#[test]
fn api_settings_require_admin_role() {
    let (client, pool) = test_client();
    User::create(&pool, "writer", "writer@test.local", &fast_hash("pw"), "author").unwrap();

    let body = login(&client, "writer@test.local", "pw");
    assert_eq!(body["success"], true);

    let response = client.get("/admin/api/settings").dispatch();
    assert_eq!(response.status(), Status::Forbidden);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["message"], "Forbidden");
}

#[test]
fn api_settings_roundtrip() {
    let (client, _pool) = test_client();
    login(&client, "admin@test.local", "admin");

    let response = client.get("/admin/api/settings").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["data"]["site_name"], "Inkpot");

    let response = client
        .put("/admin/api/settings")
        .header(ContentType::JSON)
        .body(r#"{"site_name": "My Blog", "posts_per_page": "12", "unknown_key": "dropped"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Settings saved successfully");
    assert_eq!(body["data"]["site_name"], "My Blog");
    assert_eq!(body["data"]["posts_per_page"], "12");
    assert!(body["data"].get("unknown_key").is_none());

    let response = client
        .put("/admin/api/settings")
        .header(ContentType::JSON)
        .body(r#"{"posts_per_page": "many"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "posts_per_page must be a number");

    let response = client
        .put("/admin/api/settings")
        .header(ContentType::JSON)
        .body(r#"{"unknown_key": "x"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["message"], "No valid settings provided");
}

#[test]
fn api_public_posts_hide_unpublished() {
    let (client, pool) = test_client();
    Post::create(&pool, &post_data("Visible", "visible", "published")).unwrap();
    Post::create(&pool, &post_data("Hidden", "hidden", "draft")).unwrap();
    let mut scheduled = post_data("Queued", "queued", "scheduled");
    scheduled.publish_date = Some(Utc::now().naive_utc() + Duration::days(1));
    Post::create(&pool, &scheduled).unwrap();

    let response = client.get("/api/posts").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["slug"], "visible");
    assert_eq!(body["pagination"]["total"], 1);
}

#[test]
fn api_comment_submission() {
    let (client, pool) = test_client();
    let post_id = Post::create(&pool, &post_data("Open", "open", "published")).unwrap();

    let response = client
        .post("/api/comments")
        .header(ContentType::JSON)
        .body(r#"{"post_id": 999, "author_name": "Ann", "content": "Hi"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Post not found");

    let response = client
        .post("/api/comments")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"post_id": {}, "author_name": "Bot", "content": "Hi", "honeypot": "filled"}}"#,
            post_id
        ))
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["message"], "Spam detected");

    // Default moderation policy holds new comments for review
    let response = client
        .post("/api/comments")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"post_id": {}, "author_name": "Ann", "content": "Nice post"}}"#,
            post_id
        ))
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Comment submitted for moderation");
    assert!(Comment::for_post(&pool, post_id).is_empty());
    assert_eq!(Comment::count(&pool, Some(false)), 1);
}

#[test]
fn api_pageview_capture() {
    let (client, pool) = test_client();
    let post_id = Post::create(&pool, &post_data("Tracked", "tracked", "published")).unwrap();

    let response = client
        .post("/api/analytics/pageview")
        .header(ContentType::JSON)
        .body(r#"{"page": "blog", "path": "/blog/x"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing required fields: page, path, session_key");

    let response = client
        .post("/api/analytics/pageview")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"page": "blog", "path": "/blog/tracked", "session_key": "s-1", "post_id": {}}}"#,
            post_id
        ))
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);

    // A tracked view also bumps the post's own counter
    assert_eq!(Post::find_by_id(&pool, post_id).unwrap().views, 1);
    let (from, to) = window();
    assert_eq!(PageView::total_views(&pool, &from, &to), 1);
}

#[test]
fn api_event_capture() {
    let (client, pool) = test_client();

    let response = client
        .post("/api/analytics/event")
        .header(ContentType::JSON)
        .body(r#"{"category": "nav"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing required field: event_type");

    let response = client
        .post("/api/analytics/event")
        .header(ContentType::JSON)
        .body(r#"{"event_type": "click", "category": "nav", "label": "header"}"#)
        .dispatch();
    let body = response.into_json::<Value>().unwrap();
    assert_eq!(body["success"], true);

    let (from, to) = window();
    let counts = Event::counts_by_type(&pool, &from, &to, 10);
    assert_eq!(counts[0].label, "click");
    assert_eq!(counts[0].count, 1);
}
