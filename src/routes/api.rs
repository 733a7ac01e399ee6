use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analytics::{extract_domain, parse_user_agent};
use crate::db::DbPool;
use crate::models::analytics::{Event, NewEvent, NewPageView, PageView};
use crate::models::category::Category;
use crate::models::comment::{Comment, CommentForm};
use crate::models::post::Post;
use crate::models::settings::Setting;
use crate::rate_limit::RateLimiter;
use crate::security::auth::{self, AdminUser, ClientIp, UserAgent};

// ── Service status ──────────────────────────────────────

#[get("/")]
pub fn index() -> Json<Value> {
    Json(json!({ "success": true, "message": "API is running..." }))
}

/// Liveness probe. Reports the database as disconnected rather than
/// failing, so load balancers can still read the status.
#[get("/health")]
pub fn health(pool: &State<DbPool>) -> Json<Value> {
    let database = match pool.get() {
        Ok(conn) => match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "database": database,
    }))
}

// ── Posts ───────────────────────────────────────────────

/// Public post listing with pagination and category/tag/search filters.
/// Drafts and scheduled posts stay hidden unless an admin session asks.
#[get("/posts?<page>&<limit>&<category>&<tag>&<search>")]
pub fn posts_list(
    pool: &State<DbPool>,
    admin: Option<AdminUser>,
    page: Option<i64>,
    limit: Option<i64>,
    category: Option<String>,
    tag: Option<String>,
    search: Option<String>,
) -> Json<Value> {
    let limit = limit.unwrap_or(10).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let status = if admin.is_some() {
        None
    } else {
        Some("published")
    };

    let posts = Post::list(
        pool,
        status,
        category.as_deref(),
        tag.as_deref(),
        search.as_deref(),
        limit,
        offset,
    );
    let total = Post::count(
        pool,
        status,
        category.as_deref(),
        tag.as_deref(),
        search.as_deref(),
    );
    let total_pages = (total as f64 / limit as f64).ceil() as i64;

    Json(json!({
        "success": true,
        "count": posts.len(),
        "pagination": {
            "page": page,
            "limit": limit,
            "total_pages": total_pages,
            "total": total,
        },
        "data": posts,
    }))
}

#[get("/posts/<id>")]
pub fn post_detail(pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    let post = Post::find_by_id(pool, id)?;
    Some(Json(json!({ "success": true, "data": post })))
}

#[get("/posts/slug/<slug>")]
pub fn post_by_slug(pool: &State<DbPool>, slug: &str) -> Option<Json<Value>> {
    let post = Post::find_by_slug(pool, slug)?;
    Some(Json(json!({ "success": true, "data": post })))
}

// ── Comments ────────────────────────────────────────────

#[get("/comments/post/<post_id>")]
pub fn comments_for_post(pool: &State<DbPool>, post_id: i64) -> Json<Value> {
    let comments = Comment::for_post(pool, post_id);
    Json(json!({
        "success": true,
        "count": comments.len(),
        "data": comments,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CommentSubmit {
    pub post_id: i64,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub honeypot: Option<String>,
}

#[post("/comments", format = "json", data = "<form>")]
pub fn comment_submit(
    pool: &State<DbPool>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    form: Json<CommentSubmit>,
) -> Json<Value> {
    if !Setting::get_bool(pool, "comments_enabled") {
        return failure("Comments are disabled");
    }

    if Post::find_by_id(pool, form.post_id).is_none() {
        return failure("Post not found");
    }

    let rate_key = format!("comment:{}", auth::hash_ip(&client_ip.0));
    let max_attempts = Setting::get_i64_or(pool, "comments_rate_limit", 5).max(1) as u64;
    let window = std::time::Duration::from_secs(15 * 60);
    if !limiter.check_and_record(&rate_key, max_attempts, window) {
        return failure("Too many comments. Please wait before posting again.");
    }

    let auto_approve = Setting::get_or(pool, "comments_moderation", "manual") == "auto-approve";

    let comment_form = CommentForm {
        post_id: form.post_id,
        author_name: form.author_name.clone(),
        author_email: form.author_email.clone(),
        content: form.content.clone(),
        honeypot: form.honeypot.clone(),
    };

    match Comment::create(pool, &comment_form, auto_approve) {
        Ok(id) => Json(json!({
            "success": true,
            "id": id,
            "message": if auto_approve {
                "Comment posted"
            } else {
                "Comment submitted for moderation"
            },
        })),
        Err(e) => failure(&e),
    }
}

// ── Categories ──────────────────────────────────────────

#[get("/categories")]
pub fn categories_list(pool: &State<DbPool>) -> Json<Value> {
    let categories = Category::list_with_counts(pool);
    Json(json!({
        "success": true,
        "count": categories.len(),
        "data": categories,
    }))
}

// ── Analytics capture ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PageViewSubmit {
    pub page: Option<String>,
    pub path: Option<String>,
    pub post_id: Option<i64>,
    pub session_key: Option<String>,
    pub referrer: Option<String>,
}

#[post("/analytics/pageview", format = "json", data = "<form>")]
pub fn track_pageview(
    pool: &State<DbPool>,
    client_ip: ClientIp,
    agent: UserAgent,
    form: Json<PageViewSubmit>,
) -> Json<Value> {
    let form = form.into_inner();

    let (page, path, session_key) = match (
        non_empty(form.page),
        non_empty(form.path),
        non_empty(form.session_key),
    ) {
        (Some(page), Some(path), Some(key)) => (page, path, key),
        _ => return failure("Missing required fields: page, path, session_key"),
    };

    let ua = agent.0.unwrap_or_default();
    let (device, browser, os) = parse_user_agent(&ua);

    // Referrers are stored by domain; an absent one reads as direct traffic.
    let referrer = form
        .referrer
        .as_deref()
        .map(extract_domain)
        .filter(|d| !d.is_empty());

    let view = NewPageView {
        page: Some(page),
        path,
        post_id: form.post_id,
        session_key: Some(session_key),
        referrer,
        user_agent: if ua.is_empty() { None } else { Some(ua) },
        device: Some(device.to_string()),
        browser: Some(browser.to_string()),
        os: Some(os.to_string()),
        ip_hash: auth::hash_ip(&client_ip.0),
    };

    if let Err(e) = PageView::record(pool, &view) {
        log::error!("failed to record page view: {}", e);
        return failure("Failed to record page view");
    }

    // A view of a post also bumps its denormalized counter; a failure
    // there loses one count, never the page view itself.
    if let Some(post_id) = form.post_id {
        if let Err(e) = Post::increment_views(pool, post_id) {
            log::warn!("failed to bump view count for post {}: {}", post_id, e);
        }
    }

    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
pub struct EventSubmit {
    pub event_type: Option<String>,
    pub category: Option<String>,
    pub action: Option<String>,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub page: Option<String>,
    pub path: Option<String>,
    pub post_id: Option<i64>,
    pub session_key: Option<String>,
}

#[post("/analytics/event", format = "json", data = "<form>")]
pub fn track_event(pool: &State<DbPool>, form: Json<EventSubmit>) -> Json<Value> {
    let form = form.into_inner();

    let event_type = match non_empty(form.event_type) {
        Some(t) => t,
        None => return failure("Missing required field: event_type"),
    };

    let event = NewEvent {
        event_type,
        category: form.category,
        action: form.action,
        label: form.label,
        value: form.value,
        page: form.page,
        path: form.path,
        post_id: form.post_id,
        session_key: form.session_key,
    };

    if let Err(e) = Event::record(pool, &event) {
        log::error!("failed to record event: {}", e);
        return failure("Failed to record event");
    }

    Json(json!({ "success": true }))
}

// ── Helpers ─────────────────────────────────────────────

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "message": message }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        health,
        posts_list,
        post_detail,
        post_by_slug,
        comments_for_post,
        comment_submit,
        categories_list,
        track_pageview,
        track_event,
    ]
}

pub fn root_routes() -> Vec<rocket::Route> {
    routes![index]
}
