use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::{is_allowed_image, max_upload_bytes, parse_publish_date, resolve_status, save_upload};
use crate::db::DbPool;
use crate::image_paths::{self, UploadRoots};
use crate::models::category::Category;
use crate::models::post::{Post, PostData};
use crate::models::tag::Tag;
use crate::models::user::User;
use crate::reconcile::{self, ImageRef, ReconciliationResult};
use crate::security::auth::AuthorUser;

// ── Listing ─────────────────────────────────────────────

#[get("/posts?<status>&<category>&<search>&<page>&<limit>")]
pub fn posts_list(
    _admin: AuthorUser,
    pool: &State<DbPool>,
    status: Option<String>,
    category: Option<String>,
    search: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
) -> Json<Value> {
    let limit = limit.unwrap_or(10).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let posts = Post::list(
        pool,
        status.as_deref(),
        category.as_deref(),
        None,
        search.as_deref(),
        limit,
        offset,
    );
    let total = Post::count(
        pool,
        status.as_deref(),
        category.as_deref(),
        None,
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
pub fn post_detail(_admin: AuthorUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    let post = Post::find_by_id(pool, id)?;
    Some(Json(json!({ "success": true, "data": post })))
}

// ── Create / update ─────────────────────────────────────

/// Shared multipart payload for create and update. Everything is
/// optional so the update path can tell "absent" from "set to empty".
#[derive(FromForm)]
pub struct PostFormData<'f> {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub status: Option<String>,
    pub publish_date: Option<String>,
    pub featured: Option<bool>,
    pub thumbnail_index: Option<String>,
    pub existing_images: Option<String>,
    pub images: Option<Vec<TempFile<'f>>>,
}

#[post("/posts", data = "<form>")]
pub async fn post_create(
    admin: AuthorUser,
    pool: &State<DbPool>,
    roots: &State<UploadRoots>,
    form: Form<PostFormData<'_>>,
) -> Json<Value> {
    let mut form = form.into_inner();

    let title = match form.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return failure("Please add a title"),
    };
    if title.chars().count() > 100 {
        return failure("Title cannot be more than 100 characters");
    }
    let content = match form.content.as_deref() {
        Some(c) if !c.trim().is_empty() => c.to_string(),
        _ => return failure("Please add content"),
    };
    let category = match form.category.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => match Category::find_by_name(pool, name) {
            Some(c) => c.name,
            None => return failure("Invalid category"),
        },
        _ => return failure("Please select a category"),
    };
    let requested = form.status.as_deref().unwrap_or("draft");
    if !matches!(requested, "draft" | "published" | "scheduled") {
        return failure("Invalid status");
    }
    if let Some(raw) = form.publish_date.as_deref().map(str::trim) {
        if !raw.is_empty() && parse_publish_date(raw).is_none() {
            return failure("Invalid publish date");
        }
    }
    let summary = match form.summary.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => {
            if s.chars().count() > 200 {
                return failure("Summary cannot be more than 200 characters");
            }
            s.to_string()
        }
        _ => Post::generate_summary(&content),
    };

    let uploaded = match store_uploads(form.images.as_mut(), pool, roots).await {
        Ok(names) => names,
        Err(resp) => return resp,
    };

    let outcome =
        reconcile::reconcile_create(&uploaded, &title, &content, form.thumbnail_index.as_deref());
    log_image_diagnostics(&outcome, roots);

    let tags = parse_tag_names(form.tags.as_deref());
    register_tags(pool, &tags);

    let status = resolve_status(requested, &form.publish_date);
    let publish_date = if status == "published" || status == "scheduled" {
        form.publish_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(parse_publish_date)
            .or_else(|| Some(chrono::Utc::now().naive_utc()))
    } else {
        None
    };

    let data = PostData {
        slug: Post::unique_slug(pool, &title, None),
        title,
        content,
        summary: Some(summary),
        category,
        tags,
        author_id: Some(admin.user.id),
        featured: form.featured.unwrap_or(false),
        status,
        publish_date,
        images: outcome.images,
        thumbnail: outcome.thumbnail,
    };

    match Post::create(pool, &data) {
        Ok(id) => {
            let post = Post::find_by_id(pool, id);
            Json(json!({
                "success": true,
                "message": "Post created successfully",
                "data": post,
            }))
        }
        Err(e) => {
            log::error!("failed to create post: {}", e);
            failure("Failed to create post")
        }
    }
}

/// Absent form fields keep their stored values, so clients can PUT only
/// what changed.
#[put("/posts/<id>", data = "<form>")]
pub async fn post_update(
    admin: AuthorUser,
    pool: &State<DbPool>,
    roots: &State<UploadRoots>,
    id: i64,
    form: Form<PostFormData<'_>>,
) -> Option<Json<Value>> {
    let stored = Post::find_by_id(pool, id)?;
    if !can_modify(&admin.user, &stored) {
        return Some(failure("User not authorized to update this post"));
    }
    let mut form = form.into_inner();

    let title = match form.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => {
            if t.chars().count() > 100 {
                return Some(failure("Title cannot be more than 100 characters"));
            }
            t.to_string()
        }
        Some(_) => return Some(failure("Please add a title")),
        None => stored.title.clone(),
    };
    let content = match form.content.as_deref() {
        Some(c) if !c.trim().is_empty() => c.to_string(),
        Some(_) => return Some(failure("Please add content")),
        None => stored.content.clone(),
    };
    let category = match form.category.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => match Category::find_by_name(pool, name) {
            Some(c) => c.name,
            None => return Some(failure("Invalid category")),
        },
        Some(_) => return Some(failure("Please select a category")),
        None => stored.category.clone(),
    };
    let requested = match form.status.as_deref() {
        Some(s) => {
            if !matches!(s, "draft" | "published" | "scheduled") {
                return Some(failure("Invalid status"));
            }
            s.to_string()
        }
        None => stored.status.clone(),
    };
    let submitted_date = match form.publish_date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match parse_publish_date(raw) {
            Some(dt) => Some(dt),
            None => return Some(failure("Invalid publish date")),
        },
        _ => None,
    };
    let summary = match form.summary.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => {
            if s.chars().count() > 200 {
                return Some(failure("Summary cannot be more than 200 characters"));
            }
            Some(s.to_string())
        }
        Some(_) => Some(Post::generate_summary(&content)),
        None => match stored.summary.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => stored.summary.clone(),
            _ => Some(Post::generate_summary(&content)),
        },
    };

    // The form can carry a revised image list (removals happen client
    // side); otherwise the update starts from the stored list.
    let existing: Vec<ImageRef> = match form.existing_images.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match serde_json::from_str(raw) {
            Ok(list) => list,
            Err(e) => {
                log::warn!("rejecting unparseable existing_images for post {}: {}", id, e);
                return Some(failure("Invalid existing_images payload"));
            }
        },
        _ => stored.images.clone(),
    };

    let uploaded = match store_uploads(form.images.as_mut(), pool, roots).await {
        Ok(names) => names,
        Err(resp) => return Some(resp),
    };

    let outcome = reconcile::reconcile_update(
        existing,
        stored.thumbnail.clone(),
        &uploaded,
        form.title.as_deref(),
        &stored.title,
        form.content.as_deref(),
        form.thumbnail_index.as_deref(),
    );
    log_image_diagnostics(&outcome, roots);

    let tags = match form.tags.as_deref() {
        Some(raw) => {
            let names = parse_tag_names(Some(raw));
            register_tags(pool, &names);
            names
        }
        None => stored.tags.clone(),
    };

    // A published status with a future date (submitted or stored) still
    // means scheduled.
    let effective_date = submitted_date.or(stored.publish_date);
    let status = match effective_date {
        Some(dt) if requested == "published" && dt > chrono::Utc::now().naive_utc() => {
            "scheduled".to_string()
        }
        _ => requested,
    };
    let publish_date = if status == "published" || status == "scheduled" {
        effective_date.or_else(|| Some(chrono::Utc::now().naive_utc()))
    } else {
        None
    };

    let slug = if title != stored.title {
        Post::unique_slug(pool, &title, Some(id))
    } else {
        stored.slug.clone()
    };

    let data = PostData {
        title,
        slug,
        content,
        summary,
        category,
        tags,
        author_id: stored.author_id,
        featured: form.featured.unwrap_or(stored.featured),
        status,
        publish_date,
        images: outcome.images,
        thumbnail: outcome.thumbnail,
    };

    match Post::update(pool, id, &data) {
        Ok(()) => {
            let post = Post::find_by_id(pool, id);
            Some(Json(json!({ "success": true, "data": post })))
        }
        Err(e) => {
            log::error!("failed to update post {}: {}", id, e);
            Some(failure("Failed to update post"))
        }
    }
}

/// Uploaded files stay on disk; only the row (and its comments) go.
#[delete("/posts/<id>")]
pub fn post_delete(admin: AuthorUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    let post = Post::find_by_id(pool, id)?;
    if !can_modify(&admin.user, &post) {
        return Some(failure("User not authorized to delete this post"));
    }

    match Post::delete(pool, id) {
        Ok(()) => {
            log::info!("deleted post {} ({})", id, post.slug);
            Some(Json(json!({ "success": true, "message": "Post deleted successfully" })))
        }
        Err(e) => {
            log::error!("failed to delete post {}: {}", id, e);
            Some(failure("Failed to delete post"))
        }
    }
}

// ── Helpers ─────────────────────────────────────────────

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "message": message }))
}

/// Authors touch only their own posts; admins touch everything.
fn can_modify(user: &User, post: &Post) -> bool {
    user.is_admin() || post.author_id == Some(user.id)
}

/// Persist every non-empty uploaded file, stopping at the first rejected
/// or failed one.
async fn store_uploads(
    files: Option<&mut Vec<TempFile<'_>>>,
    pool: &DbPool,
    roots: &UploadRoots,
) -> Result<Vec<String>, Json<Value>> {
    let mut stored = Vec::new();
    let files = match files {
        Some(f) => f,
        None => return Ok(stored),
    };
    let max_bytes = max_upload_bytes(pool);
    for file in files.iter_mut() {
        if file.len() == 0 {
            continue;
        }
        if file.len() > max_bytes {
            return Err(failure("File too large"));
        }
        if !is_allowed_image(file, pool) {
            return Err(failure("Only image files are allowed"));
        }
        match save_upload(file, roots).await {
            Some(name) => stored.push(name),
            None => return Err(failure("Failed to store uploaded image")),
        }
    }
    Ok(stored)
}

/// Reconciliation warnings and missing-file probes are advisory; they go
/// to the log and never fail the request.
fn log_image_diagnostics(outcome: &ReconciliationResult, roots: &UploadRoots) {
    for warning in &outcome.warnings {
        log::warn!("image reconciliation: {}", warning);
    }
    for image in &outcome.images {
        if !image_paths::check_exists(&image.url, roots).exists {
            log::warn!("image {} not found in the uploads roots", image.url);
        }
    }
}

/// Tag input arrives either as a JSON array (the editor UI) or a plain
/// comma-separated string. Both collapse to trimmed, deduplicated names.
pub(crate) fn parse_tag_names(raw: Option<&str>) -> Vec<String> {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Vec::new(),
    };
    let candidates: Vec<String> = match serde_json::from_str(raw) {
        Ok(list) => list,
        Err(_) => raw.split(',').map(str::to_string).collect(),
    };
    let mut names: Vec<String> = Vec::new();
    for candidate in candidates {
        let name = candidate.trim().to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Keep the tags table in sync with names used on posts.
fn register_tags(pool: &DbPool, names: &[String]) {
    for name in names {
        if let Err(e) = Tag::find_or_create(pool, name) {
            log::warn!("failed to register tag {}: {}", name, e);
        }
    }
}
