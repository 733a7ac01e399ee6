use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::models::comment::Comment;
use crate::security::auth::EditorUser;

/// Moderation queue. `status` filters to pending or approved; anything
/// else lists everything.
#[get("/comments?<status>&<page>&<limit>")]
pub fn comments_list(
    _admin: EditorUser,
    pool: &State<DbPool>,
    status: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
) -> Json<Value> {
    let approved = match status.as_deref() {
        Some("pending") => Some(false),
        Some("approved") => Some(true),
        _ => None,
    };

    let limit = limit.unwrap_or(10).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let comments = Comment::list(pool, approved, limit, offset);
    let total = Comment::count(pool, approved);
    let total_pages = (total as f64 / limit as f64).ceil() as i64;

    Json(json!({
        "success": true,
        "count": comments.len(),
        "pagination": {
            "page": page,
            "limit": limit,
            "total_pages": total_pages,
            "total": total,
        },
        "data": comments,
    }))
}

#[put("/comments/<id>/approve")]
pub fn comment_approve(_admin: EditorUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    Comment::find_by_id(pool, id)?;
    Some(moderate(pool, id, true))
}

#[put("/comments/<id>/unapprove")]
pub fn comment_unapprove(
    _admin: EditorUser,
    pool: &State<DbPool>,
    id: i64,
) -> Option<Json<Value>> {
    Comment::find_by_id(pool, id)?;
    Some(moderate(pool, id, false))
}

#[delete("/comments/<id>")]
pub fn comment_delete(_admin: EditorUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    Comment::find_by_id(pool, id)?;
    match Comment::delete(pool, id) {
        Ok(()) => Some(Json(json!({ "success": true, "data": {} }))),
        Err(e) => {
            log::error!("failed to delete comment {}: {}", id, e);
            Some(Json(json!({ "success": false, "message": "Failed to delete comment" })))
        }
    }
}

fn moderate(pool: &DbPool, id: i64, approved: bool) -> Json<Value> {
    match Comment::set_approved(pool, id, approved) {
        Ok(()) => {
            let comment = Comment::find_by_id(pool, id);
            Json(json!({ "success": true, "data": comment }))
        }
        Err(e) => {
            log::error!("failed to moderate comment {}: {}", id, e);
            Json(json!({ "success": false, "message": "Failed to update comment" }))
        }
    }
}
