use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::analytics::resolve_range;
use crate::db::DbPool;
use crate::models::analytics::{Dashboard, Event, PageView};
use crate::models::post::Post;
use crate::security::auth::EditorUser;

// ── Dashboard widgets ───────────────────────────────────

#[get("/stats/dashboard?<range>")]
pub fn dashboard_stats(
    _admin: EditorUser,
    pool: &State<DbPool>,
    range: Option<String>,
) -> Json<Value> {
    let stats = Dashboard::stats(pool, range.as_deref().unwrap_or("week"));
    Json(json!({ "success": true, "data": stats }))
}

#[get("/activity?<limit>")]
pub fn dashboard_activity(
    _admin: EditorUser,
    pool: &State<DbPool>,
    limit: Option<i64>,
) -> Json<Value> {
    let limit = limit.unwrap_or(10).clamp(1, 50);
    let activity = Dashboard::recent_activity(pool, limit);
    Json(json!({
        "success": true,
        "count": activity.len(),
        "data": activity,
    }))
}

#[get("/popular-posts?<limit>")]
pub fn popular_posts(_admin: EditorUser, pool: &State<DbPool>, limit: Option<i64>) -> Json<Value> {
    let limit = limit.unwrap_or(5).clamp(1, 50);
    let posts = Post::popular(pool, limit);
    Json(json!({
        "success": true,
        "count": posts.len(),
        "data": posts,
    }))
}

#[get("/notifications?<limit>")]
pub fn notifications(_admin: EditorUser, pool: &State<DbPool>, limit: Option<i64>) -> Json<Value> {
    let limit = limit.unwrap_or(10).clamp(1, 50);
    let items = Dashboard::notifications(pool, limit);
    Json(json!({
        "success": true,
        "count": items.len(),
        "data": items,
    }))
}

// ── Site analytics ──────────────────────────────────────

/// Site-wide traffic for the analytics screen. `filter` is one of the
/// named windows; `custom` needs both `from` and `to`.
#[get("/analytics/overview?<filter>&<from>&<to>")]
pub fn analytics_overview(
    _admin: EditorUser,
    pool: &State<DbPool>,
    filter: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Json<Value> {
    let (start, end) = match resolve_range(
        filter.as_deref().unwrap_or("week"),
        from.as_deref(),
        to.as_deref(),
    ) {
        Some(range) => range,
        None => {
            return Json(json!({
                "success": false,
                "message": "Invalid date range parameters",
            }))
        }
    };

    let total_views = PageView::total_views(pool, &start, &end);
    let unique_visitors = PageView::unique_visitors(pool, &start, &end);

    // Growth compares against the equal-length window immediately
    // before; an empty previous window reads as +100%.
    let span = end - start;
    let prev_start = start - span;
    let previous_visitors = PageView::unique_visitors(pool, &prev_start, &start);
    let visitor_growth = if previous_visitors == 0 {
        100.0
    } else {
        ((unique_visitors - previous_visitors) as f64 / previous_visitors as f64 * 1000.0).round()
            / 10.0
    };

    Json(json!({
        "success": true,
        "data": {
            "time_range": { "start": start, "end": end },
            "overview": {
                "total_views": total_views,
                "unique_visitors": unique_visitors,
                "visitor_growth": visitor_growth,
            },
            "daily_views": PageView::daily_views(pool, None, &start, &end),
            "daily_visitors": PageView::daily_visitors(pool, &start, &end),
            "device_breakdown": PageView::device_breakdown(pool, &start, &end),
            "browser_breakdown": PageView::browser_breakdown(pool, &start, &end),
            "os_breakdown": PageView::os_breakdown(pool, &start, &end),
            "top_pages": PageView::top_pages(pool, &start, &end, 10),
            "top_referrers": PageView::top_referrers(pool, &start, &end, 10),
            "popular_posts": PageView::popular_posts(pool, &start, &end, 5),
            "events_by_type": Event::counts_by_type(pool, &start, &end, 10),
        },
    }))
}

/// Per-post drill-down. Defaults to the calendar month.
#[get("/analytics/posts/<id>?<filter>&<from>&<to>")]
pub fn analytics_post(
    _admin: EditorUser,
    pool: &State<DbPool>,
    id: i64,
    filter: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Option<Json<Value>> {
    let post = Post::find_by_id(pool, id)?;

    let (start, end) = match resolve_range(
        filter.as_deref().unwrap_or("month"),
        from.as_deref(),
        to.as_deref(),
    ) {
        Some(range) => range,
        None => {
            return Some(Json(json!({
                "success": false,
                "message": "Invalid date range parameters",
            })))
        }
    };

    Some(Json(json!({
        "success": true,
        "data": {
            "post": {
                "id": post.id,
                "title": post.title,
                "slug": post.slug,
                "views": post.views,
                "created_at": post.created_at,
            },
            "time_range": { "start": start, "end": end },
            "overview": {
                "total_views": PageView::post_total_views(pool, id, &start, &end),
                "unique_visitors": PageView::post_unique_visitors(pool, id, &start, &end),
                "avg_time_on_page": Event::avg_time_on_page(pool, id, &start, &end),
            },
            "daily_views": PageView::daily_views(pool, Some(id), &start, &end),
            "referrers": PageView::post_referrers(pool, id, &start, &end, 10),
            "device_breakdown": PageView::post_device_breakdown(pool, id, &start, &end),
        },
    })))
}
