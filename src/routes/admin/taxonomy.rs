use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::models::category::{Category, CategoryForm};
use crate::models::tag::{Tag, TagForm};
use crate::security::auth::{AdminUser, EditorUser};

// ── Tags ────────────────────────────────────────────────

#[get("/tags?<search>&<sort>&<order>&<page>&<limit>")]
pub fn tags_list(
    _admin: EditorUser,
    pool: &State<DbPool>,
    search: Option<String>,
    sort: Option<String>,
    order: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
) -> Json<Value> {
    let limit = limit.unwrap_or(50).clamp(1, 200);
    let page = page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;
    let descending = order.as_deref() == Some("desc");

    let tags = Tag::list_with_counts(
        pool,
        search.as_deref(),
        sort.as_deref().unwrap_or("name"),
        descending,
        limit,
        offset,
    );
    let total = Tag::count(pool, search.as_deref());
    let total_pages = (total as f64 / limit as f64).ceil() as i64;

    Json(json!({
        "success": true,
        "count": tags.len(),
        "pagination": {
            "page": page,
            "limit": limit,
            "total_pages": total_pages,
            "total": total,
        },
        "data": tags,
    }))
}

#[post("/tags", format = "json", data = "<form>")]
pub fn tag_create(_admin: EditorUser, pool: &State<DbPool>, form: Json<TagForm>) -> Json<Value> {
    let name = form.name.trim();
    if Tag::find_by_name(pool, name).is_some() {
        return failure("Tag with this name already exists");
    }
    match Tag::create(pool, &form) {
        Ok(id) => {
            let tag = Tag::find_by_id(pool, id);
            Json(json!({ "success": true, "data": tag }))
        }
        Err(e) => failure(&e),
    }
}

#[put("/tags/<id>", format = "json", data = "<form>")]
pub fn tag_update(
    _admin: EditorUser,
    pool: &State<DbPool>,
    id: i64,
    form: Json<TagForm>,
) -> Option<Json<Value>> {
    Tag::find_by_id(pool, id)?;
    let name = form.name.trim();
    if let Some(other) = Tag::find_by_name(pool, name) {
        if other.id != id {
            return Some(failure("Another tag with this name already exists"));
        }
    }
    Some(match Tag::update(pool, id, &form) {
        Ok(()) => {
            let tag = Tag::find_by_id(pool, id);
            Json(json!({ "success": true, "data": tag }))
        }
        Err(e) => failure(&e),
    })
}

#[delete("/tags/<id>")]
pub fn tag_delete(_admin: EditorUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    let tag = Tag::find_by_id(pool, id)?;
    // The refusal message carries the live count, as the panel shows it
    let in_use = Tag::post_count(pool, &tag.name);
    if in_use > 0 {
        return Some(failure(&format!(
            "Cannot delete tag that is used in {} posts",
            in_use
        )));
    }
    Some(match Tag::delete(pool, id) {
        Ok(()) => Json(json!({ "success": true, "data": {} })),
        Err(e) => failure(&e),
    })
}

// ── Categories ──────────────────────────────────────────

#[get("/categories")]
pub fn categories_list(_admin: EditorUser, pool: &State<DbPool>) -> Json<Value> {
    let categories = Category::list_with_counts(pool);
    Json(json!({
        "success": true,
        "count": categories.len(),
        "data": categories,
    }))
}

#[post("/categories", format = "json", data = "<form>")]
pub fn category_create(
    _admin: AdminUser,
    pool: &State<DbPool>,
    form: Json<CategoryForm>,
) -> Json<Value> {
    let name = form.name.trim();
    if Category::find_by_name(pool, name).is_some() {
        return failure("Category with this name already exists");
    }
    match Category::create(pool, &form) {
        Ok(id) => {
            let category = Category::find_by_id(pool, id);
            Json(json!({
                "success": true,
                "message": "Category created successfully",
                "data": category,
            }))
        }
        Err(e) => failure(&e),
    }
}

#[put("/categories/<id>", format = "json", data = "<form>")]
pub fn category_update(
    _admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
    form: Json<CategoryForm>,
) -> Option<Json<Value>> {
    Category::find_by_id(pool, id)?;
    let name = form.name.trim();
    if let Some(other) = Category::find_by_name(pool, name) {
        if other.id != id {
            return Some(failure("Category with this name already exists"));
        }
    }
    Some(match Category::update(pool, id, &form) {
        Ok(()) => {
            let category = Category::find_by_id(pool, id);
            Json(json!({ "success": true, "data": category }))
        }
        Err(e) => failure(&e),
    })
}

#[delete("/categories/<id>")]
pub fn category_delete(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    Category::find_by_id(pool, id)?;
    Some(match Category::delete(pool, id) {
        Ok(()) => Json(json!({ "success": true, "data": {} })),
        Err(e) => failure(&e),
    })
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "message": message }))
}
