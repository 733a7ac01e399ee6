use std::collections::HashMap;

use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::models::settings::Setting;
use crate::security::auth::AdminUser;

// ── Site settings ───────────────────────────────────────

/// Keys the panel may write. Anything else in a payload is dropped, so
/// a stray client cannot invent settings rows.
const EDITABLE_KEYS: [&str; 14] = [
    "site_name",
    "site_url",
    "site_description",
    "timezone",
    "posts_per_page",
    "default_category",
    "comments_enabled",
    "comments_moderation",
    "comments_rate_limit",
    "analytics_retention_days",
    "session_expiry_hours",
    "login_rate_limit",
    "uploads_max_mb",
    "uploads_allowed_types",
];

/// Settings that must parse as integers.
const NUMERIC_KEYS: [&str; 6] = [
    "posts_per_page",
    "comments_rate_limit",
    "analytics_retention_days",
    "session_expiry_hours",
    "login_rate_limit",
    "uploads_max_mb",
];

#[get("/settings")]
pub fn settings_get(_admin: AdminUser, pool: &State<DbPool>) -> Json<Value> {
    Json(json!({ "success": true, "data": Setting::all(pool) }))
}

/// Partial update: only the keys present in the payload change.
#[put("/settings", format = "json", data = "<form>")]
pub fn settings_update(
    _admin: AdminUser,
    pool: &State<DbPool>,
    form: Json<HashMap<String, String>>,
) -> Json<Value> {
    let updates: HashMap<String, String> = form
        .into_inner()
        .into_iter()
        .filter(|(key, _)| EDITABLE_KEYS.contains(&key.as_str()))
        .collect();

    if updates.is_empty() {
        return failure("No valid settings provided");
    }
    if updates.get("site_name").map(|v| v.trim().is_empty()) == Some(true) {
        return failure("Site name cannot be empty");
    }
    for key in NUMERIC_KEYS {
        if let Some(value) = updates.get(key) {
            if value.trim().parse::<i64>().is_err() {
                return failure(&format!("{} must be a number", key));
            }
        }
    }

    match Setting::set_many(pool, &updates) {
        Ok(()) => Json(json!({
            "success": true,
            "message": "Settings saved successfully",
            "data": Setting::all(pool),
        })),
        Err(e) => failure(&e),
    }
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "message": message }))
}
