use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::models::user::User;
use crate::security::auth::{self, AdminUser};

const ROLES: [&str; 3] = ["admin", "editor", "author"];

#[get("/users")]
pub fn users_list(_admin: AdminUser, pool: &State<DbPool>) -> Json<Value> {
    let users: Vec<Value> = User::list_all(pool).iter().map(|u| u.safe_json()).collect();
    Json(json!({
        "success": true,
        "count": users.len(),
        "data": users,
    }))
}

#[get("/users/<id>")]
pub fn user_detail(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    let user = User::find_by_id(pool, id)?;
    Some(Json(json!({ "success": true, "data": user.safe_json() })))
}

#[derive(Deserialize)]
pub struct UserCreateForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[post("/users", format = "json", data = "<form>")]
pub fn user_create(
    _admin: AdminUser,
    pool: &State<DbPool>,
    form: Json<UserCreateForm>,
) -> Json<Value> {
    let username = form.username.trim();
    let email = form.email.trim();
    let role = form.role.as_deref().unwrap_or("author").trim();

    if username.is_empty() || email.is_empty() {
        return failure("Username and email are required");
    }
    if !email.contains('@') {
        return failure("Please provide a valid email");
    }
    if form.password.len() < 6 {
        return failure("Password must be at least 6 characters");
    }
    if !ROLES.contains(&role) {
        return failure("Invalid role");
    }
    if User::find_by_login(pool, username).is_some() {
        return failure("Username already in use");
    }
    if User::find_by_email(pool, email).is_some() {
        return failure("Email already in use");
    }

    let hash = match auth::hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            log::error!("password hashing failed: {}", e);
            return failure("Failed to create user");
        }
    };

    match User::create(pool, username, email, &hash, role) {
        Ok(id) => {
            let user = User::find_by_id(pool, id).map(|u| u.safe_json());
            Json(json!({ "success": true, "data": user }))
        }
        Err(e) => {
            log::error!("failed to create user {}: {}", username, e);
            failure("Failed to create user")
        }
    }
}

#[derive(Deserialize)]
pub struct UserUpdateForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

#[put("/users/<id>", format = "json", data = "<form>")]
pub fn user_update(
    admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
    form: Json<UserUpdateForm>,
) -> Option<Json<Value>> {
    let stored = User::find_by_id(pool, id)?;

    let username = match form.username.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        Some(_) => return Some(failure("Username and email are required")),
        None => stored.username.clone(),
    };
    let email = match form.email.as_deref().map(str::trim) {
        Some(e) if !e.is_empty() => {
            if !e.contains('@') {
                return Some(failure("Please provide a valid email"));
            }
            e.to_string()
        }
        Some(_) => return Some(failure("Username and email are required")),
        None => stored.email.clone(),
    };
    let role = match form.role.as_deref().map(str::trim) {
        Some(r) => {
            if !ROLES.contains(&r) {
                return Some(failure("Invalid role"));
            }
            // An admin stripping their own admin role would lock the
            // panel; role changes go through another admin.
            if id == admin.user.id && r != stored.role {
                return Some(failure("Cannot change your own role"));
            }
            r.to_string()
        }
        None => stored.role.clone(),
    };

    if username != stored.username && User::find_by_login(pool, &username).is_some() {
        return Some(failure("Username already in use"));
    }
    if email != stored.email && User::find_by_email(pool, &email).is_some() {
        return Some(failure("Email already in use"));
    }

    if let Err(e) = User::update(pool, id, &username, &email, &role) {
        log::error!("failed to update user {}: {}", id, e);
        return Some(failure("Failed to update user"));
    }

    if let Some(password) = form.password.as_deref().filter(|p| !p.is_empty()) {
        if password.len() < 6 {
            return Some(failure("Password must be at least 6 characters"));
        }
        let hash = match auth::hash_password(password) {
            Ok(h) => h,
            Err(e) => {
                log::error!("password hashing failed: {}", e);
                return Some(failure("Failed to update user"));
            }
        };
        if let Err(e) = User::update_password(pool, id, &hash) {
            log::error!("failed to update password for user {}: {}", id, e);
            return Some(failure("Failed to update user"));
        }
    }

    let user = User::find_by_id(pool, id).map(|u| u.safe_json());
    Some(Json(json!({ "success": true, "data": user })))
}

#[delete("/users/<id>")]
pub fn user_delete(admin: AdminUser, pool: &State<DbPool>, id: i64) -> Option<Json<Value>> {
    let target = User::find_by_id(pool, id)?;

    if id == admin.user.id {
        return Some(failure("Cannot delete your own account"));
    }

    match User::delete(pool, id) {
        Ok(()) => {
            log::info!("deleted user {} ({})", id, target.username);
            Some(Json(json!({ "success": true, "data": {} })))
        }
        Err(e) => {
            log::error!("failed to delete user {}: {}", id, e);
            Some(failure("Failed to delete user"))
        }
    }
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "message": message }))
}
