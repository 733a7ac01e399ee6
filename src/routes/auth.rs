use std::sync::Arc;

use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::models::settings::Setting;
use crate::models::user::User;
use crate::rate_limit::RateLimiter;
use crate::security::auth::{self, AuthenticatedUser, ClientIp, UserAgent};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Session login. The identifier matches either the username or the
/// email address; failures stay deliberately vague.
#[post("/login", format = "json", data = "<form>")]
pub fn login(
    pool: &State<DbPool>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    agent: UserAgent,
    cookies: &CookieJar<'_>,
    form: Json<LoginForm>,
) -> Json<Value> {
    let identifier = form
        .email
        .as_deref()
        .or(form.username.as_deref())
        .map(str::trim)
        .unwrap_or("");
    let password = form.password.as_deref().unwrap_or("");

    if identifier.is_empty() || password.is_empty() {
        return failure("Please provide email and password");
    }

    let rate_key = format!("login:{}", auth::hash_ip(&client_ip.0));
    let max_attempts = Setting::get_i64_or(pool, "login_rate_limit", 5).max(1) as u64;
    let window = std::time::Duration::from_secs(15 * 60);
    if !limiter.check_and_record(&rate_key, max_attempts, window) {
        return failure("Too many login attempts. Please try again in 15 minutes.");
    }

    let user = match User::find_by_login(pool, identifier) {
        Some(u) => u,
        None => return failure("Invalid credentials"),
    };
    if !auth::verify_password(password, &user.password_hash) {
        return failure("Invalid credentials");
    }

    match auth::create_session(pool, user.id, Some(&client_ip.0), agent.0.as_deref()) {
        Ok(session_id) => {
            auth::set_session_cookie(cookies, &session_id, pool);
            log::info!("user {} logged in", user.username);
            Json(json!({ "success": true, "user": user.safe_json() }))
        }
        Err(e) => {
            log::error!("failed to create session for {}: {}", user.username, e);
            failure("Session creation failed")
        }
    }
}

#[post("/logout")]
pub fn logout(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Json<Value> {
    if let Some(cookie) = cookies.get_private(auth::SESSION_COOKIE) {
        let _ = auth::destroy_session(pool, cookie.value());
    }
    auth::clear_session_cookie(cookies);
    Json(json!({ "success": true, "message": "Logged out" }))
}

#[get("/me")]
pub fn me(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({ "success": true, "data": user.user.safe_json() }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Self-service username/email change. Role changes stay with the
/// admin user management endpoints.
#[put("/profile", format = "json", data = "<form>")]
pub fn update_profile(
    user: AuthenticatedUser,
    pool: &State<DbPool>,
    form: Json<ProfileForm>,
) -> Json<Value> {
    let stored = &user.user;

    let username = match form.username.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => stored.username.clone(),
    };
    let email = match form.email.as_deref().map(str::trim) {
        Some(e) if !e.is_empty() => {
            if !e.contains('@') {
                return failure("Please provide a valid email");
            }
            e.to_string()
        }
        _ => stored.email.clone(),
    };

    if username != stored.username && User::find_by_login(pool, &username).is_some() {
        return failure("Username already in use");
    }
    if email != stored.email && User::find_by_email(pool, &email).is_some() {
        return failure("Email already in use");
    }

    if let Err(e) = User::update(pool, stored.id, &username, &email, &stored.role) {
        log::error!("failed to update profile for user {}: {}", stored.id, e);
        return failure("Failed to update profile");
    }

    let updated = User::find_by_id(pool, stored.id).map(|u| u.safe_json());
    Json(json!({ "success": true, "data": updated }))
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[put("/password", format = "json", data = "<form>")]
pub fn update_password(
    user: AuthenticatedUser,
    pool: &State<DbPool>,
    form: Json<PasswordForm>,
) -> Json<Value> {
    let current = form.current_password.as_deref().unwrap_or("");
    let new = form.new_password.as_deref().unwrap_or("");

    if !auth::verify_password(current, &user.user.password_hash) {
        return failure("Password is incorrect");
    }
    if new.len() < 6 {
        return failure("Password must be at least 6 characters");
    }

    let hash = match auth::hash_password(new) {
        Ok(h) => h,
        Err(e) => {
            log::error!("password hashing failed: {}", e);
            return failure("Failed to update password");
        }
    };
    if let Err(e) = User::update_password(pool, user.user.id, &hash) {
        log::error!("failed to update password for user {}: {}", user.user.id, e);
        return failure("Failed to update password");
    }

    Json(json!({ "success": true, "message": "Password updated" }))
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "message": message }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login, logout, me, update_profile, update_password]
}
