#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::fs::FileServer;
use rocket::http::{Header, Status};
use rocket::serde::json::Json;
use serde_json::{json, Value};

mod analytics;
mod boot;
mod db;
mod image_paths;
mod models;
mod rate_limit;
mod reconcile;
mod routes;
mod security;
mod tasks;

mod tests;

use image_paths::UploadRoots;
use rate_limit::RateLimiter;

/// CORS headers for the browser dashboard. The allowed origin comes
/// from BLOG_CORS_ORIGIN; credentials stay on so the session cookie
/// travels with API calls.
pub struct Cors {
    origin: String,
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS Headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        res.set_header(Header::new("Access-Control-Allow-Origin", self.origin.clone()));
        res.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));
        res.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));
        res.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/// Preflight requests match no real route; answer them all with 204 and
/// let the CORS fairing add the headers.
#[options("/<_path..>")]
fn preflight(_path: std::path::PathBuf) -> Status {
    Status::NoContent
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    Json(json!({ "success": false, "message": "Not authorized to access this resource" }))
}

#[catch(403)]
fn forbidden() -> Json<Value> {
    Json(json!({ "success": false, "message": "Forbidden" }))
}

#[catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({ "success": false, "message": "Resource not found" }))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    Json(json!({ "success": false, "message": "Malformed request body" }))
}

#[catch(500)]
fn server_error() -> Json<Value> {
    Json(json!({ "success": false, "message": "Server error" }))
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    // Boot check — verify/create directories, validate configuration
    boot::run();

    let pool = db::init_pool().expect("Failed to initialize database pool");
    db::run_migrations(&pool).expect("Failed to run database migrations");
    db::seed_defaults(&pool).expect("Failed to seed default settings");

    let roots = UploadRoots::from_env();
    let uploads_dir = roots.primary.clone();

    let cors_origin = std::env::var("BLOG_CORS_ORIGIN")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "*".to_string());

    rocket::build()
        .manage(pool)
        .manage(roots)
        .manage(Arc::new(RateLimiter::new()))
        .attach(Cors {
            origin: cors_origin,
        })
        .attach(tasks::BackgroundTasks)
        .mount("/uploads", FileServer::from(uploads_dir))
        .mount("/", routes::api::root_routes())
        .mount("/", routes![preflight])
        .mount("/api", routes::api::routes())
        .mount("/api/auth", routes::auth::routes())
        .mount("/admin/api", routes::admin::routes())
        .register(
            "/",
            catchers![unauthorized, forbidden, not_found, unprocessable, server_error],
        )
}
