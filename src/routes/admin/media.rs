use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::{is_allowed_image, max_upload_bytes, save_upload};
use crate::db::DbPool;
use crate::image_paths::UploadRoots;
use crate::models::settings::Setting;
use crate::security::auth::{AuthorUser, EditorUser};

// ── Media library ───────────────────────────────────────

#[derive(serde::Serialize, Clone)]
pub struct MediaFile {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub size_human: String,
    pub ext: String,
    pub modified: String,
}

/// Scan the primary uploads root and return image files newest-first.
pub(crate) fn scan_media_files(roots: &UploadRoots, pool: &DbPool) -> Vec<MediaFile> {
    let allowed = Setting::get_or(pool, "uploads_allowed_types", "jpg,jpeg,png,gif,webp");
    let exts: Vec<String> = allowed.split(',').map(|s| s.trim().to_lowercase()).collect();

    let mut files: Vec<MediaFile> = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&roots.primary) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            if name.starts_with('.') {
                continue;
            }
            let ext = path
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase();
            if !exts.iter().any(|e| e == &ext) {
                continue;
            }
            let meta = std::fs::metadata(&path).ok();
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified = meta
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(|t| {
                    let dt: chrono::DateTime<chrono::Utc> = t.into();
                    dt.format("%Y-%m-%d %H:%M").to_string()
                })
                .unwrap_or_default();
            let size_human = if size >= 1_048_576 {
                format!("{:.1} MB", size as f64 / 1_048_576.0)
            } else if size >= 1024 {
                format!("{:.0} KB", size as f64 / 1024.0)
            } else {
                format!("{} B", size)
            };
            files.push(MediaFile {
                url: format!("/uploads/{}", name),
                name,
                size,
                size_human,
                ext,
                modified,
            });
        }
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    files
}

#[get("/media")]
pub fn media_list(
    _admin: EditorUser,
    pool: &State<DbPool>,
    roots: &State<UploadRoots>,
) -> Json<Value> {
    let files = scan_media_files(roots, pool);
    Json(json!({
        "success": true,
        "count": files.len(),
        "data": files,
    }))
}

// ── Editor upload ───────────────────────────────────────

#[derive(FromForm)]
pub struct ImageUploadForm<'f> {
    pub image: TempFile<'f>,
}

/// Rich-text editor upload contract: the response carries the public
/// `location` the editor inserts into content.
#[post("/media", data = "<form>")]
pub async fn upload_image(
    _admin: AuthorUser,
    pool: &State<DbPool>,
    roots: &State<UploadRoots>,
    mut form: Form<ImageUploadForm<'_>>,
) -> Json<Value> {
    if form.image.len() == 0 {
        return Json(json!({ "success": false, "message": "Please upload a file" }));
    }
    if form.image.len() > max_upload_bytes(pool) {
        return Json(json!({ "success": false, "message": "File too large" }));
    }
    if !is_allowed_image(&form.image, pool) {
        return Json(json!({ "success": false, "message": "Only image files are allowed" }));
    }
    match save_upload(&mut form.image, roots).await {
        Some(filename) => Json(json!({
            "success": true,
            "location": format!("/uploads/{}", filename),
        })),
        None => Json(json!({ "success": false, "message": "Failed to store uploaded image" })),
    }
}

#[delete("/media/<name>")]
pub fn media_delete(
    _admin: EditorUser,
    roots: &State<UploadRoots>,
    name: &str,
) -> Option<Json<Value>> {
    // Only plain filenames; anything that could walk out of the root is
    // rejected outright.
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Some(Json(
            json!({ "success": false, "message": "Invalid filename" }),
        ));
    }

    let path = roots.primary.join(name);
    if !path.is_file() {
        return None;
    }

    match std::fs::remove_file(&path) {
        Ok(()) => {
            log::info!("deleted upload {}", name);
            Some(Json(json!({ "success": true, "data": {} })))
        }
        Err(e) => {
            log::error!("failed to delete upload {}: {}", name, e);
            Some(Json(
                json!({ "success": false, "message": "Failed to delete file" }),
            ))
        }
    }
}
