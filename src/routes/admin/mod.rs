use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rocket::fs::TempFile;

use crate::db::DbPool;
use crate::image_paths::UploadRoots;
use crate::models::settings::Setting;

pub mod api;
pub mod comments;
pub mod media;
pub mod posts;
pub mod settings;
pub mod taxonomy;
pub mod users;

/// If status is "published" but publish_date is in the future, override
/// to "scheduled" so the background task promotes it on time.
pub(crate) fn resolve_status(status: &str, publish_date: &Option<String>) -> String {
    if status == "published" {
        if let Some(raw) = publish_date.as_deref().map(str::trim) {
            if !raw.is_empty() {
                if let Some(dt) = parse_publish_date(raw) {
                    if dt > chrono::Utc::now().naive_utc() {
                        return "scheduled".to_string();
                    }
                }
            }
        }
    }
    status.to_string()
}

/// Form inputs arrive either as datetime-local ("%Y-%m-%dT%H:%M") or the
/// storage format.
pub(crate) fn parse_publish_date(raw: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Persist an uploaded image into the primary uploads root under a
/// generated name: image-<millis>-<random>.<ext>. Returns the stored
/// filename, or None when persisting failed.
pub(crate) async fn save_upload(file: &mut TempFile<'_>, roots: &UploadRoots) -> Option<String> {
    // Try content-type extension first, then original filename (raw_name), then field name
    let ext = file
        .content_type()
        .and_then(|ct| ct.extension())
        .map(|e| e.to_string().to_lowercase())
        .or_else(|| {
            file.raw_name().and_then(|rn| {
                let s = rn.dangerous_unsafe_unsanitized_raw().as_str().to_string();
                s.rsplit('.').next().map(|e| e.to_lowercase())
            })
        })
        .or_else(|| {
            file.name()
                .and_then(|n| n.rsplit('.').next())
                .map(|e| e.to_lowercase())
        })
        .unwrap_or_else(|| "jpg".to_string());

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let filename = format!("image-{}-{}.{}", millis, suffix, ext);

    let _ = roots.ensure();
    let dest = roots.primary.join(&filename);

    if let Err(e) = file.persist_to(&dest).await {
        log::error!("failed to store upload {}: {}", filename, e);
        return None;
    }
    log::info!("stored upload {}", filename);
    Some(filename)
}

/// Upload size ceiling from the uploads_max_mb setting, in bytes.
pub(crate) fn max_upload_bytes(pool: &DbPool) -> u64 {
    Setting::get_i64_or(pool, "uploads_max_mb", 5).max(1) as u64 * 1024 * 1024
}

/// Uploads must be image/* and carry a whitelisted extension.
pub(crate) fn is_allowed_image(file: &TempFile<'_>, pool: &DbPool) -> bool {
    let is_image = file
        .content_type()
        .map(|ct| ct.top() == "image")
        .unwrap_or(false);
    if !is_image {
        return false;
    }

    let allowed = Setting::get_or(pool, "uploads_allowed_types", "jpg,jpeg,png,gif,webp");
    let allowed_list: Vec<&str> = allowed.split(',').map(|s| s.trim()).collect();

    let ext = file
        .content_type()
        .and_then(|ct| ct.extension())
        .map(|e| e.to_string().to_lowercase())
        .or_else(|| {
            file.raw_name().and_then(|rn| {
                let s = rn.dangerous_unsafe_unsanitized_raw().as_str().to_string();
                s.rsplit('.').next().map(|e| e.to_lowercase())
            })
        })
        .unwrap_or_default();

    allowed_list.iter().any(|a| a.eq_ignore_ascii_case(&ext))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        posts::posts_list,
        posts::post_detail,
        posts::post_create,
        posts::post_update,
        posts::post_delete,
        comments::comments_list,
        comments::comment_approve,
        comments::comment_unapprove,
        comments::comment_delete,
        users::users_list,
        users::user_detail,
        users::user_create,
        users::user_update,
        users::user_delete,
        taxonomy::tags_list,
        taxonomy::tag_create,
        taxonomy::tag_update,
        taxonomy::tag_delete,
        taxonomy::categories_list,
        taxonomy::category_create,
        taxonomy::category_update,
        taxonomy::category_delete,
        media::media_list,
        media::upload_image,
        media::media_delete,
        settings::settings_get,
        settings::settings_update,
        api::dashboard_stats,
        api::dashboard_activity,
        api::popular_posts,
        api::notifications,
        api::analytics_overview,
        api::analytics_post,
    ]
}
