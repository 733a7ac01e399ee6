use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::process;

use crate::image_paths::UploadRoots;

/// Run all boot checks. Call this before Rocket launches.
/// Creates missing directories, warns about risky configuration, and
/// aborts if the server cannot possibly come up healthy.
pub fn run() {
    info!("Inkpot boot check starting...");

    let mut warnings = 0u32;
    let mut errors = 0u32;

    // ── 1. Upload roots ────────────────────────────────
    let roots = UploadRoots::from_env();
    for dir in [&roots.primary, &roots.public] {
        if !dir.exists() {
            match fs::create_dir_all(dir) {
                Ok(_) => info!("  Created directory: {}", dir.display()),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir.display(), e);
                    errors += 1;
                }
            }
        }
    }

    // The primary root takes the actual writes; probe it.
    if roots.primary.exists() {
        let test_file = roots.primary.join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                warn!("  Uploads directory not writable: {} (image uploads will fail)", e);
                warnings += 1;
            }
        }
    }

    // ── 2. Database directory writable ──────────────────
    let db_path = std::env::var("BLOG_DB").unwrap_or_else(|_| "data/inkpot.db".to_string());
    let db_dir = Path::new(&db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !db_dir.exists() {
        match fs::create_dir_all(db_dir) {
            Ok(_) => info!("  Created directory: {}", db_dir.display()),
            Err(e) => {
                error!("  FAILED to create directory {}: {}", db_dir.display(), e);
                errors += 1;
            }
        }
    }
    if db_dir.exists() {
        let test_file = db_dir.join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                error!("  Database directory not writable: {}", e);
                errors += 1;
            }
        }
    }

    // ── 3. Environment advisories ───────────────────────
    if std::env::var("BLOG_ADMIN_PASSWORD")
        .map(|v| v.is_empty())
        .unwrap_or(true)
    {
        warn!("  BLOG_ADMIN_PASSWORD not set — a generated admin password will be logged on first start");
        warnings += 1;
    }
    if std::env::var("ROCKET_SECRET_KEY")
        .map(|v| v.is_empty())
        .unwrap_or(true)
    {
        warn!("  ROCKET_SECRET_KEY not set — sessions will not survive a restart");
        warnings += 1;
    }
    if std::env::var("BLOG_CORS_ORIGIN")
        .map(|v| v.is_empty())
        .unwrap_or(true)
    {
        warn!("  BLOG_CORS_ORIGIN not set — allowing all origins");
        warnings += 1;
    }

    // ── 4. Rocket.toml exists ───────────────────────────
    if !Path::new("Rocket.toml").exists() {
        warn!("  Rocket.toml not found — using default config");
        warnings += 1;
    }

    // ── Summary ─────────────────────────────────────────
    if errors > 0 {
        error!(
            "Boot check FAILED: {} error(s), {} warning(s). Aborting.",
            errors, warnings
        );
        process::exit(1);
    }

    if warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }
}
