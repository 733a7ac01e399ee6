use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use url::Url;

/// URL prefix every locally stored image is served under.
pub const URL_PREFIX: &str = "/uploads/";

/// The two filesystem directories probed when checking whether an image
/// reference is actually backed by a file. Primary is where new uploads
/// land; public is a legacy location older content may still point into.
#[derive(Debug, Clone)]
pub struct UploadRoots {
    pub primary: PathBuf,
    pub public: PathBuf,
}

impl UploadRoots {
    pub fn from_env() -> Self {
        UploadRoots {
            primary: PathBuf::from(
                env::var("BLOG_UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
            public: PathBuf::from(
                env::var("BLOG_PUBLIC_UPLOADS_DIR")
                    .unwrap_or_else(|_| "public/uploads".to_string()),
            ),
        }
    }

    /// Create both directories if missing. Errors are reported to the
    /// caller so boot can decide whether they are fatal.
    pub fn ensure(&self) -> Result<(), String> {
        for dir in [&self.primary, &self.public] {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
            }
        }
        Ok(())
    }
}

/// Outcome of an advisory existence probe. `resolved` is the filesystem
/// path the reference was matched to, when any.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResolution {
    pub exists: bool,
    pub resolved: Option<PathBuf>,
}

/// Map any textual image reference (bare filename, relative path, API
/// prefixed path, localhost URL, absolute URL, Windows-style path) to the
/// single canonical form `/uploads/<name>`. Absolute URLs whose path is not
/// under `/uploads/` are external images and pass through untouched.
///
/// Never fails: anything unexpected (e.g. a string that looks like an
/// absolute URL but does not parse) falls back to the caller's original
/// string.
pub fn normalize(input: Option<&str>) -> Option<String> {
    let raw = input?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match normalize_inner(trimmed) {
        Some(path) => Some(path),
        None => {
            warn!("image path normalization fell back to original: {}", raw);
            Some(raw.to_string())
        }
    }
}

fn normalize_inner(path: &str) -> Option<String> {
    let mut p = path.replace('\\', "/");

    // One or more ../ segments directly in front of uploads/ collapse to
    // the canonical prefix: "../../uploads/cat.jpg" -> "/uploads/cat.jpg".
    if p.contains("../uploads/") {
        p = collapse_parent_uploads(&p);
    }

    // API-prefixed form handed out by older clients.
    if let Some(rest) = p.strip_prefix("/api/uploads/") {
        p = format!("{}{}", URL_PREFIX, rest);
    }

    // Development URLs embed the host; keep from /uploads/ onward.
    if p.contains("localhost") {
        if let Some(idx) = p.find(URL_PREFIX) {
            p = p[idx..].to_string();
        }
    }

    // Absolute URLs: local if the path component is under /uploads/,
    // external otherwise (external ones are never rewritten or probed).
    if p.starts_with("http://") || p.starts_with("https://") {
        let parsed = Url::parse(&p).ok()?;
        let url_path = parsed.path();
        match url_path.find(URL_PREFIX) {
            Some(idx) => p = url_path[idx..].to_string(),
            None => return Some(p),
        }
    }

    // Anything still mentioning uploads/ mid-string is re-anchored there:
    // "some/dir/uploads/x.jpg" -> "/uploads/x.jpg".
    if !p.starts_with(URL_PREFIX) {
        if let Some(idx) = p.find("uploads/") {
            p = format!("{}{}", URL_PREFIX, &p[idx + "uploads/".len()..]);
        }
    }

    // Bare filenames and leftover relative fragments get the prefix.
    if !p.starts_with(URL_PREFIX) {
        let stripped = p.trim_start_matches('/');
        p = format!("{}{}", URL_PREFIX, stripped);
    }

    Some(p)
}

/// Replace the first run of "../" segments followed by "uploads/" with
/// "/uploads/". Only the first such span is rewritten; later stages
/// re-anchor anything that still needs it.
fn collapse_parent_uploads(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if path[i..].starts_with("../") {
            let mut j = i;
            while path[j..].starts_with("../") {
                j += 3;
            }
            if path[j..].starts_with("uploads/") {
                let mut out = String::with_capacity(path.len());
                out.push_str(&path[..i]);
                out.push_str(URL_PREFIX);
                out.push_str(&path[j + "uploads/".len()..]);
                return out;
            }
            i = j;
        } else {
            i += 1;
        }
    }
    path.to_string()
}

/// Whether a normalized reference points at locally served storage.
pub fn is_local(path: &str) -> bool {
    path.starts_with(URL_PREFIX)
}

/// Advisory probe: is the referenced file present on disk? Checked by bare
/// filename against each root in priority order, then as a direct absolute
/// path, then as a canonical path relative to the working directory.
///
/// Callers must treat a negative result as a logging signal only — an
/// upload written moments ago can race a directory listing, so existence
/// is never a gate on accepting the reference.
pub fn check_exists(path: &str, roots: &UploadRoots) -> PathResolution {
    if path.is_empty() {
        return PathResolution {
            exists: false,
            resolved: None,
        };
    }

    if let Some(name) = Path::new(path).file_name() {
        for root in [&roots.primary, &roots.public] {
            let candidate = root.join(name);
            if candidate.is_file() {
                return PathResolution {
                    exists: true,
                    resolved: Some(candidate),
                };
            }
        }
    }

    let direct = Path::new(path);
    if direct.is_absolute() && direct.is_file() {
        return PathResolution {
            exists: true,
            resolved: Some(direct.to_path_buf()),
        };
    }

    if path.starts_with(URL_PREFIX) {
        let relative = PathBuf::from(path.trim_start_matches('/'));
        if relative.is_file() {
            return PathResolution {
                exists: true,
                resolved: Some(relative),
            };
        }
    }

    PathResolution {
        exists: false,
        resolved: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> Option<String> {
        normalize(Some(s))
    }

    #[test]
    fn test_none_and_empty_input() {
        assert_eq!(normalize(None), None);
        assert_eq!(norm(""), None);
        assert_eq!(norm("   "), None);
    }

    #[test]
    fn test_canonical_passes_through() {
        assert_eq!(norm("/uploads/cat.jpg"), Some("/uploads/cat.jpg".into()));
    }

    #[test]
    fn test_relative_parent_collapse() {
        assert_eq!(norm("../uploads/cat.jpg"), Some("/uploads/cat.jpg".into()));
        assert_eq!(
            norm("../../uploads/cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
        assert_eq!(
            norm("../../../uploads/deep/cat.jpg"),
            Some("/uploads/deep/cat.jpg".into())
        );
    }

    #[test]
    fn test_api_prefix_stripped() {
        assert_eq!(
            norm("/api/uploads/cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
    }

    #[test]
    fn test_localhost_url() {
        assert_eq!(
            norm("http://localhost:5000/uploads/cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
        assert_eq!(
            norm("localhost:3000/uploads/pic.png"),
            Some("/uploads/pic.png".into())
        );
    }

    #[test]
    fn test_absolute_url_with_uploads_path() {
        assert_eq!(
            norm("https://example.com/uploads/cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
        // Path prefix before /uploads/ is discarded
        assert_eq!(
            norm("https://example.com/media/uploads/cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
    }

    #[test]
    fn test_external_url_untouched() {
        let ext = "https://cdn.example.com/images/cat.jpg";
        assert_eq!(norm(ext), Some(ext.into()));
        assert!(!is_local(ext));
    }

    #[test]
    fn test_backslashes_converted() {
        assert_eq!(
            norm("..\\uploads\\cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
        assert_eq!(norm("uploads\\cat.jpg"), Some("/uploads/cat.jpg".into()));
    }

    #[test]
    fn test_mid_string_uploads_reanchored() {
        assert_eq!(norm("uploads/cat.jpg"), Some("/uploads/cat.jpg".into()));
        assert_eq!(
            norm("some/dir/uploads/cat.jpg"),
            Some("/uploads/cat.jpg".into())
        );
    }

    #[test]
    fn test_bare_filename_prefixed() {
        assert_eq!(norm("cat.jpg"), Some("/uploads/cat.jpg".into()));
        assert_eq!(norm("//cat.jpg"), Some("/uploads/cat.jpg".into()));
        assert_eq!(norm("/images/cat.jpg"), Some("/uploads/images/cat.jpg".into()));
    }

    #[test]
    fn test_unparseable_url_falls_back_to_original() {
        // Looks absolute but Url::parse rejects it; the original string
        // comes back unchanged instead of an error.
        assert_eq!(norm("http://"), Some("http://".into()));
    }

    #[test]
    fn test_idempotent_on_local_paths() {
        for input in [
            "../../uploads/cat.jpg",
            "/api/uploads/cat.jpg",
            "http://localhost:5000/uploads/cat.jpg",
            "uploads/cat.jpg",
            "cat.jpg",
            "/uploads/cat.jpg",
        ] {
            let once = norm(input).unwrap();
            let twice = normalize(Some(&once)).unwrap();
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(norm("  /uploads/cat.jpg  "), Some("/uploads/cat.jpg".into()));
    }

    // ── existence probe ──────────────────────────────────

    fn temp_roots(tag: &str) -> UploadRoots {
        let base = std::env::temp_dir().join(format!("inkpot_paths_{}_{}", std::process::id(), tag));
        let roots = UploadRoots {
            primary: base.join("uploads"),
            public: base.join("public/uploads"),
        };
        roots.ensure().unwrap();
        roots
    }

    #[test]
    fn test_exists_in_primary_root() {
        let roots = temp_roots("primary");
        fs::write(roots.primary.join("a.jpg"), b"x").unwrap();

        let res = check_exists("/uploads/a.jpg", &roots);
        assert!(res.exists);
        assert_eq!(res.resolved, Some(roots.primary.join("a.jpg")));
    }

    #[test]
    fn test_primary_wins_over_public() {
        let roots = temp_roots("priority");
        fs::write(roots.primary.join("b.jpg"), b"x").unwrap();
        fs::write(roots.public.join("b.jpg"), b"y").unwrap();

        let res = check_exists("b.jpg", &roots);
        assert_eq!(res.resolved, Some(roots.primary.join("b.jpg")));
    }

    #[test]
    fn test_exists_falls_back_to_public_root() {
        let roots = temp_roots("public");
        fs::write(roots.public.join("c.png"), b"x").unwrap();

        let res = check_exists("/uploads/c.png", &roots);
        assert!(res.exists);
        assert_eq!(res.resolved, Some(roots.public.join("c.png")));
    }

    #[test]
    fn test_absolute_path_accepted_directly() {
        let roots = temp_roots("absolute");
        let outside = std::env::temp_dir().join(format!("inkpot_abs_{}.jpg", std::process::id()));
        fs::write(&outside, b"x").unwrap();

        let res = check_exists(outside.to_str().unwrap(), &roots);
        assert!(res.exists);
        assert_eq!(res.resolved, Some(outside.clone()));
        fs::remove_file(outside).ok();
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let roots = temp_roots("missing");
        let res = check_exists("/uploads/nope.jpg", &roots);
        assert!(!res.exists);
        assert_eq!(res.resolved, None);
    }

    #[test]
    fn test_empty_path_not_found() {
        let roots = temp_roots("empty");
        assert!(!check_exists("", &roots).exists);
    }
}
