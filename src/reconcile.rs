use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::image_paths;

/// Alt text used when neither the tag nor the request supplies one.
pub const DEFAULT_ALT: &str = "Blog post image";

/// Matches an `<img` opening token through its first `src="..."` value.
/// Deliberately tolerant, not an HTML parse; see `scan_content_images`.
const IMG_SRC_PATTERN: &str = r#"<img[^>]+src="([^">]+)""#;
const ALT_PATTERN: &str = r#"alt="([^">]*)""#;

/// One image associated with a post. `url` is the identity key: no two
/// entries in a post's image list may share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_filename: Option<String>,
}

/// Designated cover image. Stored only fully populated; a candidate with
/// an empty url or alt is dropped rather than stored half-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub alt: String,
}

impl Thumbnail {
    fn from_ref(image: &ImageRef) -> Option<Thumbnail> {
        if image.url.is_empty() || image.alt.is_empty() {
            return None;
        }
        Some(Thumbnail {
            url: image.url.clone(),
            alt: image.alt.clone(),
        })
    }
}

/// Outcome of one reconciliation pass. Warnings are advisory notes for
/// the request log; they never fail the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub images: Vec<ImageRef>,
    pub thumbnail: Option<Thumbnail>,
    pub warnings: Vec<String>,
}

/// Build the image list and thumbnail for a brand-new post.
///
/// `uploaded` holds the stored filenames of files received with the
/// request, in upload order. Content images embedded in `content` follow
/// them, deduplicated by url. `thumbnail_index` is the raw form value; a
/// valid index selects among the uploaded files, anything else falls
/// through to the defaults.
pub fn reconcile_create(
    uploaded: &[String],
    title: &str,
    content: &str,
    thumbnail_index: Option<&str>,
) -> ReconciliationResult {
    let mut warnings = Vec::new();
    let alt = first_non_empty(&[title], DEFAULT_ALT);

    let form = form_image_refs(uploaded, alt);
    let form_count = form.len();
    let embedded = scan_content_images(content, alt);
    let images = merge_dedup(form, embedded);

    let index = parse_index(thumbnail_index, &mut warnings);
    let candidate = match index {
        Some(i) if i < form_count => images.get(i),
        _ => images.first(),
    };
    let thumbnail = validate_thumbnail(candidate, &mut warnings);

    ReconciliationResult {
        images,
        thumbnail,
        warnings,
    }
}

/// Merge semantics for editing an existing post.
///
/// `existing` is the image list the update starts from (the client's
/// submitted set when the form carries one, otherwise the stored list).
/// New uploads are appended, then `content` is re-scanned when provided.
/// Thumbnail precedence: index into the new uploads, index into the
/// merged list, first new upload, first merged image when no thumbnail
/// was stored before, absent when the list emptied, else the prior
/// thumbnail unchanged.
pub fn reconcile_update(
    existing: Vec<ImageRef>,
    prior_thumbnail: Option<Thumbnail>,
    uploaded: &[String],
    title: Option<&str>,
    stored_title: &str,
    content: Option<&str>,
    thumbnail_index: Option<&str>,
) -> ReconciliationResult {
    let mut warnings = Vec::new();
    let alt = first_non_empty(&[title.unwrap_or(""), stored_title], DEFAULT_ALT);

    let new_uploads = form_image_refs(uploaded, alt);
    let merged = merge_dedup(existing, new_uploads.clone());
    let embedded = match content {
        Some(c) => scan_content_images(c, alt),
        None => Vec::new(),
    };
    let images = merge_dedup(merged, embedded);

    let index = parse_index(thumbnail_index, &mut warnings);
    let thumbnail = if let Some(i) = index.filter(|&i| i < new_uploads.len()) {
        validate_thumbnail(new_uploads.get(i), &mut warnings)
    } else if let Some(i) = index.filter(|&i| i < images.len()) {
        validate_thumbnail(images.get(i), &mut warnings)
    } else if !new_uploads.is_empty() {
        validate_thumbnail(new_uploads.first(), &mut warnings)
    } else if prior_thumbnail.is_none() && !images.is_empty() {
        validate_thumbnail(images.first(), &mut warnings)
    } else if images.is_empty() {
        // A previously stored thumbnail must not outlive its image list.
        None
    } else {
        prior_thumbnail
    };

    ReconciliationResult {
        images,
        thumbnail,
        warnings,
    }
}

/// Map stored upload filenames to ImageRefs in upload order.
fn form_image_refs(uploaded: &[String], alt: &str) -> Vec<ImageRef> {
    uploaded
        .iter()
        .filter_map(|name| {
            let url = image_paths::normalize(Some(&format!("/uploads/{}", name)))?;
            Some(ImageRef {
                url,
                alt: alt.to_string(),
                origin_filename: Some(name.clone()),
            })
        })
        .collect()
}

/// Extract locally hosted images embedded in rich-text content.
///
/// Matching contract: each hit spans a literal `<img` token up to the
/// first `src="..."` on that tag; the alt attribute is looked up within
/// the same tag (bounded by the next `>`). Multiple src attributes or
/// exotic quoting can defeat this — acceptable for editor-generated
/// markup, and isolated here so a real parser could replace it.
/// External references and anything that fails to normalize are skipped;
/// first-seen order is preserved. Never fails: worst case is an
/// incomplete list.
fn scan_content_images(content: &str, default_alt: &str) -> Vec<ImageRef> {
    if content.is_empty() {
        return Vec::new();
    }
    let (img_re, alt_re) = match (Regex::new(IMG_SRC_PATTERN), Regex::new(ALT_PATTERN)) {
        (Ok(i), Ok(a)) => (i, a),
        _ => return Vec::new(),
    };

    let mut found = Vec::new();
    for caps in img_re.captures_iter(content) {
        let (whole, src) = match (caps.get(0), caps.get(1)) {
            (Some(w), Some(s)) => (w, s),
            _ => continue,
        };

        let url = match image_paths::normalize(Some(src.as_str())) {
            Some(u) if image_paths::is_local(&u) => u,
            _ => continue,
        };

        // Alt may sit on either side of src; bound the search at the
        // closing > so a later tag's alt is never picked up.
        let tag_end = content[whole.start()..]
            .find('>')
            .map(|i| whole.start() + i)
            .unwrap_or(whole.end());
        let tag = &content[whole.start()..tag_end];
        let alt = alt_re
            .captures(tag)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| default_alt.to_string());

        found.push(ImageRef {
            url,
            alt,
            origin_filename: None,
        });
    }
    found
}

/// Append `extra` onto `base`, keeping the first occurrence of every url.
fn merge_dedup(base: Vec<ImageRef>, extra: Vec<ImageRef>) -> Vec<ImageRef> {
    let mut out: Vec<ImageRef> = Vec::with_capacity(base.len() + extra.len());
    for image in base.into_iter().chain(extra) {
        if !out.iter().any(|existing| existing.url == image.url) {
            out.push(image);
        }
    }
    out
}

/// Lenient form-field parse: a non-negative integer or nothing. Malformed
/// values are noted and treated as unspecified, never as an error.
fn parse_index(raw: Option<&str>, warnings: &mut Vec<String>) -> Option<usize> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<usize>() {
        Ok(i) => Some(i),
        Err(_) => {
            warnings.push(format!("ignoring malformed thumbnail index {:?}", raw));
            None
        }
    }
}

fn validate_thumbnail(
    candidate: Option<&ImageRef>,
    warnings: &mut Vec<String>,
) -> Option<Thumbnail> {
    let image = candidate?;
    match Thumbnail::from_ref(image) {
        Some(t) => Some(t),
        None => {
            warnings.push(format!(
                "thumbnail omitted: selected image {:?} is missing url or alt",
                image.url
            ));
            None
        }
    }
}

fn first_non_empty<'a>(candidates: &[&'a str], default: &'a str) -> &'a str {
    candidates
        .iter()
        .find(|s| !s.trim().is_empty())
        .copied()
        .unwrap_or(default)
}
