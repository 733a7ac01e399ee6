use chrono::{NaiveDateTime, Utc};
use regex::Regex;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::reconcile::{ImageRef, Thumbnail};

/// A blog post. The images, thumbnail, and tags columns are stored as
/// JSON text; unreadable JSON deserializes to empty rather than failing
/// the whole row.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub featured: bool,
    pub status: String, // draft, published, scheduled
    pub publish_date: Option<NaiveDateTime>,
    pub views: i64,
    pub images: Vec<ImageRef>,
    pub thumbnail: Option<Thumbnail>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Write payload for create/update. Routes assemble this after the
/// image reconciliation step has produced the final images/thumbnail.
#[derive(Debug)]
pub struct PostData {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub author_id: Option<i64>,
    pub featured: bool,
    pub status: String,
    pub publish_date: Option<NaiveDateTime>,
    pub images: Vec<ImageRef>,
    pub thumbnail: Option<Thumbnail>,
}

const SELECT_POST: &str =
    "SELECT p.*, u.username AS author_name FROM posts p LEFT JOIN users u ON u.id = p.author_id";

impl Post {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let id: i64 = row.get("id")?;
        let tags_raw: String = row.get("tags")?;
        let images_raw: String = row.get("images")?;
        let thumbnail_raw: Option<String> = row.get("thumbnail")?;

        let tags = serde_json::from_str(&tags_raw).unwrap_or_else(|e| {
            log::warn!("post {}: unreadable tags column: {}", id, e);
            Vec::new()
        });
        let images = serde_json::from_str(&images_raw).unwrap_or_else(|e| {
            log::warn!("post {}: unreadable images column: {}", id, e);
            Vec::new()
        });
        let thumbnail = thumbnail_raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(t) => Some(t),
            Err(e) => {
                log::warn!("post {}: unreadable thumbnail column: {}", id, e);
                None
            }
        });

        Ok(Post {
            id,
            title: row.get("title")?,
            slug: row.get("slug")?,
            content: row.get("content")?,
            summary: row.get("summary")?,
            category: row.get("category")?,
            tags,
            author_id: row.get("author_id")?,
            // Only present when the query joins users
            author_name: row.get("author_name").unwrap_or(None),
            featured: row.get::<_, i64>("featured")? != 0,
            status: row.get("status")?,
            publish_date: row.get("publish_date")?,
            views: row.get("views")?,
            images,
            thumbnail,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    // ── Lookups ──

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            &format!("{} WHERE p.id = ?1", SELECT_POST),
            params![id],
            Self::from_row,
        )
        .ok()
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            &format!("{} WHERE p.slug = ?1", SELECT_POST),
            params![slug],
            Self::from_row,
        )
        .ok()
    }

    /// Listing with optional filters. `tag` matches against the quoted
    /// serialized form inside the JSON array; `search` is a LIKE over
    /// title and content, case-insensitive for ASCII.
    pub fn list(
        pool: &DbPool,
        status: Option<&str>,
        category: Option<&str>,
        tag: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let mut clauses: Vec<String> = vec![];
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

        if let Some(s) = status {
            params_vec.push(Box::new(s.to_string()));
            clauses.push(format!("p.status = ?{}", params_vec.len()));
        }
        if let Some(c) = category {
            params_vec.push(Box::new(c.to_string()));
            clauses.push(format!("p.category = ?{}", params_vec.len()));
        }
        if let Some(t) = tag {
            params_vec.push(Box::new(format!("%\"{}\"%", t)));
            clauses.push(format!("p.tags LIKE ?{}", params_vec.len()));
        }
        if let Some(q) = search {
            params_vec.push(Box::new(format!("%{}%", q)));
            let idx = params_vec.len();
            clauses.push(format!("(p.title LIKE ?{} OR p.content LIKE ?{})", idx, idx));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        params_vec.push(Box::new(limit));
        let limit_idx = params_vec.len();
        params_vec.push(Box::new(offset));
        let offset_idx = params_vec.len();

        let sql = format!(
            "{}{} ORDER BY p.created_at DESC LIMIT ?{} OFFSET ?{}",
            SELECT_POST, where_sql, limit_idx, offset_idx
        );

        let mut stmt = match conn.prepare(&sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        stmt.query_map(params_refs.as_slice(), Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count(
        pool: &DbPool,
        status: Option<&str>,
        category: Option<&str>,
        tag: Option<&str>,
        search: Option<&str>,
    ) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };

        let mut clauses: Vec<String> = vec![];
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

        if let Some(s) = status {
            params_vec.push(Box::new(s.to_string()));
            clauses.push(format!("status = ?{}", params_vec.len()));
        }
        if let Some(c) = category {
            params_vec.push(Box::new(c.to_string()));
            clauses.push(format!("category = ?{}", params_vec.len()));
        }
        if let Some(t) = tag {
            params_vec.push(Box::new(format!("%\"{}\"%", t)));
            clauses.push(format!("tags LIKE ?{}", params_vec.len()));
        }
        if let Some(q) = search {
            params_vec.push(Box::new(format!("%{}%", q)));
            let idx = params_vec.len();
            clauses.push(format!("(title LIKE ?{} OR content LIKE ?{})", idx, idx));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        conn.query_row(
            &format!("SELECT COUNT(*) FROM posts{}", where_sql),
            params_refs.as_slice(),
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn popular(pool: &DbPool, limit: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(&format!(
            "{} WHERE p.status = 'published' ORDER BY p.views DESC, p.created_at DESC LIMIT ?1",
            SELECT_POST
        )) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![limit], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    // ── Slugs ──

    fn slug_taken(pool: &DbPool, slug: &str, exclude_id: Option<i64>) -> bool {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return false,
        };
        let count: i64 = match exclude_id {
            Some(id) => conn
                .query_row(
                    "SELECT COUNT(*) FROM posts WHERE slug = ?1 AND id != ?2",
                    params![slug, id],
                    |row| row.get(0),
                )
                .unwrap_or(0),
            None => conn
                .query_row(
                    "SELECT COUNT(*) FROM posts WHERE slug = ?1",
                    params![slug],
                    |row| row.get(0),
                )
                .unwrap_or(0),
        };
        count > 0
    }

    /// Summary fallback: markup stripped, cut to 200 characters, with an
    /// ellipsis when the content ran longer.
    pub fn generate_summary(content: &str) -> String {
        let stripped = match Regex::new(r"</?[^>]+(>|$)") {
            Ok(re) => re.replace_all(content, "").to_string(),
            Err(_) => content.to_string(),
        };
        let cut: String = stripped.chars().take(200).collect();
        let mut summary = cut.trim().to_string();
        if content.chars().count() > 200 {
            summary.push_str("...");
        }
        summary
    }

    /// Slugify a title and append -2, -3... until the slug is free.
    pub fn unique_slug(pool: &DbPool, title: &str, exclude_id: Option<i64>) -> String {
        let base = {
            let s = slug::slugify(title);
            if s.is_empty() {
                "post".to_string()
            } else {
                s
            }
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while Self::slug_taken(pool, &candidate, exclude_id) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        candidate
    }

    // ── Mutations ──

    pub fn create(pool: &DbPool, data: &PostData) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;

        let tags_json = serde_json::to_string(&data.tags).map_err(|e| e.to_string())?;
        let images_json = serde_json::to_string(&data.images).map_err(|e| e.to_string())?;
        let thumbnail_json = match &data.thumbnail {
            Some(t) => Some(serde_json::to_string(t).map_err(|e| e.to_string())?),
            None => None,
        };

        conn.execute(
            "INSERT INTO posts (title, slug, content, summary, category, tags, author_id,
                                featured, status, publish_date, images, thumbnail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                data.title,
                data.slug,
                data.content,
                data.summary,
                data.category,
                tags_json,
                data.author_id,
                data.featured as i64,
                data.status,
                data.publish_date,
                images_json,
                thumbnail_json,
            ],
        )
        .map_err(|e| e.to_string())?;

        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, data: &PostData) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;

        let tags_json = serde_json::to_string(&data.tags).map_err(|e| e.to_string())?;
        let images_json = serde_json::to_string(&data.images).map_err(|e| e.to_string())?;
        let thumbnail_json = match &data.thumbnail {
            Some(t) => Some(serde_json::to_string(t).map_err(|e| e.to_string())?),
            None => None,
        };

        conn.execute(
            "UPDATE posts SET title=?1, slug=?2, content=?3, summary=?4, category=?5, tags=?6,
             author_id=?7, featured=?8, status=?9, publish_date=?10, images=?11, thumbnail=?12,
             updated_at=CURRENT_TIMESTAMP WHERE id=?13",
            params![
                data.title,
                data.slug,
                data.content,
                data.summary,
                data.category,
                tags_json,
                data.author_id,
                data.featured as i64,
                data.status,
                data.publish_date,
                images_json,
                thumbnail_json,
                id,
            ],
        )
        .map_err(|e| e.to_string())?;

        Ok(())
    }

    pub fn increment_views(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET views = views + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Flip scheduled posts whose publish date has passed to published.
    /// Returns the promoted posts as (id, title) pairs. The cutoff is
    /// bound from chrono so it compares in the same text format the
    /// publish_date column was written in.
    pub fn publish_due(pool: &DbPool) -> Result<Vec<(i64, String)>, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let now = Utc::now().naive_utc();

        let due: Vec<(i64, String)> = {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title FROM posts
                     WHERE status = 'scheduled'
                     AND publish_date IS NOT NULL
                     AND publish_date <= ?1",
                )
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(params![now], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| e.to_string())?;
            rows.filter_map(|r| r.ok()).collect()
        };

        for (id, _) in &due {
            conn.execute(
                "UPDATE posts SET status = 'published', updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| e.to_string())?;
        }

        Ok(due)
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM comments WHERE post_id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM posts WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
