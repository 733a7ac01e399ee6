use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// A managed tag. Posts embed tag names directly; this table backs the
/// taxonomy screens, and post_count is derived by matching the quoted
/// name inside the posts.tags JSON column.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct TagForm {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagSummary {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub post_count: i64,
}

impl Tag {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Tag {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM tags WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .ok()
    }

    pub fn find_by_name(pool: &DbPool, name: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM tags WHERE name = ?1",
            params![name],
            Self::from_row,
        )
        .ok()
    }

    /// Listing for the taxonomy screens: optional name search, sortable,
    /// paginated, with per-tag published-post counts. The sort column is
    /// whitelisted because ORDER BY cannot be parameterized.
    pub fn list_with_counts(
        pool: &DbPool,
        search: Option<&str>,
        sort: &str,
        descending: bool,
        limit: i64,
        offset: i64,
    ) -> Vec<TagSummary> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let column = match sort {
            "created_at" => "t.created_at",
            "post_count" => "post_count",
            _ => "t.name",
        };
        let direction = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT t.id, t.name, t.slug, t.description,
                    (SELECT COUNT(*) FROM posts p
                     WHERE p.status = 'published' AND p.tags LIKE '%\"' || t.name || '\"%')
                    AS post_count
             FROM tags t
             WHERE (?1 IS NULL OR t.name LIKE '%' || ?1 || '%')
             ORDER BY {} {} LIMIT ?2 OFFSET ?3",
            column, direction
        );
        let mut stmt = match conn.prepare(&sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![search, limit, offset], |row| {
            Ok(TagSummary {
                id: row.get("id")?,
                name: row.get("name")?,
                slug: row.get("slug")?,
                description: row.get("description")?,
                post_count: row.get("post_count")?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    pub fn count(pool: &DbPool, search: Option<&str>) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM tags WHERE (?1 IS NULL OR name LIKE '%' || ?1 || '%')",
            params![search],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn post_count(pool: &DbPool, name: &str) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        let pattern = format!("%\"{}\"%", name);
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE tags LIKE ?1",
            params![pattern],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn create(pool: &DbPool, form: &TagForm) -> Result<i64, String> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err("Tag name is required".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO tags (name, slug, description) VALUES (?1, ?2, ?3)",
            params![name, slug::slugify(name), form.description],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, form: &TagForm) -> Result<(), String> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err("Tag name is required".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE tags SET name = ?1, slug = ?2, description = ?3 WHERE id = ?4",
            params![name, slug::slugify(name), form.description, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Deletion is refused while any post still carries the tag.
    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let tag = Self::find_by_id(pool, id).ok_or_else(|| "Tag not found".to_string())?;
        if Self::post_count(pool, &tag.name) > 0 {
            return Err("Cannot delete a tag that is still used by posts".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM tags WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Ensure a tag row exists for a name used on a post.
    pub fn find_or_create(pool: &DbPool, name: &str) -> Result<i64, String> {
        if let Some(existing) = Self::find_by_name(pool, name) {
            return Ok(existing.id);
        }
        Self::create(
            pool,
            &TagForm {
                name: name.to_string(),
                description: None,
            },
        )
    }
}
