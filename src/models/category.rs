use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// Post categories. A fixed built-in set is seeded at first run; those
/// rows cannot be renamed or deleted. Posts reference categories by name.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub built_in: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub built_in: bool,
    pub post_count: i64,
}

impl Category {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            built_in: row.get::<_, i64>("built_in")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .ok()
    }

    pub fn find_by_name(pool: &DbPool, name: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE name = ?1",
            params![name],
            Self::from_row,
        )
        .ok()
    }

    pub fn list(pool: &DbPool) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM categories ORDER BY name") {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn list_with_counts(pool: &DbPool) -> Vec<CategorySummary> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT c.id, c.name, c.slug, c.description, c.built_in,
                    (SELECT COUNT(*) FROM posts p
                     WHERE p.status = 'published' AND p.category = c.name) AS post_count
             FROM categories c ORDER BY c.name",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], |row| {
            Ok(CategorySummary {
                id: row.get("id")?,
                name: row.get("name")?,
                slug: row.get("slug")?,
                description: row.get("description")?,
                built_in: row.get::<_, i64>("built_in")? != 0,
                post_count: row.get("post_count")?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    pub fn post_count(pool: &DbPool, name: &str) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE category = ?1",
            params![name],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn create(pool: &DbPool, form: &CategoryForm) -> Result<i64, String> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err("Category name is required".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO categories (name, slug, description, built_in) VALUES (?1, ?2, ?3, 0)",
            params![name, slug::slugify(name), form.description],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, form: &CategoryForm) -> Result<(), String> {
        let cat = Self::find_by_id(pool, id).ok_or_else(|| "Category not found".to_string())?;
        if cat.built_in {
            return Err("Built-in categories cannot be edited".to_string());
        }
        let name = form.name.trim();
        if name.is_empty() {
            return Err("Category name is required".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        // Keep posts pointing at the renamed category
        conn.execute(
            "UPDATE posts SET category = ?1 WHERE category = ?2",
            params![name, cat.name],
        )
        .map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE categories SET name = ?1, slug = ?2, description = ?3 WHERE id = ?4",
            params![name, slug::slugify(name), form.description, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Built-in categories are protected; custom ones are refused while
    /// posts still reference them.
    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let cat = Self::find_by_id(pool, id).ok_or_else(|| "Category not found".to_string())?;
        if cat.built_in {
            return Err("Built-in categories cannot be deleted".to_string());
        }
        if Self::post_count(pool, &cat.name) > 0 {
            return Err("Cannot delete a category that still has posts".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
