use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// Present when the query joins posts (admin listings).
    pub post_title: Option<String>,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub approved: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub post_id: i64,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub honeypot: Option<String>,
}

impl Comment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Comment {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            post_title: row.get("post_title").unwrap_or(None),
            author_name: row.get("author_name")?,
            author_email: row.get("author_email")?,
            content: row.get("content")?,
            approved: row.get::<_, i64>("approved")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM comments WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .ok()
    }

    /// Admin listing, optionally filtered by moderation state, with the
    /// owning post's title joined in.
    pub fn list(pool: &DbPool, approved: Option<bool>, limit: i64, offset: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match approved {
            Some(a) => (
                "SELECT c.*, p.title AS post_title FROM comments c
                 LEFT JOIN posts p ON p.id = c.post_id
                 WHERE c.approved = ?1 ORDER BY c.created_at DESC LIMIT ?2 OFFSET ?3"
                    .to_string(),
                vec![Box::new(a as i64), Box::new(limit), Box::new(offset)],
            ),
            None => (
                "SELECT c.*, p.title AS post_title FROM comments c
                 LEFT JOIN posts p ON p.id = c.post_id
                 ORDER BY c.created_at DESC LIMIT ?1 OFFSET ?2"
                    .to_string(),
                vec![Box::new(limit), Box::new(offset)],
            ),
        };

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

    /// Approved comments on a post, oldest first, for the public view.
    pub fn for_post(pool: &DbPool, post_id: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT * FROM comments WHERE post_id = ?1 AND approved = 1 ORDER BY created_at ASC",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![post_id], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count(pool: &DbPool, approved: Option<bool>) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        match approved {
            Some(a) => conn
                .query_row(
                    "SELECT COUNT(*) FROM comments WHERE approved = ?1",
                    params![a as i64],
                    |row| row.get(0),
                )
                .unwrap_or(0),
            None => conn
                .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
                .unwrap_or(0),
        }
    }

    /// `approved` is decided by the caller from the moderation setting.
    pub fn create(pool: &DbPool, form: &CommentForm, approved: bool) -> Result<i64, String> {
        // Honeypot check — if filled, it's a bot
        if let Some(ref hp) = form.honeypot {
            if !hp.is_empty() {
                return Err("Spam detected".to_string());
            }
        }

        if form.author_name.trim().is_empty() {
            return Err("Name is required".to_string());
        }
        if form.content.trim().is_empty() {
            return Err("Comment text is required".to_string());
        }

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO comments (post_id, author_name, author_email, content, approved)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                form.post_id,
                form.author_name.trim(),
                form.author_email,
                form.content,
                approved as i64,
            ],
        )
        .map_err(|e| e.to_string())?;

        Ok(conn.last_insert_rowid())
    }

    pub fn set_approved(pool: &DbPool, id: i64, approved: bool) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE comments SET approved = ?1 WHERE id = ?2",
            params![approved as i64, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM comments WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
