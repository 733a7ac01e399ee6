use chrono::{Duration, Months, NaiveDateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// Words-per-minute used for read-time estimates.
const READ_WPM: f64 = 200.0;

#[derive(Debug, Deserialize)]
pub struct NewPageView {
    pub page: Option<String>,
    pub path: String,
    pub post_id: Option<i64>,
    pub session_key: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub ip_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub category: Option<String>,
    pub action: Option<String>,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub page: Option<String>,
    pub path: Option<String>,
    pub post_id: Option<i64>,
    pub session_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct BreakdownEntry {
    pub label: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PopularPost {
    pub post_id: i64,
    pub title: String,
    pub slug: String,
    pub views: i64,
}

#[derive(Debug, Serialize)]
pub struct StatCard {
    pub total: i64,
    pub new_count: i64,
    pub trend: f64,
}

#[derive(Debug, Serialize)]
pub struct ReadTimeStat {
    pub minutes: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub posts: StatCard,
    pub users: StatCard,
    pub scheduled: StatCard,
    pub comments: StatCard,
    pub read_time: ReadTimeStat,
}

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub kind: String,
    pub title: String,
    pub detail: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct Notification {
    pub kind: String,
    pub title: String,
    pub content: String,
    pub time: NaiveDateTime,
    pub link: String,
}

/// Week-over-week change as a percentage with one decimal.
/// A previous window of zero reads as +100% when anything happened.
fn trend(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        ((current - previous) / previous * 1000.0).round() / 10.0
    }
}

fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 * 1000.0 / total as f64).round() / 10.0
    }
}

/// `created_at` columns are filled by SQLite's CURRENT_TIMESTAMP, which
/// writes "YYYY-MM-DD HH:MM:SS". Window bounds compared against them must
/// be bound in the same format or the string comparison misorders rows
/// within a day.
fn sql_ts(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub struct PageView;

impl PageView {
    pub fn record(pool: &DbPool, view: &NewPageView) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO page_views (page, path, post_id, session_key, referrer, user_agent,
                                     device, browser, os, ip_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                view.page,
                view.path,
                view.post_id,
                view.session_key,
                view.referrer,
                view.user_agent,
                view.device,
                view.browser,
                view.os,
                view.ip_hash,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn total_views(pool: &DbPool, from: &NaiveDateTime, to: &NaiveDateTime) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM page_views WHERE created_at >= ?1 AND created_at < ?2",
            params![sql_ts(from), sql_ts(to)],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    /// Distinct visitors: the client-assigned session key when present,
    /// otherwise the hashed IP.
    pub fn unique_visitors(pool: &DbPool, from: &NaiveDateTime, to: &NaiveDateTime) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(DISTINCT COALESCE(NULLIF(session_key, ''), ip_hash))
             FROM page_views WHERE created_at >= ?1 AND created_at < ?2",
            params![sql_ts(from), sql_ts(to)],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    fn breakdown(
        pool: &DbPool,
        column: &str,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<BreakdownEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let sql = format!(
            "SELECT COALESCE(NULLIF({col}, ''), 'Unknown') AS label, COUNT(*) AS count
             FROM page_views WHERE created_at >= ?1 AND created_at < ?2
             GROUP BY label ORDER BY count DESC",
            col = column
        );
        let mut stmt = match conn.prepare(&sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };

        let rows: Vec<(String, i64)> = stmt
            .query_map(params![sql_ts(from), sql_ts(to)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default();

        let total: i64 = rows.iter().map(|(_, c)| c).sum();
        rows.into_iter()
            .map(|(label, count)| BreakdownEntry {
                label,
                count,
                percentage: percentage(count, total),
            })
            .collect()
    }

    pub fn device_breakdown(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<BreakdownEntry> {
        Self::breakdown(pool, "device", from, to)
    }

    pub fn browser_breakdown(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<BreakdownEntry> {
        Self::breakdown(pool, "browser", from, to)
    }

    pub fn os_breakdown(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<BreakdownEntry> {
        Self::breakdown(pool, "os", from, to)
    }

    pub fn top_pages(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: i64,
    ) -> Vec<CountEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT path AS label, COUNT(*) AS count
             FROM page_views WHERE created_at >= ?1 AND created_at < ?2
             GROUP BY path ORDER BY count DESC LIMIT ?3",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![sql_ts(from), sql_ts(to), limit], |row| {
            Ok(CountEntry {
                label: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    /// Empty referrers group under "Direct".
    pub fn top_referrers(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: i64,
    ) -> Vec<CountEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT COALESCE(NULLIF(referrer, ''), 'Direct') AS label, COUNT(*) AS count
             FROM page_views WHERE created_at >= ?1 AND created_at < ?2
             GROUP BY label ORDER BY count DESC LIMIT ?3",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![sql_ts(from), sql_ts(to), limit], |row| {
            Ok(CountEntry {
                label: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    /// Per-day view counts, optionally narrowed to one post.
    pub fn daily_views(
        pool: &DbPool,
        post_id: Option<i64>,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<DailyCount> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT DATE(created_at) AS date, COUNT(*) AS count
             FROM page_views WHERE created_at >= ?1 AND created_at < ?2
             AND (?3 IS NULL OR post_id = ?3)
             GROUP BY date ORDER BY date",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![sql_ts(from), sql_ts(to), post_id], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    pub fn daily_visitors(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<DailyCount> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT DATE(created_at) AS date,
                    COUNT(DISTINCT COALESCE(NULLIF(session_key, ''), ip_hash)) AS count
             FROM page_views WHERE created_at >= ?1 AND created_at < ?2
             GROUP BY date ORDER BY date",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![sql_ts(from), sql_ts(to)], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    /// Most-viewed posts inside the window, joined to their titles.
    pub fn popular_posts(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: i64,
    ) -> Vec<PopularPost> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT v.post_id, p.title, p.slug, COUNT(*) AS views
             FROM page_views v JOIN posts p ON p.id = v.post_id
             WHERE v.created_at >= ?1 AND v.created_at < ?2 AND v.post_id IS NOT NULL
             GROUP BY v.post_id ORDER BY views DESC LIMIT ?3",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![sql_ts(from), sql_ts(to), limit], |row| {
            Ok(PopularPost {
                post_id: row.get(0)?,
                title: row.get(1)?,
                slug: row.get(2)?,
                views: row.get(3)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    pub fn post_total_views(
        pool: &DbPool,
        post_id: i64,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM page_views
             WHERE post_id = ?1 AND created_at >= ?2 AND created_at < ?3",
            params![post_id, sql_ts(from), sql_ts(to)],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn post_unique_visitors(
        pool: &DbPool,
        post_id: i64,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(DISTINCT COALESCE(NULLIF(session_key, ''), ip_hash))
             FROM page_views
             WHERE post_id = ?1 AND created_at >= ?2 AND created_at < ?3",
            params![post_id, sql_ts(from), sql_ts(to)],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn post_referrers(
        pool: &DbPool,
        post_id: i64,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: i64,
    ) -> Vec<CountEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT COALESCE(NULLIF(referrer, ''), 'Direct') AS label, COUNT(*) AS count
             FROM page_views
             WHERE post_id = ?1 AND created_at >= ?2 AND created_at < ?3
             GROUP BY label ORDER BY count DESC LIMIT ?4",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![post_id, sql_ts(from), sql_ts(to), limit], |row| {
            Ok(CountEntry {
                label: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    pub fn post_device_breakdown(
        pool: &DbPool,
        post_id: i64,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Vec<BreakdownEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT COALESCE(NULLIF(device, ''), 'Unknown') AS label, COUNT(*) AS count
             FROM page_views
             WHERE post_id = ?1 AND created_at >= ?2 AND created_at < ?3
             GROUP BY label ORDER BY count DESC",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![post_id, sql_ts(from), sql_ts(to)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default();

        let total: i64 = rows.iter().map(|(_, c)| c).sum();
        rows.into_iter()
            .map(|(label, count)| BreakdownEntry {
                label,
                count,
                percentage: percentage(count, total),
            })
            .collect()
    }

    /// Delete page views and events older than the retention window.
    /// Returns the total number of rows removed.
    pub fn prune(pool: &DbPool, retention_days: i64) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let cutoff = Utc::now().naive_utc() - Duration::days(retention_days.max(1));
        let views = conn
            .execute(
                "DELETE FROM page_views WHERE created_at < ?1",
                params![sql_ts(&cutoff)],
            )
            .map_err(|e| e.to_string())?;
        let events = conn
            .execute(
                "DELETE FROM events WHERE created_at < ?1",
                params![sql_ts(&cutoff)],
            )
            .map_err(|e| e.to_string())?;
        Ok((views + events) as i64)
    }
}

pub struct Event;

impl Event {
    pub fn record(pool: &DbPool, event: &NewEvent) -> Result<(), String> {
        if event.event_type.trim().is_empty() {
            return Err("Event type is required".to_string());
        }
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO events (event_type, category, action, label, value, page, path,
                                 post_id, session_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.event_type,
                event.category,
                event.action,
                event.label,
                event.value,
                event.page,
                event.path,
                event.post_id,
                event.session_key,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Average seconds spent on a post, from engagement/timeOnPage events.
    /// None when no such events exist in the window.
    pub fn avg_time_on_page(
        pool: &DbPool,
        post_id: i64,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Option<i64> {
        let conn = pool.get().ok()?;
        let avg: Option<f64> = conn
            .query_row(
                "SELECT AVG(value) FROM events
                 WHERE post_id = ?1 AND event_type = 'engagement' AND category = 'timeOnPage'
                 AND created_at >= ?2 AND created_at < ?3",
                params![post_id, sql_ts(from), sql_ts(to)],
                |row| row.get(0),
            )
            .ok()?;
        avg.map(|v| v.round() as i64)
    }

    pub fn counts_by_type(
        pool: &DbPool,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: i64,
    ) -> Vec<CountEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT event_type AS label, COUNT(*) AS count
             FROM events WHERE created_at >= ?1 AND created_at < ?2
             GROUP BY event_type ORDER BY count DESC LIMIT ?3",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![sql_ts(from), sql_ts(to), limit], |row| {
            Ok(CountEntry {
                label: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }
}

// ── Dashboard aggregates ──

pub struct Dashboard;

impl Dashboard {
    /// The five stat cards. `range` is "today", "week", or "month";
    /// anything else falls back to the rolling last 7 days. The scheduled
    /// and read-time cards carry no history, so their new/trend stay zero.
    pub fn stats(pool: &DbPool, range: &str) -> DashboardStats {
        let zero = || StatCard {
            total: 0,
            new_count: 0,
            trend: 0.0,
        };
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => {
                return DashboardStats {
                    posts: zero(),
                    users: zero(),
                    scheduled: zero(),
                    comments: zero(),
                    read_time: ReadTimeStat { minutes: 0.0 },
                }
            }
        };

        let now = Utc::now().naive_utc();
        let today = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
        let (from, to, prev_from, prev_to) = match range {
            "today" => (
                today,
                today + Duration::days(1),
                today - Duration::days(1),
                today,
            ),
            "month" => {
                let month_ago = now
                    .checked_sub_months(Months::new(1))
                    .unwrap_or(now - Duration::days(30));
                let two_months_ago = now
                    .checked_sub_months(Months::new(2))
                    .unwrap_or(now - Duration::days(60));
                (month_ago, now, two_months_ago, month_ago)
            }
            _ => (
                now - Duration::days(7),
                now,
                now - Duration::days(14),
                now - Duration::days(7),
            ),
        };

        let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0) };
        let (from, to) = (sql_ts(&from), sql_ts(&to));
        let (prev_from, prev_to) = (sql_ts(&prev_from), sql_ts(&prev_to));
        let card = |total_sql: &str, window_sql: &str| -> StatCard {
            let total = count(total_sql);
            let current: i64 = conn
                .query_row(window_sql, params![from, to], |row| row.get(0))
                .unwrap_or(0);
            let previous: i64 = conn
                .query_row(window_sql, params![prev_from, prev_to], |row| row.get(0))
                .unwrap_or(0);
            StatCard {
                total,
                new_count: current,
                trend: trend(current as f64, previous as f64),
            }
        };

        let posts = card(
            "SELECT COUNT(*) FROM posts",
            "SELECT COUNT(*) FROM posts WHERE created_at >= ?1 AND created_at < ?2",
        );
        let users = card(
            "SELECT COUNT(*) FROM users",
            "SELECT COUNT(*) FROM users WHERE created_at >= ?1 AND created_at < ?2",
        );
        let comments = card(
            "SELECT COUNT(*) FROM comments",
            "SELECT COUNT(*) FROM comments WHERE created_at >= ?1 AND created_at < ?2",
        );
        let scheduled = StatCard {
            total: count("SELECT COUNT(*) FROM posts WHERE status = 'scheduled'"),
            new_count: 0,
            trend: 0.0,
        };
        let read_time = ReadTimeStat {
            minutes: (Self::avg_read_minutes(&conn) * 10.0).round() / 10.0,
        };

        DashboardStats {
            posts,
            users,
            scheduled,
            comments,
            read_time,
        }
    }

    /// Mean estimated reading time across every post, in minutes.
    fn avg_read_minutes(conn: &rusqlite::Connection) -> f64 {
        let mut stmt = match conn.prepare("SELECT content FROM posts") {
            Ok(s) => s,
            Err(_) => return 0.0,
        };
        let contents: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default();

        if contents.is_empty() {
            return 0.0;
        }
        let total_minutes: f64 = contents
            .iter()
            .map(|c| c.split_whitespace().count() as f64 / READ_WPM)
            .sum();
        total_minutes / contents.len() as f64
    }

    /// Latest posts, new accounts, and comments merged into one feed.
    pub fn recent_activity(pool: &DbPool, limit: i64) -> Vec<ActivityEntry> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT 'post' AS kind, title, category AS detail, created_at FROM posts
             UNION ALL
             SELECT 'user', username, role, created_at FROM users
             UNION ALL
             SELECT 'comment', author_name, SUBSTR(content, 1, 80), created_at FROM comments
             ORDER BY created_at DESC LIMIT ?1",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![limit], |row| {
            Ok(ActivityEntry {
                kind: row.get(0)?,
                title: row.get(1)?,
                detail: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    /// Derived notification feed: comments waiting for moderation plus
    /// posts scheduled to go out today, newest first. Nothing is stored.
    pub fn notifications(pool: &DbPool, limit: i64) -> Vec<Notification> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let mut out: Vec<Notification> = Vec::new();

        if let Ok(mut stmt) = conn.prepare(
            "SELECT c.content, c.created_at, p.title
             FROM comments c LEFT JOIN posts p ON p.id = c.post_id
             WHERE c.approved = 0 ORDER BY c.created_at DESC LIMIT ?1",
        ) {
            let pending = stmt
                .query_map(params![limit], |row| {
                    let content: String = row.get(0)?;
                    let created_at: NaiveDateTime = row.get(1)?;
                    let post_title: Option<String> = row.get(2)?;
                    Ok((content, created_at, post_title))
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect::<Vec<_>>())
                .unwrap_or_default();
            for (content, created_at, post_title) in pending {
                out.push(Notification {
                    kind: "comment".to_string(),
                    title: format!(
                        "New comment needs approval on \"{}\"",
                        post_title.as_deref().unwrap_or("a post")
                    ),
                    content: excerpt(&content, 100),
                    time: created_at,
                    link: "/admin/comments?status=pending".to_string(),
                });
            }
        }

        if let Ok(mut stmt) = conn.prepare(
            "SELECT id, title, publish_date, created_at FROM posts
             WHERE status = 'scheduled' AND DATE(publish_date) = DATE('now')
             ORDER BY publish_date ASC LIMIT ?1",
        ) {
            let due = stmt
                .query_map(params![limit], |row| {
                    let id: i64 = row.get(0)?;
                    let title: String = row.get(1)?;
                    let publish_date: Option<NaiveDateTime> = row.get(2)?;
                    let created_at: NaiveDateTime = row.get(3)?;
                    Ok((id, title, publish_date, created_at))
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect::<Vec<_>>())
                .unwrap_or_default();
            for (id, title, publish_date, created_at) in due {
                let when = publish_date
                    .map(|d| d.format("%H:%M").to_string())
                    .unwrap_or_else(|| "today".to_string());
                out.push(Notification {
                    kind: "scheduled-post".to_string(),
                    title: format!("Post scheduled for publishing today: \"{}\"", title),
                    content: format!("Scheduled for {}", when),
                    time: created_at,
                    link: format!("/admin/posts/{}", id),
                });
            }
        }

        out.sort_by(|a, b| b.time.cmp(&a.time));
        out.truncate(limit.max(0) as usize);
        out
    }
}

/// First `max` characters with an ellipsis when truncated.
fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
