use log::warn;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::params;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_pool() -> Result<DbPool, Box<dyn std::error::Error>> {
    let db_path = std::env::var("BLOG_DB").unwrap_or_else(|_| "data/inkpot.db".to_string());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(&db_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    // Enable WAL mode for better concurrent read performance
    let conn = pool.get()?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Accounts
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'author',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Login sessions
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL,
            ip_hash TEXT,
            user_agent TEXT,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        -- Blog posts. images holds a JSON array of {url, alt} objects,
        -- thumbnail a JSON {url, alt} object, tags a JSON array of strings.
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            summary TEXT,
            category TEXT NOT NULL DEFAULT 'Other',
            tags TEXT NOT NULL DEFAULT '[]',
            author_id INTEGER,
            featured INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'draft',
            publish_date DATETIME,
            views INTEGER NOT NULL DEFAULT 0,
            images TEXT NOT NULL DEFAULT '[]',
            thumbnail TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (author_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
        CREATE INDEX IF NOT EXISTS idx_posts_publish_date ON posts(publish_date);
        CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category);

        -- Managed tag list (posts embed tag names; this table backs the
        -- taxonomy screens and per-tag counts)
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            description TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Categories: a seeded built-in set plus user-created ones
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            description TEXT,
            built_in INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Comments
        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL,
            author_name TEXT NOT NULL,
            author_email TEXT,
            content TEXT NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (post_id) REFERENCES posts(id)
        );

        CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
        CREATE INDEX IF NOT EXISTS idx_comments_approved ON comments(approved);

        -- Built-in analytics: one row per page view
        CREATE TABLE IF NOT EXISTS page_views (
            id INTEGER PRIMARY KEY,
            page TEXT,
            path TEXT NOT NULL,
            post_id INTEGER,
            session_key TEXT,
            referrer TEXT,
            user_agent TEXT,
            device TEXT,
            browser TEXT,
            os TEXT,
            ip_hash TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_views_path ON page_views(path);
        CREATE INDEX IF NOT EXISTS idx_views_date ON page_views(created_at);
        CREATE INDEX IF NOT EXISTS idx_views_post ON page_views(post_id);
        CREATE INDEX IF NOT EXISTS idx_views_session ON page_views(session_key);

        -- Custom analytics events (clicks, scroll depth, shares...)
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            event_type TEXT NOT NULL,
            category TEXT,
            action TEXT,
            label TEXT,
            value REAL,
            page TEXT,
            path TEXT,
            post_id INTEGER,
            session_key TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
        CREATE INDEX IF NOT EXISTS idx_events_date ON events(created_at);

        -- Settings (key-value)
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        );
        ",
    )?;

    Ok(())
}

/// Category names every install starts with. Custom categories can be
/// added alongside; built-in ones refuse deletion.
pub const BUILT_IN_CATEGORIES: [&str; 13] = [
    "Technology",
    "Health",
    "Finance",
    "Lifestyle",
    "Education",
    "Travel",
    "Food",
    "News",
    "Entertainment",
    "Sports",
    "Business",
    "Science",
    "Other",
];

pub fn seed_defaults(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    let defaults = vec![
        // General
        ("site_name", "Inkpot"),
        ("site_url", "http://localhost:8000"),
        ("site_description", ""),
        ("timezone", "UTC"),
        ("posts_per_page", "10"),
        ("default_category", "Other"),
        // Comments
        ("comments_enabled", "true"),
        ("comments_moderation", "manual"),
        ("comments_rate_limit", "5"),
        // Analytics
        ("analytics_retention_days", "90"),
        // Security
        ("session_expiry_hours", "24"),
        ("login_rate_limit", "5"),
        // Uploads
        ("uploads_max_mb", "5"),
        ("uploads_allowed_types", "jpg,jpeg,png,gif,webp"),
    ];

    for (key, value) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    for name in BUILT_IN_CATEGORIES {
        conn.execute(
            "INSERT OR IGNORE INTO categories (name, slug, built_in) VALUES (?1, ?2, 1)",
            params![name, slug::slugify(name)],
        )?;
    }

    // Seed the first admin account if no users exist yet
    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

    if user_count == 0 {
        let username =
            std::env::var("BLOG_ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
        let email =
            std::env::var("BLOG_ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string());
        let password = match std::env::var("BLOG_ADMIN_PASSWORD") {
            Ok(p) if !p.is_empty() => p,
            _ => {
                let generated: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(16)
                    .map(char::from)
                    .collect();
                warn!(
                    "No BLOG_ADMIN_PASSWORD set; generated admin password: {}",
                    generated
                );
                generated
            }
        };

        let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
            .expect("Failed to hash admin password");
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role) VALUES (?1, ?2, ?3, 'admin')",
            params![username, email, hash],
        )?;
    }

    Ok(())
}
