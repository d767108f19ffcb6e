//! SQLite database management with migrations
//!
//! Holds the catalog, reading history, feedback and preference profiles the
//! recommendation pipeline reads from.

use crate::error::{CheerError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CheerError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        // Pragmas are per connection, so they go on every pooled connection
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(16).build(manager)?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DbStats {
            user_count: count("SELECT COUNT(*) FROM users")?,
            item_count: count("SELECT COUNT(*) FROM items")?,
            embedded_item_count: count("SELECT COUNT(*) FROM items WHERE embedding IS NOT NULL")?,
            category_count: count("SELECT COUNT(*) FROM categories")?,
            interaction_count: count("SELECT COUNT(*) FROM interactions")?,
            feedback_count: count("SELECT COUNT(*) FROM negative_feedback")?,
        })
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub user_count: usize,
    pub item_count: usize,
    pub embedded_item_count: usize,
    pub category_count: usize,
    pub interaction_count: usize,
    pub feedback_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Readers; preferred_categories is a JSON array, most preferred first
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        preferred_categories TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    );

    -- Genres
    CREATE TABLE categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    -- Books; embedding is little-endian f32, NULL until computed
    CREATE TABLE items (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        keywords TEXT,
        embedding BLOB,
        embedding_model TEXT,
        embedded_at TEXT
    );

    CREATE TABLE item_categories (
        item_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        PRIMARY KEY (item_id, category_id),
        FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
        FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_item_categories_category ON item_categories(category_id);

    -- Reading history, one row per (user, item)
    CREATE TABLE interactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        item_id INTEGER NOT NULL,
        rating INTEGER,
        read_date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (user_id, item_id),
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_interactions_user_date ON interactions(user_id, read_date);

    -- Explicit "not interested" marks, one row per (user, item)
    CREATE TABLE negative_feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        item_id INTEGER NOT NULL,
        interested BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (user_id, item_id),
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
    );
    "#,
];
