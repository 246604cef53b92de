//! Database schema definitions
//!
//! This module contains the SQL schema for the Shelf-Harvest book store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs and their final counters
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    categories_added INTEGER NOT NULL DEFAULT 0,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    pages_empty INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    items_seen INTEGER NOT NULL DEFAULT 0,
    items_inserted INTEGER NOT NULL DEFAULT 0,
    items_duplicate INTEGER NOT NULL DEFAULT 0,
    items_unresolved_category INTEGER NOT NULL DEFAULT 0,
    items_malformed INTEGER NOT NULL DEFAULT 0,
    items_fetch_failed INTEGER NOT NULL DEFAULT 0,
    items_store_error INTEGER NOT NULL DEFAULT 0,
    items_cancelled INTEGER NOT NULL DEFAULT 0
);

-- Categories, unique by name
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    source_url TEXT,
    created_at TEXT NOT NULL
);

-- Books, unique by detail page URL
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    price TEXT NOT NULL,
    rating TEXT,
    availability TEXT,
    detail_page_url TEXT NOT NULL UNIQUE,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_books_category ON books(category_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
