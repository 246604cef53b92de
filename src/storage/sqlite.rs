//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the BookStore trait.

use crate::model::{CategoryRef, ResolvedRecord};
use crate::output::CrawlReport;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{BookStore, InsertOutcome, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite book store
///
/// A single connection guarded by a mutex; workers serialize on it, and the
/// unique constraints on category name and detail URL settle any race
/// between an existence check and an insert.
pub struct SqliteBookStore {
    conn: Mutex<Connection>,
}

impl SqliteBookStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl BookStore for SqliteBookStore {
    // ===== Categories =====

    fn existing_category_names(&self) -> StorageResult<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM categories")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    fn category_id(&self, name: &str) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM categories WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn insert_category(&self, category: &CategoryRef) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO categories (name, source_url, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO NOTHING",
            params![category.name, category.source_url, now],
        )?;

        let id = conn.query_row(
            "SELECT id FROM categories WHERE name = ?1",
            params![category.name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    // ===== Books =====

    fn record_exists_by_url(&self, url: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM books WHERE detail_page_url = ?1)",
            params![url],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn insert_book(
        &self,
        record: &ResolvedRecord,
        category_id: i64,
    ) -> StorageResult<InsertOutcome> {
        let conn = self.conn()?;
        let item = &record.item;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "INSERT INTO books (title, price, rating, availability, detail_page_url, category_id, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(detail_page_url) DO NOTHING",
            params![
                item.title,
                item.price,
                item.rating.map(|r| r.as_str()),
                item.availability,
                item.detail_url,
                category_id,
                now
            ],
        )?;

        if changed == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted(conn.last_insert_rowid()))
        }
    }

    // ===== Run Bookkeeping =====

    fn begin_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, report: &CrawlReport) -> StorageResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2,
                categories_added = ?3, pages_visited = ?4, pages_empty = ?5,
                pages_failed = ?6, items_seen = ?7, items_inserted = ?8,
                items_duplicate = ?9, items_unresolved_category = ?10,
                items_malformed = ?11, items_fetch_failed = ?12,
                items_store_error = ?13, items_cancelled = ?14
             WHERE id = ?15",
            params![
                now,
                report.status.to_db_string(),
                report.categories_added,
                report.pages_visited,
                report.pages_empty,
                report.pages_failed,
                report.items_seen,
                report.items_inserted,
                report.items_duplicate,
                report.items_unresolved_category,
                report.items_malformed,
                report.items_fetch_failed,
                report.items_store_error,
                report.items_cancelled,
                run_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, categories_added,
                        pages_visited, pages_empty, pages_failed, items_seen,
                        items_inserted, items_duplicate, items_unresolved_category,
                        items_malformed, items_fetch_failed, items_store_error,
                        items_cancelled
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Running),
                        categories_added: row.get(5)?,
                        pages_visited: row.get(6)?,
                        pages_empty: row.get(7)?,
                        pages_failed: row.get(8)?,
                        items_seen: row.get(9)?,
                        items_inserted: row.get(10)?,
                        items_duplicate: row.get(11)?,
                        items_unresolved_category: row.get(12)?,
                        items_malformed: row.get(13)?,
                        items_fetch_failed: row.get(14)?,
                        items_store_error: row.get(15)?,
                        items_cancelled: row.get(16)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    fn count_books(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_categories(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn books_per_category(&self) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.name, COUNT(b.id) AS count
             FROM categories c LEFT JOIN books b ON b.category_id = c.id
             GROUP BY c.id
             ORDER BY count DESC, c.name ASC",
        )?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== Title Repair =====

    fn titles_with_entities(&self) -> StorageResult<Vec<(i64, String)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, title FROM books WHERE title LIKE '%&%;%' ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_book_title(&self, book_id: i64, title: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE books SET title = ?1 WHERE id = ?2",
            params![title, book_id],
        )?;
        Ok(())
    }
}
