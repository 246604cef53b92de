//! Storage traits and error types
//!
//! This module defines the narrow contract the crawl needs from the book
//! store, and associated error types.

use crate::model::{CategoryRef, ResolvedRecord};
use crate::output::CrawlReport;
use crate::storage::RunRecord;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Store connection poisoned by a panicked writer")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of inserting a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created with this ID
    Inserted(i64),

    /// A book with the same detail URL already exists; nothing was written
    Duplicate,
}

/// Contract between the crawl and the persistence layer
///
/// Implementations must be safe to call from several item workers at once.
/// The crawl does no locking of its own; `insert_book` is expected to reject
/// a second row for the same detail URL, since the read-then-write dedup check
/// alone races under concurrency.
pub trait BookStore: Send + Sync {
    // ===== Categories =====

    /// Names of every category currently stored
    fn existing_category_names(&self) -> StorageResult<HashSet<String>>;

    /// Looks up a category's ID by name
    fn category_id(&self, name: &str) -> StorageResult<Option<i64>>;

    /// Returns true if a category with this name exists
    fn category_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.category_id(name)?.is_some())
    }

    /// Inserts a category and returns its ID
    ///
    /// Inserting a name that already exists returns the existing ID.
    fn insert_category(&self, category: &CategoryRef) -> StorageResult<i64>;

    // ===== Books =====

    /// Returns true if a book with this detail URL is stored
    fn record_exists_by_url(&self, url: &str) -> StorageResult<bool>;

    /// Inserts a resolved record under the given category
    fn insert_book(&self, record: &ResolvedRecord, category_id: i64)
        -> StorageResult<InsertOutcome>;

    // ===== Run Bookkeeping =====

    /// Records the start of a crawl run
    fn begin_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Records a run's final report and status
    fn finish_run(&self, run_id: i64, report: &CrawlReport) -> StorageResult<()>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    fn count_books(&self) -> StorageResult<u64>;

    fn count_categories(&self) -> StorageResult<u64>;

    /// Book counts per category, largest first
    fn books_per_category(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Title Repair =====

    /// Books whose stored title still contains an HTML entity
    fn titles_with_entities(&self) -> StorageResult<Vec<(i64, String)>>;

    fn update_book_title(&self, book_id: i64, title: &str) -> StorageResult<()>;
}
