//! Storage module: the book store the crawl ingests into
//!
//! The crawl depends only on the [`BookStore`] trait. [`SqliteBookStore`] is
//! the bundled implementation, holding:
//! - categories, unique by name
//! - books, unique by detail page URL
//! - one row per crawl run with its final counters

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteBookStore;
pub use traits::{BookStore, InsertOutcome, StorageError, StorageResult};

use crate::HarvestError;
use std::path::Path;

/// Opens (or creates) the SQLite book store at `path`
pub fn open_store(path: &Path) -> Result<SqliteBookStore, HarvestError> {
    Ok(SqliteBookStore::new(path)?)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub categories_added: u64,
    pub pages_visited: u64,
    pub pages_empty: u64,
    pub pages_failed: u64,
    pub items_seen: u64,
    pub items_inserted: u64,
    pub items_duplicate: u64,
    pub items_unresolved_category: u64,
    pub items_malformed: u64,
    pub items_fetch_failed: u64,
    pub items_store_error: u64,
    pub items_cancelled: u64,
}

impl RunRecord {
    /// Every item the run saw landed in exactly one outcome counter
    pub fn is_balanced(&self) -> bool {
        self.items_seen
            == self.items_inserted
                + self.items_duplicate
                + self.items_unresolved_category
                + self.items_malformed
                + self.items_fetch_failed
                + self.items_store_error
                + self.items_cancelled
    }
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Started and not yet finished (or the process died)
    Running,
    /// Every page and item was processed
    Complete,
    /// Stopped early by cancellation
    Partial,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Partial => "partial",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "complete" => Some(Self::Complete),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}
