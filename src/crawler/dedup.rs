//! Dedup guard
//!
//! Decides, before any detail page is fetched, whether a listing entry is
//! already known. Known means either stored by an earlier run, or claimed by
//! another worker earlier in this run. The store's unique constraint on the
//! detail URL still backs this up at insert time.

use crate::storage::{BookStore, StorageResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// What the guard decided for a detail URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// Not seen before; the caller now owns this URL for the run
    New,
    /// The store already has a record with this URL
    Stored,
    /// Another listing entry in this run already claimed the URL
    ClaimedThisRun,
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::New)
    }
}

/// Suppresses re-ingestion of items by detail URL
pub struct DedupGuard {
    store: Arc<dyn BookStore>,
    claimed: Mutex<HashSet<String>>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self {
            store,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Checks a detail URL and claims it if it is new
    pub fn check(&self, detail_url: &str) -> StorageResult<DedupVerdict> {
        if self.store.record_exists_by_url(detail_url)? {
            return Ok(DedupVerdict::Stored);
        }

        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.insert(detail_url.to_string()) {
            Ok(DedupVerdict::New)
        } else {
            Ok(DedupVerdict::ClaimedThisRun)
        }
    }

    /// Number of URLs claimed so far in this run
    pub fn claimed_count(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
