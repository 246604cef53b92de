//! Crawl report: counters for one run
//!
//! The coordinator folds every item outcome into a [`CrawlReport`]; it is
//! printed for the operator and persisted with the run.

use crate::storage::RunStatus;
use std::time::Duration;

/// Summary counters for a single crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    /// `Complete`, or `Partial` when the run was cancelled
    pub status: RunStatus,

    /// Categories newly inserted from the site index
    pub categories_added: u64,

    /// Listing pages fetched successfully
    pub pages_visited: u64,

    /// Listing pages that yielded no items (including missing pages)
    pub pages_empty: u64,

    /// Listing pages that failed terminally
    pub pages_failed: u64,

    pub items_seen: u64,
    pub items_inserted: u64,

    /// Items skipped because their detail URL is already stored
    pub items_duplicate: u64,

    /// Items skipped because no usable category could be resolved
    pub items_unresolved_category: u64,

    /// Listing entries too broken to use (e.g. no title link)
    pub items_malformed: u64,

    /// Items whose detail page could not be fetched
    pub items_fetch_failed: u64,

    /// Items dropped because the store returned an error
    pub items_store_error: u64,

    /// Items left unprocessed because the run was cancelled
    pub items_cancelled: u64,

    pub duration: Duration,
}

impl Default for CrawlReport {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlReport {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Running,
            categories_added: 0,
            pages_visited: 0,
            pages_empty: 0,
            pages_failed: 0,
            items_seen: 0,
            items_inserted: 0,
            items_duplicate: 0,
            items_unresolved_category: 0,
            items_malformed: 0,
            items_fetch_failed: 0,
            items_store_error: 0,
            items_cancelled: 0,
            duration: Duration::ZERO,
        }
    }

    /// Items that were skipped, failed, or never processed
    pub fn items_not_inserted(&self) -> u64 {
        self.items_duplicate
            + self.items_unresolved_category
            + self.items_malformed
            + self.items_fetch_failed
            + self.items_store_error
            + self.items_cancelled
    }

    /// Every item seen lands in exactly one outcome counter
    pub fn is_balanced(&self) -> bool {
        self.items_seen == self.items_inserted + self.items_not_inserted()
    }

    /// True if anything went wrong, as opposed to there being nothing new
    pub fn has_failures(&self) -> bool {
        self.pages_failed > 0
            || self.items_fetch_failed > 0
            || self.items_store_error > 0
            || self.items_malformed > 0
    }

    /// Renders the report for the operator console
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== Crawl Report ({}) ===\n\n", self.status));
        out.push_str(&format!("Duration: {:.1}s\n\n", self.duration.as_secs_f64()));

        out.push_str("Categories:\n");
        out.push_str(&format!("  Added: {}\n\n", self.categories_added));

        out.push_str("Listing pages:\n");
        out.push_str(&format!("  Visited: {}\n", self.pages_visited));
        out.push_str(&format!("  Empty: {}\n", self.pages_empty));
        out.push_str(&format!("  Failed: {}\n\n", self.pages_failed));

        out.push_str("Books:\n");
        out.push_str(&format!("  Seen: {}\n", self.items_seen));
        out.push_str(&format!("  Inserted: {}\n", self.items_inserted));
        out.push_str(&format!("  Skipped (duplicate): {}\n", self.items_duplicate));
        out.push_str(&format!(
            "  Skipped (unresolved category): {}\n",
            self.items_unresolved_category
        ));
        out.push_str(&format!("  Skipped (malformed): {}\n", self.items_malformed));
        out.push_str(&format!("  Failed (fetch error): {}\n", self.items_fetch_failed));
        out.push_str(&format!("  Failed (store error): {}\n", self.items_store_error));
        if self.items_cancelled > 0 {
            out.push_str(&format!("  Not processed (cancelled): {}\n", self.items_cancelled));
        }

        if self.has_failures() {
            out.push_str("\nSome pages or items failed; see the failure log.\n");
        } else if self.items_inserted == 0 {
            out.push_str("\nNothing new to ingest.\n");
        }

        out
    }
}

/// Prints the report to stdout
pub fn print_report(report: &CrawlReport) {
    print!("{}", report.render());
}
