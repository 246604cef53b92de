//! Crawler module for catalogue fetching and ingestion
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with bounded retry
//! - Listing page and detail page parsing
//! - Category discovery and dedup checks
//! - Overall crawl coordination

mod catalog;
mod coordinator;
mod dedup;
mod detail;
mod fetcher;
mod parser;
mod phase;

pub use catalog::{discover_categories, parse_category_index, reconcile};
pub use coordinator::{run_crawl, Coordinator, ItemOutcome};
pub use dedup::{DedupGuard, DedupVerdict};
pub use detail::{
    breadcrumb_trail, category_from_trail, resolve_category, MissingCategoryError,
    MIN_BREADCRUMB_LEN,
};
pub use fetcher::{
    build_http_client, classify_status, FailureKind, FetchError, Fetcher, RetryPolicy,
};
pub use parser::{decode_entities, parse_listing, ListingDocument, ParseStructureError};
pub use phase::CrawlPhase;
