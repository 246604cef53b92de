//! Output module for run reporting
//!
//! This module handles:
//! - The per-run crawl report shown to the operator
//! - The failed-URL artifact written at the end of a run
//! - Statistics about what the book store holds

mod failure_log;
mod report;
pub mod stats;

pub use failure_log::{FailureLog, PARTIAL_SUFFIX};
pub use report::{print_report, CrawlReport};
pub use stats::{load_statistics, print_statistics, StoreStatistics};
