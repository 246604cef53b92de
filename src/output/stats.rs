//! Statistics generation from the book store
//!
//! This module provides functionality for extracting and displaying
//! what the store currently holds.

use crate::storage::{BookStore, RunRecord, StorageResult};

/// Book store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    pub total_books: u64,
    pub total_categories: u64,

    /// Book count per category, largest first
    pub books_per_category: Vec<(String, u64)>,

    /// Most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

impl StoreStatistics {
    /// Categories that no book references yet
    pub fn empty_categories(&self) -> usize {
        self.books_per_category
            .iter()
            .filter(|(_, count)| *count == 0)
            .count()
    }
}

/// Loads statistics from the store
pub fn load_statistics(store: &dyn BookStore) -> StorageResult<StoreStatistics> {
    Ok(StoreStatistics {
        total_books: store.count_books()?,
        total_categories: store.count_categories()?,
        books_per_category: store.books_per_category()?,
        latest_run: store.latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Book Store Statistics ===\n");

    println!("Overview:");
    println!("  Books: {}", stats.total_books);
    println!(
        "  Categories: {} ({} without books)",
        stats.total_categories,
        stats.empty_categories()
    );
    println!();

    if !stats.books_per_category.is_empty() {
        println!("Books by Category:");
        for (name, count) in &stats.books_per_category {
            let percentage = if stats.total_books > 0 {
                (*count as f64 / stats.total_books as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", name, count, percentage);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Status: {}", run.status);
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Config hash: {}", run.config_hash);
            println!("  Categories added: {}", run.categories_added);
            println!(
                "  Pages: {} visited, {} empty, {} failed",
                run.pages_visited, run.pages_empty, run.pages_failed
            );
            println!(
                "  Books: {} seen, {} inserted, {} duplicate, {} unresolved, {} failed",
                run.items_seen,
                run.items_inserted,
                run.items_duplicate,
                run.items_unresolved_category,
                run.items_fetch_failed
            );
        }
        None => println!("No crawl runs recorded."),
    }
}
