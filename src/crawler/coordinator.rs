//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives one ingestion run through its phases:
//! - Validating configuration (`Init`)
//! - Reading the category index and storing new categories
//! - Walking listing pages, with a small prefetch window
//! - Fanning each page's items out to a bounded worker pool and joining them
//! - Flushing the failure log and the run report
//!
//! Nothing below this level aborts a run. Fetch, parse and store problems
//! become counters in the [`CrawlReport`] and entries in the [`FailureLog`].

use crate::config::{validate, Config};
use crate::crawler::catalog::discover_categories;
use crate::crawler::dedup::DedupGuard;
use crate::crawler::detail::{resolve_category, MissingCategoryError};
use crate::crawler::fetcher::{build_http_client, FetchError, Fetcher, RetryPolicy};
use crate::crawler::parser::parse_listing;
use crate::crawler::phase::CrawlPhase;
use crate::model::{RawItem, ResolvedRecord};
use crate::output::{CrawlReport, FailureLog};
use crate::storage::{BookStore, InsertOutcome, RunStatus};
use crate::url::{catalogue_base, index_url, listing_page_url};
use crate::HarvestError;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

/// How one listing entry ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Inserted,
    Duplicate,
    UnresolvedCategory,
    FetchFailed,
    StoreError,
    Cancelled,
}

/// Everything an item worker needs, shared by all workers of a run
struct ItemWorker {
    fetcher: Fetcher,
    store: Arc<dyn BookStore>,
    dedup: DedupGuard,
    failures: FailureLog,
    cancel: CancellationToken,
}

impl ItemWorker {
    /// Dedup check, detail fetch, category resolution and insert for one item
    async fn process(&self, item: RawItem) -> ItemOutcome {
        match self.dedup.check(&item.detail_url) {
            Ok(verdict) if verdict.is_duplicate() => {
                tracing::debug!("Skipping duplicate: {} ({:?})", item.title, verdict);
                return ItemOutcome::Duplicate;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Dedup check failed for {}: {}", item.detail_url, e);
                return ItemOutcome::StoreError;
            }
        }

        if self.cancel.is_cancelled() {
            return ItemOutcome::Cancelled;
        }

        let html = match self.fetcher.fetch(&item.detail_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Detail page unavailable for '{}': {}", item.title, e);
                self.failures.record(e.url);
                return ItemOutcome::FetchFailed;
            }
        };

        let category_name = match resolve_category(&html) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(
                    "Failed to extract category for '{}' | {}: {}",
                    item.title,
                    item.detail_url,
                    e
                );
                return ItemOutcome::UnresolvedCategory;
            }
        };

        let category_id = match self.store.category_id(&category_name) {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!(
                    "Skipping '{}': {}",
                    item.title,
                    MissingCategoryError::UnknownCategory(category_name)
                );
                return ItemOutcome::UnresolvedCategory;
            }
            Err(e) => {
                tracing::error!("Category lookup failed for '{}': {}", category_name, e);
                return ItemOutcome::StoreError;
            }
        };

        let record = ResolvedRecord::new(item, category_name);
        match self.store.insert_book(&record, category_id) {
            Ok(InsertOutcome::Inserted(id)) => {
                tracing::debug!(
                    "Inserted '{}' in '{}' as book {}",
                    record.item.title,
                    record.category_name,
                    id
                );
                ItemOutcome::Inserted
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!("Store already had {}", record.item.detail_url);
                ItemOutcome::Duplicate
            }
            Err(e) => {
                tracing::error!("Insert failed for {}: {}", record.item.detail_url, e);
                ItemOutcome::StoreError
            }
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    store: Arc<dyn BookStore>,
    fetcher: Fetcher,
    worker: Arc<ItemWorker>,
    failures: FailureLog,
    cancel: CancellationToken,
    phase: CrawlPhase,
    report: CrawlReport,
    index_url: Url,
    catalogue: Url,
    config_hash: String,
}

impl Coordinator {
    /// Creates a coordinator in the `Init` phase
    ///
    /// Validates the configuration; this is the only point where a run can
    /// fail outright.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `store` - The book store to reconcile against and insert into
    /// * `cancel` - Token an operator can cancel to stop the run early
    pub fn new(
        config: Config,
        store: Arc<dyn BookStore>,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        validate(&config)?;

        let index_url = index_url(&config.target)?;
        let catalogue = catalogue_base(&config.target)?;

        let client = build_http_client(&config.user_agent, &config.crawler)?;
        let fetcher = Fetcher::new(
            client,
            RetryPolicy::from_config(&config.crawler),
            cancel.clone(),
        );

        let failures = FailureLog::new();
        let worker = Arc::new(ItemWorker {
            fetcher: fetcher.clone(),
            store: Arc::clone(&store),
            dedup: DedupGuard::new(Arc::clone(&store)),
            failures: failures.clone(),
            cancel: cancel.clone(),
        });

        Ok(Self {
            config: Arc::new(config),
            store,
            fetcher,
            worker,
            failures,
            cancel,
            phase: CrawlPhase::Init,
            report: CrawlReport::new(),
            index_url,
            catalogue,
            config_hash: String::new(),
        })
    }

    /// Sets the configuration hash recorded with the run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// URLs that failed permanently so far
    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Runs the crawl to completion (or cancellation) and returns its report
    ///
    /// 1. Stores categories from the index that the store lacks
    /// 2. Walks listing pages until the page bound, the empty-page threshold,
    ///    the failed-page limit, or cancellation
    /// 3. Writes the failure artifact and records the run
    pub async fn run(&mut self) -> Result<CrawlReport, HarvestError> {
        let started = Instant::now();
        tracing::info!("Starting crawl of {}", self.index_url);

        let run_id = match self.store.begin_run(&self.config_hash) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!("Could not record run start: {}", e);
                None
            }
        };

        self.transition(CrawlPhase::CrawlingCategories)?;
        self.crawl_categories().await;

        // Every category insert has completed before any book work starts
        self.transition(CrawlPhase::CrawlingPages)?;
        self.crawl_pages().await;

        self.transition(CrawlPhase::Draining)?;
        self.drain(started, run_id);

        self.transition(CrawlPhase::Done)?;
        Ok(self.report.clone())
    }

    fn transition(&mut self, next: CrawlPhase) -> Result<(), HarvestError> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Fetches the category index and inserts categories new to the store
    async fn crawl_categories(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }

        let html = match self.fetcher.fetch(self.index_url.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(
                    "Category index unavailable, continuing with stored categories: {}",
                    e
                );
                self.failures.record(e.url);
                return;
            }
        };

        let new_categories = match discover_categories(&html, &self.index_url, self.store.as_ref())
        {
            Ok(categories) => categories,
            Err(e) => {
                tracing::error!("Could not read existing categories: {}", e);
                return;
            }
        };

        for category in &new_categories {
            match self.store.insert_category(category) {
                Ok(id) => {
                    tracing::debug!("Added category '{}' ({})", category.name, id);
                    self.report.categories_added += 1;
                }
                Err(e) => tracing::error!("Failed to add category '{}': {}", category.name, e),
            }
        }

        tracing::info!("Added {} categories", self.report.categories_added);
    }

    /// Walks listing pages with up to `prefetch-pages` fetches running ahead
    async fn crawl_pages(&mut self) {
        let crawler = &self.config.crawler;
        let max_pages = crawler.max_pages;
        let window = 1 + crawler.prefetch_pages as usize;
        let empty_threshold = crawler.empty_page_threshold;
        let max_failed = crawler.max_failed_pages;

        let mut pending: VecDeque<(u32, String, JoinHandle<Result<String, FetchError>>)> =
            VecDeque::new();
        let mut next_page: u32 = 1;
        let mut consecutive_empty = 0;
        let mut consecutive_failed = 0;

        loop {
            while pending.len() < window
                && !self.cancel.is_cancelled()
                && max_pages.map_or(true, |max| next_page <= max)
            {
                let url = match listing_page_url(
                    &self.catalogue,
                    &self.config.target.listing_pattern,
                    next_page,
                ) {
                    Ok(url) => url.to_string(),
                    Err(e) => {
                        tracing::error!("Cannot build URL for listing page {}: {}", next_page, e);
                        break;
                    }
                };

                let fetcher = self.fetcher.clone();
                let target = url.clone();
                let handle = tokio::spawn(async move { fetcher.fetch(&target).await });
                pending.push_back((next_page, url, handle));
                next_page += 1;
            }

            let Some((page, url, handle)) = pending.pop_front() else {
                break;
            };

            tracing::info!("Scraping {}", url);
            let fetched = handle.await.unwrap_or_else(|e| {
                Err(FetchError {
                    url: url.clone(),
                    last_cause: format!("fetch task ended abnormally: {}", e),
                    status: None,
                    attempts: 0,
                })
            });

            match fetched {
                Err(e) if e.is_not_found() => {
                    tracing::info!("Listing page {} does not exist", page);
                    self.report.pages_empty += 1;
                    consecutive_empty += 1;
                    consecutive_failed = 0;
                }
                Err(e) => {
                    tracing::warn!("Skipping listing page {}: {}", page, e);
                    self.failures.record(e.url);
                    self.report.pages_failed += 1;
                    consecutive_failed += 1;
                    // An empty run only counts back-to-back empty pages
                    consecutive_empty = 0;
                }
                Ok(html) => {
                    self.report.pages_visited += 1;
                    consecutive_failed = 0;

                    let (entries, items) = self.parse_page(&html, page);
                    if entries == 0 {
                        tracing::info!("Listing page {} has no items", page);
                        self.report.pages_empty += 1;
                        consecutive_empty += 1;
                    } else {
                        consecutive_empty = 0;
                    }

                    // Later pages keep downloading while this page's items are processed
                    if !items.is_empty() {
                        self.process_items(items).await;
                    }
                }
            }

            if consecutive_empty >= empty_threshold {
                tracing::info!(
                    "Stopping after {} consecutive empty listing pages",
                    consecutive_empty
                );
                break;
            }

            if consecutive_failed >= max_failed {
                tracing::warn!(
                    "Stopping after {} consecutive failed listing pages",
                    consecutive_failed
                );
                break;
            }

            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, no further pages will be fetched");
                break;
            }
        }

        for (page, _, handle) in pending {
            tracing::debug!("Abandoning prefetch of listing page {}", page);
            handle.abort();
        }
    }

    /// Parses a listing page, counting malformed entries
    ///
    /// Returns the number of entries found and the usable items among them.
    fn parse_page(&mut self, html: &str, page: u32) -> (usize, Vec<RawItem>) {
        let entries = match parse_listing(html, &self.catalogue) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Cannot parse listing page {}: {}", page, e);
                return (0, Vec::new());
            }
        };

        let count = entries.len();
        self.report.items_seen += count as u64;

        let mut items = Vec::with_capacity(count);
        for entry in entries {
            match entry {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!("Skipping entry on listing page {}: {}", page, e);
                    self.report.items_malformed += 1;
                }
            }
        }

        (count, items)
    }

    /// Fans items out to the worker pool and joins every worker
    async fn process_items(&mut self, items: Vec<RawItem>) {
        let semaphore = Arc::new(Semaphore::new(self.config.crawler.workers as usize));
        let mut workers = JoinSet::new();
        let total = items.len();
        let mut dispatched = 0;

        for item in items {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if self.cancel.is_cancelled() {
                break;
            }

            let worker = Arc::clone(&self.worker);
            workers.spawn(async move {
                let _permit = permit;
                worker.process(item).await
            });
            dispatched += 1;
        }

        let undispatched = (total - dispatched) as u64;
        if undispatched > 0 {
            tracing::info!("{} items left unprocessed after cancellation", undispatched);
            self.report.items_cancelled += undispatched;
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => self.record_outcome(outcome),
                Err(e) => {
                    tracing::error!("Item worker ended abnormally: {}", e);
                    self.report.items_store_error += 1;
                }
            }
        }
    }

    fn record_outcome(&mut self, outcome: ItemOutcome) {
        let report = &mut self.report;
        match outcome {
            ItemOutcome::Inserted => report.items_inserted += 1,
            ItemOutcome::Duplicate => report.items_duplicate += 1,
            ItemOutcome::UnresolvedCategory => report.items_unresolved_category += 1,
            ItemOutcome::FetchFailed => report.items_fetch_failed += 1,
            ItemOutcome::StoreError => report.items_store_error += 1,
            ItemOutcome::Cancelled => report.items_cancelled += 1,
        }
    }

    /// Flushes the failure log and records the finished run
    fn drain(&mut self, started: Instant, run_id: Option<i64>) {
        let partial = self.cancel.is_cancelled();
        self.report.status = if partial {
            RunStatus::Partial
        } else {
            RunStatus::Complete
        };
        self.report.duration = started.elapsed();

        let path = Path::new(&self.config.output.failure_log_path);
        if let Err(e) = self.failures.flush(path, partial) {
            tracing::error!("Failed to write failure log {}: {}", path.display(), e);
        }

        if let Some(run_id) = run_id {
            if let Err(e) = self.store.finish_run(run_id, &self.report) {
                tracing::error!("Could not record run {}: {}", run_id, e);
            }
        }

        tracing::info!(
            "Crawl {}: {} books inserted, {} duplicates, {} unresolved, {} failed",
            self.report.status,
            self.report.items_inserted,
            self.report.items_duplicate,
            self.report.items_unresolved_category,
            self.report.items_fetch_failed
        );
    }
}

/// Runs a complete crawl against `store`
///
/// # Example
///
/// ```no_run
/// use shelf_harvest::config::load_config;
/// use shelf_harvest::crawler::run_crawl;
/// use shelf_harvest::storage::SqliteBookStore;
/// use std::path::Path;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let store = Arc::new(SqliteBookStore::new(Path::new(&config.output.database_path))?);
/// let report = run_crawl(config, store, CancellationToken::new()).await?;
/// println!("{} books inserted", report.items_inserted);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    store: Arc<dyn BookStore>,
    cancel: CancellationToken,
) -> Result<CrawlReport, HarvestError> {
    let mut coordinator = Coordinator::new(config, store, cancel)?;
    coordinator.run().await
}
