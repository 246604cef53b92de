//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small catalogue and run the full
//! ingestion cycle end-to-end against a SQLite store in a temp directory.

use shelf_harvest::config::{parse_config, Config};
use shelf_harvest::crawler::{Coordinator, CrawlPhase};
use shelf_harvest::output::{CrawlReport, PARTIAL_SUFFIX};
use shelf_harvest::storage::{BookStore, RunStatus, SqliteBookStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A mock catalogue site plus a scratch directory for the store and failure log
struct Harness {
    server: MockServer,
    dir: TempDir,
    store: Arc<SqliteBookStore>,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteBookStore::new(&dir.path().join("books.db")).expect("Failed to open store"),
        );
        Self { server, dir, store }
    }

    fn failure_log_path(&self) -> PathBuf {
        self.dir.path().join("failed_urls.txt")
    }

    /// Builds a config pointing at the mock server; `crawler` adds keys to `[crawler]`
    fn config(&self, crawler: &str) -> Config {
        let backoff = if crawler.contains("retry-backoff-ms") {
            ""
        } else {
            "retry-backoff-ms = 1"
        };
        parse_config(&format!(
            r#"
[target]
base-url = "{base}/"

[crawler]
workers = 2
{backoff}
{crawler}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
failure-log-path = "{log}"
"#,
            base = self.server.uri(),
            backoff = backoff,
            crawler = crawler,
            db = self.dir.path().join("books.db").display(),
            log = self.failure_log_path().display(),
        ))
        .expect("Test config should be valid")
    }

    async fn run(&self, crawler: &str) -> CrawlReport {
        self.run_with(crawler, CancellationToken::new()).await
    }

    async fn run_with(&self, crawler: &str, cancel: CancellationToken) -> CrawlReport {
        let store: Arc<dyn BookStore> = self.store.clone();
        let mut coordinator = Coordinator::new(self.config(crawler), store, cancel)
            .expect("Failed to create coordinator");
        let report = coordinator.run().await.expect("Crawl failed");
        assert_eq!(coordinator.phase(), CrawlPhase::Done);
        report
    }

    async fn serve(&self, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(body)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&self.server)
            .await;
    }

    async fn serve_index(&self, categories: &[&str]) {
        self.serve("/", 200, index_page(categories)).await;
    }

    /// Serves a detail page whose breadcrumb files the book under `trail`
    async fn serve_detail(&self, slug: &str, trail: &[&str], expected_hits: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/catalogue/{}/index.html", slug)))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(trail)))
            .expect(expected_hits)
            .mount(&self.server)
            .await;
    }

    /// Title, category name and rating of every stored book
    fn stored_books(&self) -> Vec<(String, String, Option<String>)> {
        let conn = rusqlite::Connection::open(self.dir.path().join("books.db"))
            .expect("Failed to open DB");
        let mut stmt = conn
            .prepare(
                "SELECT b.title, c.name, b.rating FROM books b
                 JOIN categories c ON c.id = b.category_id ORDER BY b.id",
            )
            .unwrap();
        let books = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        books
    }
}

fn index_page(categories: &[&str]) -> String {
    let links: String = categories
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                r#"<li><a href="catalogue/category/books/{}_{}/index.html">{}</a></li>"#,
                name.to_lowercase(),
                i + 2,
                name
            )
        })
        .collect();

    format!(
        r#"<html><body><div class="side_categories"><ul class="nav nav-list">
           <li><a href="catalogue/category/books_1/index.html">Books</a><ul>{}</ul></li>
           </ul></div></body></html>"#,
        links
    )
}

/// A listing page with one product per (title attribute, detail slug)
fn listing_page(books: &[(&str, &str)]) -> String {
    let products: String = books
        .iter()
        .map(|(title, slug)| {
            format!(
                r#"<li><article class="product_pod">
                     <p class="star-rating Three"><i class="icon-star"></i></p>
                     <h3><a href="../../{slug}/index.html" title="{title}">{title}</a></h3>
                     <div class="product_price">
                       <p class="price_color">£12.34</p>
                       <p class="instock availability"><i class="icon-ok"></i> In stock</p>
                     </div>
                   </article></li>"#
            )
        })
        .collect();

    format!(
        r#"<html><body><ol class="row">{}</ol></body></html>"#,
        products
    )
}

fn detail_page(trail: &[&str]) -> String {
    let entries: String = trail
        .iter()
        .map(|entry| format!("<li><a href=\"#\">{}</a></li>", entry))
        .collect();
    format!(
        r#"<html><body><ul class="breadcrumb">{}</ul><div class="product_main"></div></body></html>"#,
        entries
    )
}

#[tokio::test]
async fn test_full_crawl_inserts_books() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry", "Mystery"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984"), ("Sharp Objects", "sharp-objects_997")]),
    )
    .await;
    h.serve(
        "/catalogue/page-2.html",
        200,
        listing_page(&[("The Black Maria", "the-black-maria_991")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;
    h.serve_detail(
        "sharp-objects_997",
        &["Home", "Books", "Mystery", "Sharp Objects"],
        1,
    )
    .await;
    h.serve_detail(
        "the-black-maria_991",
        &["Home", "Books", "Poetry", "The Black Maria"],
        1,
    )
    .await;

    let report = h.run("").await;

    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.categories_added, 2);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.pages_empty, 2);
    assert_eq!(report.items_seen, 3);
    assert_eq!(report.items_inserted, 3);
    assert!(report.is_balanced());

    assert_eq!(h.store.count_books().unwrap(), 3);
    assert_eq!(h.store.count_categories().unwrap(), 2);

    let books = h.stored_books();
    assert!(books.contains(&(
        "Sharp Objects".to_string(),
        "Mystery".to_string(),
        Some("Three".to_string())
    )));

    let run = h.store.latest_run().unwrap().expect("Run should be recorded");
    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(run.items_inserted, 3);
    assert_eq!(run.pages_empty, 2);
    assert!(run.is_balanced());

    assert!(!h.failure_log_path().exists());
}

#[tokio::test]
async fn test_second_run_inserts_nothing() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984"), ("Tipping", "tipping_990")]),
    )
    .await;
    // Each detail page is fetched by the first run only
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;
    h.serve_detail("tipping_990", &["Home", "Books", "Poetry", "Tipping"], 1)
        .await;

    let first = h.run("").await;
    assert_eq!(first.items_inserted, 2);

    let second = h.run("").await;
    assert_eq!(second.status, RunStatus::Complete);
    assert_eq!(second.categories_added, 0);
    assert_eq!(second.items_inserted, 0);
    assert_eq!(second.items_duplicate, 2);
    assert!(second.is_balanced());
    assert_eq!(h.store.count_books().unwrap(), 2);
}

#[tokio::test]
async fn test_repeated_listing_entry_fetched_once() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984")]),
    )
    .await;
    h.serve(
        "/catalogue/page-2.html",
        200,
        listing_page(&[("Olio", "olio_984")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;

    let report = h.run("").await;

    assert_eq!(report.items_seen, 2);
    assert_eq!(report.items_inserted, 1);
    assert_eq!(report.items_duplicate, 1);
    assert_eq!(h.store.count_books().unwrap(), 1);
}

#[tokio::test]
async fn test_detail_retry_exhaustion_is_logged_once() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984"), ("Broken", "broken_1")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/broken_1/index.html"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&h.server)
        .await;

    let report = h.run("max-retries = 3").await;

    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.items_inserted, 1);
    assert_eq!(report.items_fetch_failed, 1);
    assert!(report.is_balanced());

    let log = std::fs::read_to_string(h.failure_log_path()).expect("Failure log missing");
    let broken = format!("{}/catalogue/broken_1/index.html", h.server.uri());
    assert_eq!(log.lines().filter(|line| *line == broken).count(), 1);
}

#[tokio::test]
async fn test_not_found_detail_is_not_retried() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Gone", "gone_1")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/gone_1/index.html"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.run("max-retries = 3").await;
    assert_eq!(report.items_fetch_failed, 1);
}

#[tokio::test]
async fn test_short_breadcrumb_is_skipped() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Orphan", "orphan_1")]),
    )
    .await;
    h.serve_detail("orphan_1", &["Home", "Orphan"], 1).await;

    let report = h.run("").await;

    assert_eq!(report.items_inserted, 0);
    assert_eq!(report.items_unresolved_category, 1);
    assert_eq!(h.store.count_books().unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_category_is_skipped() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Dracula", "dracula_1"), ("Olio", "olio_984")]),
    )
    .await;
    h.serve_detail("dracula_1", &["Home", "Books", "Horror", "Dracula"], 1)
        .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;

    let report = h.run("").await;

    assert_eq!(report.items_inserted, 1);
    assert_eq!(report.items_unresolved_category, 1);
    assert!(!h.store.category_exists("Horror").unwrap());
}

#[tokio::test]
async fn test_failed_listing_page_does_not_stop_crawl() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-1.html"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&h.server)
        .await;
    h.serve(
        "/catalogue/page-2.html",
        200,
        listing_page(&[("Olio", "olio_984")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;

    let report = h.run("max-retries = 2").await;

    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.items_inserted, 1);

    let log = std::fs::read_to_string(h.failure_log_path()).expect("Failure log missing");
    assert!(log.contains("/catalogue/page-1.html"));
}

#[tokio::test]
async fn test_missing_index_keeps_stored_categories() {
    let h = Harness::start().await;
    h.store
        .insert_category(&shelf_harvest::CategoryRef {
            name: "Poetry".to_string(),
            source_url: String::new(),
        })
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;

    let report = h.run("max-retries = 1").await;

    assert_eq!(report.categories_added, 0);
    assert_eq!(report.items_inserted, 1);
}

#[tokio::test]
async fn test_max_pages_bounds_the_walk() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-2.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[])))
        .expect(0)
        .mount(&h.server)
        .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;

    let report = h.run("max-pages = 1").await;

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.pages_empty, 0);
    assert_eq!(report.items_inserted, 1);
}

#[tokio::test]
async fn test_walk_stops_after_empty_pages() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve("/catalogue/page-1.html", 200, listing_page(&[])).await;
    h.serve("/catalogue/page-2.html", 200, listing_page(&[])).await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-3.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[])))
        .expect(0)
        .mount(&h.server)
        .await;

    let report = h.run("empty-page-threshold = 2\nprefetch-pages = 0").await;

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.pages_empty, 2);
    assert_eq!(report.items_seen, 0);
}

#[tokio::test]
async fn test_failed_page_breaks_empty_run() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve("/catalogue/page-1.html", 200, listing_page(&[])).await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-2.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    h.serve("/catalogue/page-3.html", 200, listing_page(&[])).await;
    h.serve(
        "/catalogue/page-4.html",
        200,
        listing_page(&[("Olio", "olio_984")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;

    let report = h
        .run("max-pages = 4\nprefetch-pages = 0\nempty-page-threshold = 2\nmax-retries = 1")
        .await;

    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.pages_empty, 2);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.items_inserted, 1);
}

#[tokio::test]
async fn test_entities_stored_decoded() {
    let h = Harness::start().await;
    h.serve_index(&["Classics"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Sense &amp; Sensibility", "sense-and-sensibility_1")]),
    )
    .await;
    h.serve_detail(
        "sense-and-sensibility_1",
        &["Home", "Books", "Classics", "Sense &amp; Sensibility"],
        1,
    )
    .await;

    let report = h.run("").await;
    assert_eq!(report.items_inserted, 1);

    let books = h.stored_books();
    assert_eq!(books[0].0, "Sense & Sensibility");
    assert!(h.store.titles_with_entities().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_requests() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_page(&["Poetry"])))
        .expect(0)
        .mount(&h.server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = h.run_with("", cancel).await;

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.pages_visited, 0);

    let run = h.store.latest_run().unwrap().expect("Run should be recorded");
    assert_eq!(run.status, RunStatus::Partial);
}

#[tokio::test]
async fn test_cancel_mid_run_writes_partial_log() {
    let h = Harness::start().await;
    h.serve_index(&["Poetry"]).await;
    h.serve(
        "/catalogue/page-1.html",
        200,
        listing_page(&[("Olio", "olio_984"), ("Flaky", "flaky_1")]),
    )
    .await;
    h.serve_detail("olio_984", &["Home", "Books", "Poetry", "Olio"], 1)
        .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/flaky_1/index.html"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&h.server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    // The retry backoff is long enough that cancellation lands during it
    let report = h
        .run_with("max-retries = 3\nretry-backoff-ms = 5000", cancel)
        .await;

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.items_inserted, 1);
    assert_eq!(report.items_fetch_failed, 1);
    assert!(report.is_balanced());

    let mut partial = h.failure_log_path().into_os_string();
    partial.push(PARTIAL_SUFFIX);
    let log = std::fs::read_to_string(PathBuf::from(partial)).expect("Partial log missing");
    assert!(log.contains("/catalogue/flaky_1/index.html"));
    assert!(!h.failure_log_path().exists());
}
