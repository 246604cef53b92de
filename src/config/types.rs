use serde::Deserialize;

/// Main configuration structure for Shelf-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// The catalogue site being crawled
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Site root; the category index is fetched from here
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the catalogue relative to the base URL
    ///
    /// Listing pages and detail links are resolved against this location.
    #[serde(rename = "catalogue-path", default = "default_catalogue_path")]
    pub catalogue_path: String,

    /// Listing page file name with a `{page}` placeholder
    #[serde(rename = "listing-pattern", default = "default_listing_pattern")]
    pub listing_pattern: String,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Upper bound on listing pages; absent means crawl until empty
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Consecutive empty listing pages that end the crawl
    #[serde(rename = "empty-page-threshold", default = "default_empty_page_threshold")]
    pub empty_page_threshold: u32,

    /// Consecutive terminally failed listing pages that end the crawl
    #[serde(rename = "max-failed-pages", default = "default_max_failed_pages")]
    pub max_failed_pages: u32,

    /// Total attempts per URL
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts (milliseconds), doubled on each retry
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Timeout for a single request attempt (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for establishing a connection (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Size of the item worker pool
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Listing pages fetched ahead of the one being processed
    #[serde(rename = "prefetch-pages", default = "default_prefetch_pages")]
    pub prefetch_pages: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            empty_page_threshold: default_empty_page_threshold(),
            max_failed_pages: default_max_failed_pages(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            workers: default_workers(),
            prefetch_pages: default_prefetch_pages(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Where permanently failed URLs are written at the end of a run
    #[serde(rename = "failure-log-path")]
    pub failure_log_path: String,
}

fn default_catalogue_path() -> String {
    "catalogue/".to_string()
}

fn default_listing_pattern() -> String {
    "page-{page}.html".to_string()
}

fn default_empty_page_threshold() -> u32 {
    2
}

fn default_max_failed_pages() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_workers() -> u32 {
    4
}

fn default_prefetch_pages() -> u32 {
    1
}
