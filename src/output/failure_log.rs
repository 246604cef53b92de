//! Permanently failed URLs for operator follow-up
//!
//! The log is append-only for the duration of a run and shared by every item
//! worker. At the end of the run it is written once as a plain
//! newline-delimited list; the crawl never reads it back.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Suffix added to the artifact path when the run was cancelled
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Ordered, append-only list of URLs that exhausted retry
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    urls: Arc<Mutex<Vec<String>>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failed URL
    pub fn record(&self, url: impl Into<String>) {
        let url = url.into();
        tracing::debug!("Recording failed URL: {}", url);
        // A poisoned lock still holds a usable list
        let mut urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());
        urls.push(url);
    }

    pub fn len(&self) -> usize {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the recorded URLs in insertion order
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Writes the log to `path` if it has entries
    ///
    /// A partial run writes to `path` + `.partial` instead. Returns the path
    /// written, or `None` when there was nothing to write.
    pub fn flush(&self, path: &Path, partial: bool) -> std::io::Result<Option<PathBuf>> {
        let urls = self.urls();
        if urls.is_empty() {
            return Ok(None);
        }

        let target = if partial {
            let mut name = path.as_os_str().to_owned();
            name.push(PARTIAL_SUFFIX);
            PathBuf::from(name)
        } else {
            path.to_path_buf()
        };

        let mut content = urls.join("\n");
        content.push('\n');
        std::fs::write(&target, content)?;

        tracing::info!("Wrote {} failed URLs to {}", urls.len(), target.display());
        Ok(Some(target))
    }
}
