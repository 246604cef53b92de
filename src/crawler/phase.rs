//! Crawl run state machine

use std::fmt;

/// Phases of a crawl run
///
/// A run moves strictly forward through these phases. Cancellation does not
/// add a phase; it ends `CrawlingPages` early and the run still drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Configuration is being validated
    Init,

    /// The category index is being read and new categories stored
    CrawlingCategories,

    /// Listing pages are being walked and items ingested
    CrawlingPages,

    /// Outstanding work is joined, the failure log and report flushed
    Draining,

    /// Terminal
    Done,
}

impl CrawlPhase {
    /// Returns true if a run may move from this phase to `next`
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::CrawlingCategories)
                | (Self::CrawlingCategories, Self::CrawlingPages)
                | (Self::CrawlingPages, Self::Draining)
                | (Self::Draining, Self::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CrawlingCategories => "crawling_categories",
            Self::CrawlingPages => "crawling_pages",
            Self::Draining => "draining",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
