//! URL construction for the catalogue site
//!
//! The category index lives at the configured base URL, listing pages and
//! detail pages live under the catalogue path below it.

use crate::config::TargetConfig;
use url::{ParseError, Url};

/// Placeholder in the listing pattern replaced by the page number
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Parses the configured base URL (the category index location)
pub fn index_url(target: &TargetConfig) -> Result<Url, ParseError> {
    Url::parse(&target.base_url)
}

/// Resolves the catalogue location that listing and detail links hang off
///
/// # Example
///
/// ```
/// use shelf_harvest::config::TargetConfig;
/// use shelf_harvest::url::catalogue_base;
///
/// let target = TargetConfig {
///     base_url: "https://books.toscrape.com/".to_string(),
///     catalogue_path: "catalogue/".to_string(),
///     listing_pattern: "page-{page}.html".to_string(),
/// };
/// let base = catalogue_base(&target).unwrap();
/// assert_eq!(base.as_str(), "https://books.toscrape.com/catalogue/");
/// ```
pub fn catalogue_base(target: &TargetConfig) -> Result<Url, ParseError> {
    index_url(target)?.join(&target.catalogue_path)
}

/// Builds the URL of listing page `page` (1-based)
pub fn listing_page_url(catalogue: &Url, pattern: &str, page: u32) -> Result<Url, ParseError> {
    catalogue.join(&pattern.replace(PAGE_PLACEHOLDER, &page.to_string()))
}

/// Resolves a detail link from a listing entry to an absolute URL
///
/// Path-escaping `../` segments are stripped before joining, so a link written
/// relative to any page depth lands under the catalogue base. Returns `None`
/// for empty links or links that do not resolve to http(s).
pub fn resolve_detail_url(href: &str, catalogue: &Url) -> Option<Url> {
    let href = href.trim().replace("../", "");
    resolve_href(&href, catalogue)
}

/// Resolves an href against a base, accepting only http(s) results
pub fn resolve_href(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    match base.join(href) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url),
        _ => None,
    }
}
