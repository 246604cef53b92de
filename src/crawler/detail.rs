//! Detail page resolver
//!
//! A detail page carries a breadcrumb trail such as
//! `Home > Books > Poetry > A Light in the Attic`. The category is the entry
//! immediately before the leaf; a trail shorter than three entries names no
//! category and the item is skipped rather than filed under a default.

use scraper::{Html, Selector};
use thiserror::Error;

/// Fewest breadcrumb entries that can name a category: home, category, leaf
pub const MIN_BREADCRUMB_LEN: usize = 3;

/// No usable category for an item
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingCategoryError {
    #[error("breadcrumb has {found} entries, at least {} required", MIN_BREADCRUMB_LEN)]
    ShortBreadcrumb { found: usize },

    #[error("breadcrumb category entry is blank")]
    BlankName,

    #[error("category '{0}' is not in the store")]
    UnknownCategory(String),
}

/// Extracts the breadcrumb trail from a detail page, in order
pub fn breadcrumb_trail(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("ul.breadcrumb > li") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|li| li.text().collect::<String>().trim().to_string())
        .collect()
}

/// Picks the category out of a breadcrumb trail
///
/// # Example
///
/// ```
/// use shelf_harvest::crawler::{category_from_trail, MissingCategoryError};
///
/// let trail = ["Home", "Mystery", "Some Title"].map(String::from);
/// assert_eq!(category_from_trail(&trail), Ok("Mystery".to_string()));
///
/// let short = ["Home", "Some Title"].map(String::from);
/// assert_eq!(
///     category_from_trail(&short),
///     Err(MissingCategoryError::ShortBreadcrumb { found: 2 })
/// );
/// ```
pub fn category_from_trail(trail: &[String]) -> Result<String, MissingCategoryError> {
    if trail.len() < MIN_BREADCRUMB_LEN {
        return Err(MissingCategoryError::ShortBreadcrumb { found: trail.len() });
    }

    let name = trail[trail.len() - 2].trim();
    if name.is_empty() {
        return Err(MissingCategoryError::BlankName);
    }
    Ok(name.to_string())
}

/// Resolves the category name of the item a detail page describes
pub fn resolve_category(html: &str) -> Result<String, MissingCategoryError> {
    category_from_trail(&breadcrumb_trail(html))
}
