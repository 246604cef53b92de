//! Category catalog builder
//!
//! Reads the category navigation on the site index and works out which
//! categories the store does not have yet. The store is asked once for the
//! names it already holds; nothing here queries it per category.

use crate::model::CategoryRef;
use crate::storage::{BookStore, StorageResult};
use crate::url::resolve_href;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Category links sit in the sub-list under the "Books" entry of the side nav
const CATEGORY_LINK_SELECTOR: &str = "ul.nav-list > li > ul > li > a";

/// Extracts (name, absolute URL) pairs from the category index, in page order
///
/// Entries with a blank name or an unresolvable link are left out.
pub fn parse_category_index(html: &str, index_url: &Url) -> Vec<CategoryRef> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(CATEGORY_LINK_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|link| {
            let name = link.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                return None;
            }

            let href = link.value().attr("href")?;
            let url = resolve_href(href, index_url)?;
            Some(CategoryRef {
                name,
                source_url: url.to_string(),
            })
        })
        .collect()
}

/// Drops categories already stored and repeats within `found`
///
/// The first occurrence of a name wins; order is otherwise unchanged.
pub fn reconcile(found: Vec<CategoryRef>, existing: &HashSet<String>) -> Vec<CategoryRef> {
    let mut seen: HashSet<String> = HashSet::new();

    found
        .into_iter()
        .filter(|category| {
            if existing.contains(&category.name) {
                tracing::debug!("Category '{}' already stored", category.name);
                return false;
            }
            seen.insert(category.name.clone())
        })
        .collect()
}

/// Parses the index and returns only the categories new to the store
pub fn discover_categories(
    html: &str,
    index_url: &Url,
    store: &dyn BookStore,
) -> StorageResult<Vec<CategoryRef>> {
    let found = parse_category_index(html, index_url);
    let existing = store.existing_category_names()?;
    let total = found.len();

    let new = reconcile(found, &existing);
    tracing::info!(
        "Category index lists {} categories, {} new",
        total,
        new.len()
    );
    Ok(new)
}
