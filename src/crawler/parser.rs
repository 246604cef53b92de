//! Listing page parser
//!
//! This module extracts raw item records from one catalogue listing page.
//! Each `article.product_pod` container yields one [`RawItem`]:
//! - title from the heading link's `title` attribute (entities decoded)
//! - price text, verbatim
//! - rating token from the `star-rating` class list
//! - stock availability text
//! - detail link resolved against the catalogue base

use crate::model::{Rating, RawItem, NOT_AVAILABLE};
use crate::url::resolve_detail_url;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// A listing entry (or the page itself) is not shaped as expected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseStructureError {
    #[error("listing entry {index} has no title link")]
    MissingTitleLink { index: usize },

    #[error("listing entry {index} has an unusable detail link '{href}'")]
    BadDetailLink { index: usize, href: String },

    #[error("invalid selector '{0}'")]
    Selector(String),
}

/// Compiled selectors for the listing page contract
#[derive(Debug)]
struct ListingSelectors {
    container: Selector,
    title_link: Selector,
    price: Selector,
    rating: Selector,
    availability: Selector,
}

impl ListingSelectors {
    fn new() -> Result<Self, ParseStructureError> {
        Ok(Self {
            container: compile("article.product_pod")?,
            title_link: compile("h3 a")?,
            price: compile("p.price_color")?,
            rating: compile("p.star-rating")?,
            availability: compile("p.availability")?,
        })
    }
}

pub(crate) fn compile(css: &str) -> Result<Selector, ParseStructureError> {
    Selector::parse(css).map_err(|_| ParseStructureError::Selector(css.to_string()))
}

/// A parsed listing page
///
/// Holds the DOM, so it must be consumed before the next `.await`.
pub struct ListingDocument {
    document: Html,
    selectors: ListingSelectors,
}

impl ListingDocument {
    pub fn parse(html: &str) -> Result<Self, ParseStructureError> {
        Ok(Self {
            document: Html::parse_document(html),
            selectors: ListingSelectors::new()?,
        })
    }

    /// Items in document order
    ///
    /// Each entry is extracted lazily as the iterator advances. A broken entry
    /// yields an error without affecting the entries after it. An empty
    /// iterator means the page has no items.
    pub fn items<'a>(
        &'a self,
        catalogue: &'a Url,
    ) -> impl Iterator<Item = Result<RawItem, ParseStructureError>> + 'a {
        self.document
            .select(&self.selectors.container)
            .enumerate()
            .map(move |(index, container)| {
                extract_item(container, index, &self.selectors, catalogue)
            })
    }
}

/// Parses a listing page and collects its items
///
/// # Example
///
/// ```
/// use shelf_harvest::crawler::parse_listing;
/// use url::Url;
///
/// let html = r#"<article class="product_pod">
///     <p class="star-rating Three"></p>
///     <h3><a href="sharp-objects_997/index.html" title="Sharp Objects">Sharp...</a></h3>
///     <p class="price_color">£47.82</p>
///     <p class="instock availability"> In stock </p>
/// </article>"#;
/// let base = Url::parse("https://books.toscrape.com/catalogue/").unwrap();
///
/// let items = parse_listing(html, &base).unwrap();
/// let item = items[0].as_ref().unwrap();
/// assert_eq!(item.title, "Sharp Objects");
/// assert_eq!(item.availability.as_deref(), Some("In stock"));
/// ```
pub fn parse_listing(
    html: &str,
    catalogue: &Url,
) -> Result<Vec<Result<RawItem, ParseStructureError>>, ParseStructureError> {
    let document = ListingDocument::parse(html)?;
    let items = document.items(catalogue).collect();
    Ok(items)
}

fn extract_item(
    container: ElementRef<'_>,
    index: usize,
    selectors: &ListingSelectors,
    catalogue: &Url,
) -> Result<RawItem, ParseStructureError> {
    let link = container
        .select(&selectors.title_link)
        .next()
        .ok_or(ParseStructureError::MissingTitleLink { index })?;

    let href = link.value().attr("href").unwrap_or_default();
    let detail_url =
        resolve_detail_url(href, catalogue).ok_or_else(|| ParseStructureError::BadDetailLink {
            index,
            href: href.to_string(),
        })?;

    // The parser has already decoded entities in attribute values
    let title = link
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string();

    let price = first_text(container, &selectors.price).unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let rating = container
        .select(&selectors.rating)
        .next()
        .and_then(|p| p.value().attr("class"))
        .and_then(Rating::from_class_list);

    let availability = first_text(container, &selectors.availability);

    Ok(RawItem {
        title,
        price,
        rating,
        availability,
        detail_url: detail_url.to_string(),
    })
}

/// Trimmed text of the first match, if it has any
fn first_text(container: ElementRef<'_>, selector: &Selector) -> Option<String> {
    container
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decodes HTML entities in a plain text value
///
/// Used for text that was stored before decoding happened at parse time.
/// The text is read back as an attribute value, so only character
/// references are decoded and markup-like text such as `<Vol 1>` is kept.
pub fn decode_entities(text: &str) -> String {
    let Ok(holder) = compile("p") else {
        return text.to_string();
    };

    let fragment = Html::parse_fragment(&format!(
        "<p title=\"{}\"></p>",
        text.replace('"', "&quot;")
    ));
    fragment
        .select(&holder)
        .next()
        .and_then(|p| p.value().attr("title"))
        .map_or_else(|| text.to_string(), str::to_string)
}
