//! Records produced by the scraping pipeline
//!
//! Values here are kept exactly as scraped. Price stays text with its currency
//! symbol and rating stays a vocabulary token; interpreting them is left to
//! whoever reads the store.

use std::fmt;

/// Placeholder stored when a listing entry has no title or price
pub const NOT_AVAILABLE: &str = "N/A";

/// A category discovered on the site's category index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    /// Category name, the natural key
    pub name: String,

    /// Absolute URL of the category's listing
    pub source_url: String,
}

/// Star rating token taken from a listing entry's class attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rating {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Rating {
    /// Matches a single class token against the rating vocabulary
    ///
    /// Matching is exact; `"three"` is not a rating token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Zero" => Some(Self::Zero),
            "One" => Some(Self::One),
            "Two" => Some(Self::Two),
            "Three" => Some(Self::Three),
            "Four" => Some(Self::Four),
            "Five" => Some(Self::Five),
            _ => None,
        }
    }

    /// Finds the rating token in a whitespace-separated class list
    ///
    /// # Example
    ///
    /// ```
    /// use shelf_harvest::Rating;
    ///
    /// assert_eq!(Rating::from_class_list("star-rating Three"), Some(Rating::Three));
    /// assert_eq!(Rating::from_class_list("star-rating"), None);
    /// ```
    pub fn from_class_list(classes: &str) -> Option<Self> {
        classes.split_whitespace().find_map(Self::from_token)
    }

    /// The token as it appears on the site, and as it is stored
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "Zero",
            Self::One => "One",
            Self::Two => "Two",
            Self::Three => "Three",
            Self::Four => "Four",
            Self::Five => "Five",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One listing entry as scraped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    /// Title with HTML entities decoded, or `"N/A"`
    pub title: String,

    /// Price text including currency symbol, or `"N/A"`
    pub price: String,

    pub rating: Option<Rating>,

    /// Trimmed stock indicator text
    pub availability: Option<String>,

    /// Absolute detail page URL; the dedup key
    pub detail_url: String,
}

/// A listing entry together with the category named by its detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub item: RawItem,
    pub category_name: String,
}

impl ResolvedRecord {
    pub fn new(item: RawItem, category_name: impl Into<String>) -> Self {
        Self {
            item,
            category_name: category_name.into(),
        }
    }
}
