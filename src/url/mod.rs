//! URL handling module
//!
//! This module provides request classification (listing vs. restaurant detail),
//! URL normalization, and matching of restaurant links against the supported
//! site domains.

mod matcher;
mod normalize;

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

// Re-export main functions
pub use matcher::{is_detail_link, matches_site_domain};
pub use normalize::normalize_url;

/// The kind of page a crawl request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum RequestLabel {
    /// A listing or search page that links to restaurants
    #[serde(alias = "listing", alias = "LISTING", alias = "search", alias = "SEARCH")]
    Listing,

    /// A single restaurant page carrying reviews
    #[serde(alias = "detail", alias = "DETAIL")]
    Detail,
}

impl RequestLabel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Detail => "detail",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }
}

impl fmt::Display for RequestLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

fn detail_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)/r/|/restref/").expect("detail path pattern is a valid regex")
    })
}

/// Classifies a URL as a restaurant detail page or a listing page
///
/// A path containing a `/r/` (restaurant slug) or `/restref/` (restaurant
/// reference) segment is a detail page. Anything else is treated as a listing
/// page to search for further links; classification never fails.
///
/// # Examples
///
/// ```
/// use table_reviews::url::{classify_url, RequestLabel};
/// use url::Url;
///
/// let url = Url::parse("https://www.opentable.com/r/the-ivy-london").unwrap();
/// assert_eq!(classify_url(&url), RequestLabel::Detail);
///
/// let url = Url::parse("https://www.opentable.com/metro/london-restaurants").unwrap();
/// assert_eq!(classify_url(&url), RequestLabel::Listing);
/// ```
pub fn classify_url(url: &Url) -> RequestLabel {
    if detail_path_pattern().is_match(url.path()) {
        RequestLabel::Detail
    } else {
        RequestLabel::Listing
    }
}
