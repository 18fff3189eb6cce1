//! Listing page traversal
//!
//! This module handles:
//! - Scrolling listing pages so lazily rendered results appear
//! - Collecting restaurant detail links on the supported site domains
//! - Run-wide deduplication of every URL ever enqueued

use super::queue::CrawlRequest;
use crate::browser::{PageProbe, PageSession};
use crate::url::{is_detail_link, normalize_url};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// Anchors that may point at a restaurant page
pub const DETAIL_LINK_SELECTOR: &str = r#"a[href*="/r/"]"#;

/// Decides which URLs enter the queue
///
/// The policy owns the single set of normalized URLs enqueued during the run;
/// seeds and discovered links both pass through [`TraversalPolicy::admit`].
#[derive(Debug)]
pub struct TraversalPolicy {
    domains: Vec<String>,
    scroll_settle: Duration,
    seen: Mutex<HashSet<String>>,
}

impl TraversalPolicy {
    /// Creates a policy
    ///
    /// # Arguments
    ///
    /// * `domains` - Site domain patterns whose restaurant links are followed
    /// * `scroll_settle` - Pause after each scroll step
    pub fn new(domains: Vec<String>, scroll_settle: Duration) -> Self {
        Self {
            domains,
            scroll_settle,
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a normalized URL as enqueued
    ///
    /// Returns true the first time a URL is seen and false afterwards. The
    /// check and the insert happen under one lock.
    pub fn admit(&self, url: &Url) -> bool {
        self.seen().insert(url.as_str().to_string())
    }

    /// Number of distinct URLs admitted so far
    pub fn seen_count(&self) -> usize {
        self.seen().len()
    }

    /// Discovers new restaurant detail requests on a loaded listing page
    ///
    /// Scrolling is best-effort. A failed link probe is logged and yields no
    /// links; listing pages are never retried.
    pub async fn discover(&self, session: &mut dyn PageSession, page_url: &Url) -> Vec<CrawlRequest> {
        for fraction in [0.5, 1.0] {
            if let Err(e) = session.probe(&PageProbe::ScrollTo { fraction }).await {
                tracing::debug!("Scroll to {} failed on {}: {}", fraction, page_url, e);
            }
            if !self.scroll_settle.is_zero() {
                tokio::time::sleep(self.scroll_settle).await;
            }
        }

        let probe = PageProbe::AnchorHrefs {
            selector: DETAIL_LINK_SELECTOR.to_string(),
        };
        let hrefs: Vec<String> = match session.probe(&probe).await {
            Ok(value) => value
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to collect links on {}: {}", page_url, e);
                return Vec::new();
            }
        };

        let candidates = extract_detail_links(&hrefs, page_url, &self.domains);
        let found = candidates.len();

        let requests: Vec<CrawlRequest> = candidates
            .into_iter()
            .filter(|url| self.admit(url))
            .map(CrawlRequest::detail)
            .collect();

        tracing::info!(
            "Enqueuing {} restaurant pages from {} ({} links, {} already seen)",
            requests.len(),
            page_url,
            found,
            found - requests.len()
        );

        requests
    }
}

/// Resolves, filters, and normalizes candidate restaurant links
///
/// # Arguments
///
/// * `hrefs` - Raw `href` values, absolute or relative to `base`
/// * `base` - URL of the page the links were found on
/// * `domains` - Site domain patterns to accept
///
/// # Returns
///
/// Normalized detail URLs in page order, each at most once.
pub fn extract_detail_links(hrefs: &[String], base: &Url, domains: &[String]) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };

        if !is_detail_link(&resolved, domains) {
            continue;
        }

        let Ok(normalized) = normalize_url(resolved.as_str()) else {
            continue;
        };

        if seen.insert(normalized.as_str().to_string()) {
            links.push(normalized);
        }
    }

    links
}
