//! Browser collaborator seam
//!
//! The crawl engine never talks to a browser directly. It drives a
//! [`PageSession`] through four operations (navigate, wait, probe, request
//! filtering) and leaves rendering to whichever [`Renderer`] the configuration
//! selects:
//!
//! - [`HttpRenderer`]: fetches the server-rendered document over HTTP and
//!   answers probes from the static HTML
//! - `ChromiumRenderer`: headless Chromium (behind the `chromium` feature)

mod http;

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::{BrowserConfig, RendererKind};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::cookie::Jar;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub use http::HttpRenderer;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumRenderer;

/// Errors raised by a renderer or page session
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Page probe failed: {0}")]
    Probe(String),

    #[error("No page loaded in this session")]
    NoPage,

    #[error("Renderer '{0}' is not available in this build")]
    Unsupported(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browser engine error: {0}")]
    Engine(#[from] anyhow::Error),
}

/// A condition a session can wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// No network activity for a short quiet period
    NetworkIdle,
    /// `window.__INITIAL_STATE__` is defined
    InitialState,
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkIdle => write!(f, "network idle"),
            Self::InitialState => write!(f, "initial state"),
        }
    }
}

/// A question the engine asks of the loaded page
#[derive(Debug, Clone, PartialEq)]
pub enum PageProbe {
    /// The embedded initial state object, or null
    InitialState,
    /// `window.__csrfToken` or the `csrf-token` meta tag, or null
    CsrfToken,
    /// The `href` of every anchor matching `selector`, as an array of strings
    AnchorHrefs { selector: String },
    /// Scroll to `fraction` of the page height; answers null
    ScrollTo { fraction: f64 },
}

/// Requests the browser should refuse to load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    pub resource_types: Vec<String>,
    pub url_patterns: Vec<String>,
}

impl RequestFilter {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            resource_types: config
                .blocked_resource_types
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            url_patterns: config.blocked_url_patterns.clone(),
        }
    }

    /// Returns true if a request of this type to this URL should be aborted
    pub fn blocks(&self, resource_type: &str, url: &str) -> bool {
        self.blocks_resource_type(resource_type) || self.blocks_url(url)
    }

    pub fn blocks_resource_type(&self, resource_type: &str) -> bool {
        self.resource_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(resource_type))
    }

    pub fn blocks_url(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|p| url.contains(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.resource_types.is_empty() && self.url_patterns.is_empty()
    }
}

/// A page engine that hands out one session per worker
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens a new page session (a browser tab, or an HTTP document holder)
    async fn new_session(&self) -> Result<Box<dyn PageSession>, BrowserError>;

    /// Releases engine resources once the crawl is over
    async fn shutdown(&self) -> Result<(), BrowserError> {
        Ok(())
    }

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// A single page the engine navigates and inspects
#[async_trait]
pub trait PageSession: Send {
    /// Installs the block list applied to every subsequent navigation
    async fn set_request_filter(&mut self, filter: &RequestFilter) -> Result<(), BrowserError>;

    /// Loads `url`, returning the final URL after redirects
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<Url, BrowserError>;

    /// Waits until `condition` holds or `timeout` elapses
    async fn wait_for(
        &mut self,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    /// Evaluates a probe against the loaded page
    async fn probe(&mut self, probe: &PageProbe) -> Result<Value, BrowserError>;

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Picks the run's user agent at random from the configured list
pub fn pick_user_agent(user_agents: &[String]) -> Option<&str> {
    user_agents
        .choose(&mut rand::thread_rng())
        .map(String::as_str)
}

/// Polls `sample` until its value stops changing for `quiet`
///
/// Returns `Ok(true)` once the value has held steady for the quiet period and
/// `Ok(false)` if `timeout` elapses first.
pub async fn wait_until_quiet<F, Fut>(
    mut sample: F,
    quiet: Duration,
    poll: Duration,
    timeout: Duration,
) -> Result<bool, BrowserError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64, BrowserError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last = sample().await?;
    let mut steady_since = tokio::time::Instant::now();

    loop {
        if steady_since.elapsed() >= quiet {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }

        tokio::time::sleep(poll).await;

        let current = sample().await?;
        if current != last {
            last = current;
            steady_since = tokio::time::Instant::now();
        }
    }
}

/// Builds the renderer the configuration asks for
///
/// # Arguments
///
/// * `config` - Browser settings (renderer kind, block lists)
/// * `user_agent` - The user agent chosen for this run
/// * `proxy` - Optional proxy URL
/// * `cookies` - Jar receiving the cookies pages set
pub async fn build_renderer(
    config: &BrowserConfig,
    user_agent: &str,
    proxy: Option<&str>,
    cookies: Arc<Jar>,
) -> Result<Arc<dyn Renderer>, BrowserError> {
    match config.renderer {
        RendererKind::Http => Ok(Arc::new(HttpRenderer::new(user_agent, proxy, cookies)?)),
        #[cfg(feature = "chromium")]
        RendererKind::Chromium => Ok(Arc::new(
            ChromiumRenderer::launch(user_agent, proxy, cookies).await?,
        )),
        #[cfg(not(feature = "chromium"))]
        RendererKind::Chromium => {
            drop(cookies);
            Err(BrowserError::Unsupported("chromium".to_string()))
        }
    }
}
