//! Headless Chromium renderer using chromiumoxide.

use super::{
    wait_until_quiet, BrowserError, PageProbe, PageSession, Renderer, RequestFilter,
    WaitCondition,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use reqwest::cookie::Jar;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

const WEBDRIVER_MASK: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => false });";

const INITIAL_STATE_POLL: Duration = Duration::from_millis(250);

/// How long the resource count must hold still before the network is idle
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const NETWORK_POLL: Duration = Duration::from_millis(100);

/// Chromium-based renderer
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    user_agent: String,
    cookies: Arc<Jar>,
}

impl ChromiumRenderer {
    /// Launches a headless Chromium instance
    ///
    /// Cookies the browser collects are copied into `cookies` after every
    /// navigation so HTTP clients sharing the jar stay in the same session.
    pub async fn launch(
        user_agent: &str,
        proxy: Option<&str>,
        cookies: Arc<Jar>,
    ) -> Result<Self, BrowserError> {
        let mut builder = ChromeConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Chromium handler event error: {}", e);
                }
            }
        });

        tracing::info!("Launched headless Chromium");

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            user_agent: user_agent.to_string(),
            cookies,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .context("failed to override user agent")?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(WEBDRIVER_MASK))
            .await
            .context("failed to install init script")?;

        Ok(Box::new(ChromiumPage {
            page,
            cookies: Arc::clone(&self.cookies),
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        self.handler.abort();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// A single Chromium tab
pub struct ChromiumPage {
    page: Page,
    cookies: Arc<Jar>,
}

impl ChromiumPage {
    async fn evaluate(&self, script: String) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value::<Value>()
            .map_err(|e| BrowserError::Probe(format!("failed to convert JS result: {e:?}")))
    }

    /// Number of resources the page has requested so far
    async fn resource_count(&self) -> Result<u64, BrowserError> {
        let count = self
            .evaluate("performance.getEntriesByType('resource').length".to_string())
            .await?;
        Ok(count.as_u64().unwrap_or(0))
    }

    /// Copies the tab's cookies into the shared jar
    async fn export_cookies(&self, url: &Url) -> Result<(), BrowserError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("failed to read cookies")?;

        for cookie in &cookies {
            let domain = cookie.domain.trim_start_matches('.');
            let origin = match Url::parse(&format!("{}://{}/", url.scheme(), domain)) {
                Ok(origin) => origin,
                Err(_) => url.clone(),
            };
            self.cookies.add_cookie_str(
                &format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path),
                &origin,
            );
        }

        tracing::trace!("Shared {} cookies from {}", cookies.len(), url);
        Ok(())
    }
}

/// File extensions standing in for resource types, since URL blocking is
/// pattern based
fn resource_type_patterns(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "image" => &["*.png*", "*.jpg*", "*.jpeg*", "*.gif*", "*.webp*", "*.svg*", "*.ico*"],
        "font" => &["*.woff*", "*.woff2*", "*.ttf*", "*.otf*"],
        "media" => &["*.mp4*", "*.webm*", "*.mp3*", "*.m4a*"],
        "stylesheet" => &["*.css*"],
        _ => &[],
    }
}

#[async_trait]
impl PageSession for ChromiumPage {
    async fn set_request_filter(&mut self, filter: &RequestFilter) -> Result<(), BrowserError> {
        let mut patterns: Vec<String> = filter
            .url_patterns
            .iter()
            .map(|p| format!("*{}*", p))
            .collect();
        for resource_type in &filter.resource_types {
            patterns.extend(
                resource_type_patterns(resource_type)
                    .iter()
                    .map(|p| p.to_string()),
            );
        }

        self.page
            .execute(EnableParams::default())
            .await
            .context("failed to enable network domain")?;
        self.page
            .execute(SetBlockedUrLsParams::new(patterns))
            .await
            .context("failed to set blocked URLs")?;
        Ok(())
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<Url, BrowserError> {
        let result = tokio::time::timeout(timeout, self.page.goto(url.as_str())).await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    what: format!("navigation to {}", url),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }

        let final_url = self
            .page
            .url()
            .await
            .context("failed to read page URL")?
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        if let Err(e) = self.export_cookies(&final_url).await {
            tracing::debug!("Could not share cookies from {}: {}", final_url, e);
        }

        Ok(final_url)
    }

    async fn wait_for(
        &mut self,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let timed_out = || BrowserError::Timeout {
            what: condition.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        match condition {
            WaitCondition::NetworkIdle => {
                let this = &*self;
                let settled = wait_until_quiet(
                    move || this.resource_count(),
                    NETWORK_QUIET,
                    NETWORK_POLL,
                    timeout,
                )
                .await?;
                if settled {
                    Ok(())
                } else {
                    Err(timed_out())
                }
            }
            WaitCondition::InitialState => {
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    let ready = self
                        .evaluate("window.__INITIAL_STATE__ !== undefined".to_string())
                        .await?;
                    if ready.as_bool() == Some(true) {
                        return Ok(());
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(timed_out());
                    }
                    tokio::time::sleep(INITIAL_STATE_POLL).await;
                }
            }
        }
    }

    async fn probe(&mut self, probe: &PageProbe) -> Result<Value, BrowserError> {
        match probe {
            PageProbe::InitialState => {
                let text = self
                    .evaluate("JSON.stringify(window.__INITIAL_STATE__ ?? null)".to_string())
                    .await?;
                let text = text.as_str().unwrap_or("null");
                serde_json::from_str(text)
                    .map_err(|e| BrowserError::Probe(format!("initial state is not JSON: {}", e)))
            }
            PageProbe::CsrfToken => {
                self.evaluate(
                    r#"window.__csrfToken || document.querySelector('meta[name="csrf-token"]')?.content || null"#
                        .to_string(),
                )
                .await
            }
            PageProbe::AnchorHrefs { selector } => {
                let selector = serde_json::to_string(selector)
                    .map_err(|e| BrowserError::Probe(e.to_string()))?;
                self.evaluate(format!(
                    "Array.from(document.querySelectorAll({})).map(a => a.href)",
                    selector
                ))
                .await
            }
            PageProbe::ScrollTo { fraction } => {
                self.evaluate(format!(
                    "window.scrollTo(0, document.body.scrollHeight * {}); null",
                    fraction
                ))
                .await
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}
