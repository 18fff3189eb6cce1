//! HTTP page renderer
//!
//! Fetches the server-rendered document with `reqwest` and answers page
//! probes by parsing the HTML with `scraper`. The restaurant pages embed their
//! initial state as a script assignment, so no JavaScript engine is needed for
//! extraction. Scrolling is a no-op and the request filter has nothing to
//! block since only the document itself is downloaded.

use super::{BrowserError, PageProbe, PageSession, Renderer, RequestFilter, WaitCondition};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const INITIAL_STATE_MARKER: &str = "__INITIAL_STATE__";
const CSRF_MARKER: &str = "__csrfToken";

/// Renderer backed by plain HTTP requests
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    /// Builds a renderer whose pages store cookies in `cookies`
    pub fn new(
        user_agent: &str,
        proxy: Option<&str>,
        cookies: Arc<Jar>,
    ) -> Result<Self, BrowserError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .cookie_provider(cookies)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            document: None,
        }))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// The most recently fetched document
struct Document {
    url: Url,
    html: String,
}

/// One worker's HTTP "tab"
pub struct HttpPage {
    client: Client,
    document: Option<Document>,
}

impl HttpPage {
    fn document(&self) -> Result<&Document, BrowserError> {
        self.document.as_ref().ok_or(BrowserError::NoPage)
    }
}

#[async_trait]
impl PageSession for HttpPage {
    async fn set_request_filter(&mut self, filter: &RequestFilter) -> Result<(), BrowserError> {
        tracing::trace!(
            "HTTP renderer ignores request filter ({} types, {} patterns)",
            filter.resource_types.len(),
            filter.url_patterns.len()
        );
        Ok(())
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<Url, BrowserError> {
        self.document = None;

        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrowserError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        self.document = Some(Document {
            url: final_url.clone(),
            html,
        });

        Ok(final_url)
    }

    async fn wait_for(
        &mut self,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let document = self.document()?;
        match condition {
            WaitCondition::NetworkIdle => Ok(()),
            // A static document never gains state later, so a miss is final.
            WaitCondition::InitialState if document.html.contains(INITIAL_STATE_MARKER) => Ok(()),
            WaitCondition::InitialState => Err(BrowserError::Timeout {
                what: condition.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn probe(&mut self, probe: &PageProbe) -> Result<Value, BrowserError> {
        let document = self.document()?;
        tracing::trace!("Probing {} with {:?}", document.url, probe);

        match probe {
            PageProbe::InitialState => Ok(initial_state(&document.html).unwrap_or(Value::Null)),
            PageProbe::CsrfToken => Ok(csrf_token(&document.html)
                .map(Value::String)
                .unwrap_or(Value::Null)),
            PageProbe::AnchorHrefs { selector } => anchor_hrefs(&document.html, selector),
            PageProbe::ScrollTo { .. } => Ok(Value::Null),
        }
    }
}

/// Finds the embedded initial state in a document
pub fn initial_state(html: &str) -> Option<Value> {
    script_texts(html)
        .iter()
        .filter(|text| text.contains(INITIAL_STATE_MARKER))
        .find_map(|text| assigned_json(text, INITIAL_STATE_MARKER))
        .filter(|state| !state.is_null())
}

/// Finds the API authenticity token in a document
pub fn csrf_token(html: &str) -> Option<String> {
    let from_script = script_texts(html)
        .iter()
        .filter(|text| text.contains(CSRF_MARKER))
        .find_map(|text| assigned_json(text, CSRF_MARKER))
        .and_then(|value| value.as_str().map(str::to_string))
        .filter(|token| !token.is_empty());

    if from_script.is_some() {
        return from_script;
    }

    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="csrf-token"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::to_string)
        .find(|token| !token.is_empty())
}

fn anchor_hrefs(html: &str, selector: &str) -> Result<Value, BrowserError> {
    let selector = Selector::parse(selector)
        .map_err(|e| BrowserError::Probe(format!("invalid selector '{}': {:?}", selector, e)))?;

    let document = Html::parse_document(html);
    let hrefs = document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(|href| Value::String(href.to_string()))
        .collect();

    Ok(Value::Array(hrefs))
}

fn script_texts(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .collect()
}

/// Reads the JSON value assigned to `name` in a script, e.g.
/// `window.__INITIAL_STATE__ = {...};` or `w["__csrfToken"] = "..."`
fn assigned_json(source: &str, name: &str) -> Option<Value> {
    let mut rest = source;
    while let Some(pos) = rest.find(name) {
        rest = &rest[pos + name.len()..];

        let after = rest.trim_start_matches(|c: char| c == '"' || c == '\'' || c == ']' || c.is_whitespace());
        let Some(value_src) = after.strip_prefix('=') else {
            continue;
        };

        let mut values = serde_json::Deserializer::from_str(value_src.trim_start()).into_iter::<Value>();
        if let Some(Ok(value)) = values.next() {
            return Some(value);
        }
    }
    None
}
