//! Scripted page session for unit tests

use super::{BrowserError, PageProbe, PageSession, RequestFilter, WaitCondition};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// A page session that answers probes from canned values and records them
#[derive(Debug, Default)]
pub struct ScriptedPage {
    pub initial_state: Option<Value>,
    pub csrf_token: Option<String>,
    pub hrefs: Vec<String>,
    pub fail_probes: bool,
    probes: Vec<PageProbe>,
}

impl ScriptedPage {
    pub fn with_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_csrf(mut self, token: &str) -> Self {
        self.csrf_token = Some(token.to_string());
        self
    }

    pub fn with_hrefs(mut self, hrefs: &[&str]) -> Self {
        self.hrefs = hrefs.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn failing_probes(mut self) -> Self {
        self.fail_probes = true;
        self
    }

    /// Probes evaluated so far, in order
    pub fn probes(&self) -> Vec<PageProbe> {
        self.probes.clone()
    }
}

#[async_trait]
impl PageSession for ScriptedPage {
    async fn set_request_filter(&mut self, _filter: &RequestFilter) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<Url, BrowserError> {
        Ok(url.clone())
    }

    async fn wait_for(
        &mut self,
        _condition: WaitCondition,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn probe(&mut self, probe: &PageProbe) -> Result<Value, BrowserError> {
        self.probes.push(probe.clone());
        if self.fail_probes {
            return Err(BrowserError::Probe("scripted failure".to_string()));
        }

        Ok(match probe {
            PageProbe::InitialState => self.initial_state.clone().unwrap_or(Value::Null),
            PageProbe::CsrfToken => self
                .csrf_token
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            PageProbe::AnchorHrefs { .. } => Value::Array(
                self.hrefs.iter().cloned().map(Value::String).collect(),
            ),
            PageProbe::ScrollTo { .. } => Value::Null,
        })
    }
}
