//! Client for the site's paginated review API
//!
//! This module handles:
//! - Building the HTTP client with the run's user agent and proxy
//! - Building the persisted-query request for one review page
//! - Classifying failures (HTTP status, transport, malformed body)

use super::review::RestaurantContext;
use reqwest::cookie::Jar;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Path and query of the review search endpoint, relative to the site origin
pub const REVIEW_API_PATH: &str = "/dapi/fe/gql?optype=query&opname=ReviewSearchResults";

const OPERATION_NAME: &str = "ReviewSearchResults";
const PERSISTED_QUERY_HASH: &str =
    "a544a8bb7070a1aa6c5e50b3f9bb239ba44f442eb9ac628f30b57bd3ae098b27";
const REVIEWS_POINTER: &str = "/data/restaurant/reviewSearchResults/reviews";

/// Errors from a single review API call
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Review API returned HTTP {status} for page {page}")]
    Status { status: u16, page: u32 },

    #[error("Review API request failed for page {page}: {source}")]
    Transport { page: u32, source: reqwest::Error },

    #[error("Malformed review API response for page {page}: {reason}")]
    Malformed { page: u32, reason: String },

    #[error("Cannot build review API endpoint from {0}")]
    Endpoint(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Issues review page requests directly over HTTP
#[derive(Debug, Clone)]
pub struct ReviewApiClient {
    client: Client,
    page_size: u32,
}

impl ReviewApiClient {
    /// Builds a client
    ///
    /// # Arguments
    ///
    /// * `user_agent` - User agent for every API call
    /// * `proxy` - Optional proxy URL applied to all traffic
    /// * `timeout` - Per-request timeout
    /// * `page_size` - Reviews requested per page
    /// * `cookies` - Cookie jar shared with the page renderer, so API calls
    ///   carry the session the CSRF token was issued for
    pub fn new(
        user_agent: &str,
        proxy: Option<&str>,
        timeout: Duration,
        page_size: u32,
        cookies: Arc<Jar>,
    ) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .cookie_provider(cookies)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            page_size,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Resolves the API endpoint on the origin of a detail page
    pub fn endpoint(page_url: &Url) -> Result<Url, ApiError> {
        page_url
            .join(REVIEW_API_PATH)
            .map_err(|e| ApiError::Endpoint(format!("{}: {}", page_url, e)))
    }

    /// Builds the JSON body for one review page
    pub fn request_body(restaurant_id: &Value, page: u32, page_size: u32) -> Value {
        json!({
            "operationName": OPERATION_NAME,
            "variables": {
                "prioritiseUserLanguage": false,
                "gpid": 0,
                "restaurantId": restaurant_id,
                "page": page,
                "pageSize": page_size,
                "sortBy": "newestReview",
                "searchTerm": "",
                "highlightFormat": "index"
            },
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": PERSISTED_QUERY_HASH
                }
            }
        })
    }

    /// Fetches one page of reviews for a restaurant
    ///
    /// # Arguments
    ///
    /// * `ctx` - The restaurant being paginated
    /// * `page` - 1-based page number
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Value>)` - Raw review entries; empty when the response carries none
    /// * `Err(ApiError)` - Non-2xx status, transport failure, or a body that is not JSON
    pub async fn fetch_page(&self, ctx: &RestaurantContext, page: u32) -> Result<Vec<Value>, ApiError> {
        let endpoint = Self::endpoint(&ctx.served_from)?;
        let body = Self::request_body(&ctx.raw_id, page, self.page_size);

        tracing::debug!("POST {} page {} for restaurant {}", endpoint, page, ctx.id);

        let response = self
            .client
            .post(endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header("ot-page-group", "rest-profile")
            .header("ot-page-type", "restprofilepage")
            .header("x-csrf-token", ctx.csrf_token.as_str())
            .body(body.to_string())
            .send()
            .await
            .map_err(|source| ApiError::Transport { page, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                page,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|source| ApiError::Transport { page, source })?;

        let payload: Value = serde_json::from_str(&text).map_err(|e| ApiError::Malformed {
            page,
            reason: e.to_string(),
        })?;

        Ok(extract_reviews(&payload))
    }
}

/// Pulls the review entries out of an API response body
pub fn extract_reviews(payload: &Value) -> Vec<Value> {
    payload
        .pointer(REVIEWS_POINTER)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
