//! Review records and the restaurant context they are extracted under
//!
//! Both the embedded page state and the review API return reviews in the same
//! JSON shape; this module turns either into [`ReviewRecord`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

const RESTAURANT_ID: &str = "/restaurantProfile/restaurant/restaurantId";
const RESTAURANT_NAME: &str = "/restaurantProfile/restaurant/name";
const EMBEDDED_REVIEWS: &str = "/restaurantProfile/reviewsData/reviewSearchResults/reviews";
const EMBEDDED_TOTAL: &str = "/restaurantProfile/reviewsData/reviewSearchResults/totalCount";

/// Identity and pagination facts for one restaurant detail page
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantContext {
    /// Restaurant id as text, used for storage and logging
    pub id: String,

    /// Restaurant id exactly as the page reported it, sent back to the API
    pub raw_id: Value,

    pub name: Option<String>,

    /// Normalized URL of the detail page, as requested
    pub url: Url,

    /// URL the page was finally served from; API calls go to its origin
    pub served_from: Url,

    /// Authenticity token for API calls; empty when the page had none
    pub csrf_token: String,

    /// Total review count the page reports
    pub total_count: u64,
}

impl RestaurantContext {
    /// Reads the restaurant identity out of a page's embedded initial state
    ///
    /// `url` is the requested detail page and `served_from` the URL it ended
    /// up on after redirects.
    ///
    /// # Returns
    ///
    /// * `Some(RestaurantContext)` - The state carries a restaurant id
    /// * `None` - The id is missing, null, or empty
    pub fn from_initial_state(
        state: &Value,
        url: &Url,
        served_from: &Url,
        csrf_token: Option<String>,
    ) -> Option<Self> {
        let raw_id = state.pointer(RESTAURANT_ID)?.clone();
        let id = value_to_text(&raw_id)?;

        Some(Self {
            id,
            raw_id,
            name: state
                .pointer(RESTAURANT_NAME)
                .and_then(Value::as_str)
                .map(str::to_string),
            url: url.clone(),
            served_from: served_from.clone(),
            csrf_token: csrf_token.unwrap_or_default(),
            total_count: state
                .pointer(EMBEDDED_TOTAL)
                .and_then(value_to_u64)
                .unwrap_or(0),
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Returns the review entries embedded in a page's initial state
pub fn embedded_reviews(state: &Value) -> &[Value] {
    state
        .pointer(EMBEDDED_REVIEWS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// One review, flattened and tagged with its restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub review_id: String,
    pub restaurant_id: String,
    pub restaurant_name: Option<String>,
    pub restaurant_url: String,
    pub rating: Option<f64>,
    pub text: Option<String>,
    pub author: Option<String>,

    /// Visit date, falling back to the submission date
    pub date: Option<String>,
    pub visit_date: Option<String>,
    pub submitted_date: Option<String>,
    pub food_rating: Option<f64>,
    pub service_rating: Option<f64>,
    pub ambience_rating: Option<f64>,
    pub value_rating: Option<f64>,
    pub noise_level: Option<String>,
    pub helpful_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReview {
    review_id: Option<Value>,
    rating: Option<RawRating>,
    text: Option<String>,
    user: Option<RawUser>,
    dined_date_time: Option<String>,
    submitted_date_time: Option<String>,
    helpfulness: Option<RawHelpfulness>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRating {
    overall: Option<Value>,
    food: Option<Value>,
    service: Option<Value>,
    ambience: Option<Value>,
    value: Option<Value>,
    noise: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUser {
    nickname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHelpfulness {
    score: Option<Value>,
}

impl ReviewRecord {
    /// Builds a record from one raw review entry
    ///
    /// Returns None when the entry is not a review object or has no review id.
    pub fn from_entry(entry: &Value, ctx: &RestaurantContext) -> Option<Self> {
        let raw: RawReview = match serde_json::from_value(entry.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Skipping malformed review for restaurant {}: {}", ctx.id, e);
                return None;
            }
        };

        let Some(review_id) = raw.review_id.as_ref().and_then(value_to_text) else {
            tracing::debug!("Skipping review without id for restaurant {}", ctx.id);
            return None;
        };

        let rating = raw.rating.unwrap_or_default();
        let visit_date = raw.dined_date_time.filter(|d| !d.is_empty());
        let submitted_date = raw.submitted_date_time.filter(|d| !d.is_empty());

        Some(Self {
            review_id,
            restaurant_id: ctx.id.clone(),
            restaurant_name: ctx.name.clone(),
            restaurant_url: ctx.url.to_string(),
            rating: rating.overall.as_ref().and_then(value_to_f64),
            text: raw.text,
            author: raw.user.and_then(|u| u.nickname),
            date: visit_date.clone().or_else(|| submitted_date.clone()),
            visit_date,
            submitted_date,
            food_rating: rating.food.as_ref().and_then(value_to_f64),
            service_rating: rating.service.as_ref().and_then(value_to_f64),
            ambience_rating: rating.ambience.as_ref().and_then(value_to_f64),
            value_rating: rating.value.as_ref().and_then(value_to_f64),
            noise_level: rating.noise.as_ref().and_then(value_to_text),
            helpful_count: raw
                .helpfulness
                .and_then(|h| h.score)
                .as_ref()
                .and_then(value_to_f64)
                .map(|score| score as i64),
        })
    }
}

/// Converts raw review entries into records, dropping unusable ones
pub fn parse_reviews(entries: &[Value], ctx: &RestaurantContext) -> Vec<ReviewRecord> {
    entries
        .iter()
        .filter_map(|entry| ReviewRecord::from_entry(entry, ctx))
        .collect()
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
