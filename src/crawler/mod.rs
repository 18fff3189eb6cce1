//! Crawler module: request handling and review extraction
//!
//! This module contains the core crawling logic, including:
//! - The shared request queue and record quota
//! - Restaurant link discovery on listing pages
//! - The per-restaurant extraction state machine and review API client
//! - Overall crawl coordination

mod api;
mod coordinator;
mod extraction;
mod queue;
mod quota;
mod review;
mod traversal;

pub use api::{extract_reviews, ApiError, ReviewApiClient, REVIEW_API_PATH};
pub use coordinator::{run_crawl, Coordinator, RunSummary};
pub use extraction::{ExtractionOutcome, PageDelay, ReviewExtractor, StopReason};
pub use queue::{CrawlRequest, RequestQueue};
pub use quota::Quota;
pub use review::{embedded_reviews, parse_reviews, RestaurantContext, ReviewRecord};
pub use traversal::{extract_detail_links, TraversalPolicy, DETAIL_LINK_SELECTOR};
