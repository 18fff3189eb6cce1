//! Review extraction for restaurant detail pages
//!
//! Each detail page runs a small state machine:
//!
//! ```text
//! INIT ──(no state / no id)──────────────▶ ABORTED
//!  │ ───(restaurant already claimed)─────▶ ALREADY_EXTRACTED
//!  ▼
//! EXTRACT_EMBEDDED ──▶ PAGINATE ──(stop condition)──▶ DONE
//! ```
//!
//! INIT reads the embedded initial state and the API token, then claims the
//! restaurant id for the run so a second URL for the same restaurant is not
//! extracted twice. EXTRACT_EMBEDDED
//! emits the reviews that shipped with the page as one batch. PAGINATE asks
//! the review API for pages 2, 3, ... until the quota, the per-restaurant cap,
//! or the reported total is reached, or the API stops returning new reviews.

use super::api::ReviewApiClient;
use super::quota::Quota;
use super::review::{embedded_reviews, parse_reviews, RestaurantContext, ReviewRecord};
use crate::browser::{PageProbe, PageSession};
use crate::config::ExtractionConfig;
use crate::storage::ReviewSink;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Why pagination ended for a restaurant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The global record target was met
    QuotaReached,
    /// This restaurant's share of the target was met
    RestaurantCapReached,
    /// As many reviews extracted as the page reported
    TotalReached,
    /// The API returned no review entries
    EndOfData,
    /// A page returned only reviews already extracted
    NoNewRecords,
    /// The API call failed; the message says how
    ApiFailure(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaReached => write!(f, "quota reached"),
            Self::RestaurantCapReached => write!(f, "per-restaurant cap reached"),
            Self::TotalReached => write!(f, "all reported reviews extracted"),
            Self::EndOfData => write!(f, "no more reviews"),
            Self::NoNewRecords => write!(f, "page repeated earlier reviews"),
            Self::ApiFailure(e) => write!(f, "API failure: {}", e),
        }
    }
}

/// Terminal state of one detail page
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The page could not be identified; nothing was emitted
    Aborted { reason: String },

    /// Another page of this run already extracted the restaurant
    AlreadyExtracted { restaurant_id: String },

    Done {
        restaurant_id: String,
        /// Records emitted for this restaurant (embedded + paginated)
        records: u64,
        /// API pages successfully fetched
        pages_fetched: u32,
        stop: StopReason,
    },
}

/// Pause between API pages: a fixed base plus uniform random jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDelay {
    pub base: Duration,
    pub jitter: Duration,
}

impl PageDelay {
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Draws one delay in `[base, base + jitter)`
    pub fn sample(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

/// Runs the extraction state machine against detail pages
///
/// One extractor is shared by all workers; it holds no per-page state, only
/// the set of restaurant ids claimed so far in the run.
pub struct ReviewExtractor {
    quota: Arc<Quota>,
    api: ReviewApiClient,
    sink: Arc<dyn ReviewSink>,
    max_per_restaurant: u64,
    delay: PageDelay,
    claimed: Mutex<HashSet<String>>,
}

impl ReviewExtractor {
    pub fn new(
        quota: Arc<Quota>,
        api: ReviewApiClient,
        sink: Arc<dyn ReviewSink>,
        max_per_restaurant: u64,
        delay: PageDelay,
    ) -> Self {
        Self {
            quota,
            api,
            sink,
            max_per_restaurant,
            delay,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Builds an extractor from the extraction settings
    pub fn from_config(
        config: &ExtractionConfig,
        quota: Arc<Quota>,
        api: ReviewApiClient,
        sink: Arc<dyn ReviewSink>,
    ) -> Self {
        Self::new(
            quota,
            api,
            sink,
            config.max_reviews_per_restaurant,
            PageDelay {
                base: Duration::from_millis(config.page_delay_ms),
                jitter: Duration::from_millis(config.page_delay_jitter_ms),
            },
        )
    }

    /// Extracts reviews from a loaded detail page
    ///
    /// # Arguments
    ///
    /// * `session` - Page session already navigated to the detail page
    /// * `page_url` - Normalized URL of the detail page, as requested
    /// * `served_from` - URL the page ended up on after redirects
    pub async fn extract(
        &self,
        session: &mut dyn PageSession,
        page_url: &Url,
        served_from: &Url,
    ) -> ExtractionOutcome {
        // INIT
        let (ctx, state) = match self.init(session, page_url, served_from).await {
            Ok(found) => found,
            Err(reason) => {
                tracing::warn!("Could not find restaurant data on {}: {}", page_url, reason);
                return ExtractionOutcome::Aborted { reason };
            }
        };

        if !self.claim(&ctx.id) {
            tracing::info!(
                "Restaurant {} (ID: {}) already extracted in this run, skipping {}",
                ctx.display_name(),
                ctx.id,
                page_url
            );
            return ExtractionOutcome::AlreadyExtracted {
                restaurant_id: ctx.id,
            };
        }

        tracing::info!(
            "Restaurant: {} (ID: {}) - Total Reviews: {}",
            ctx.display_name(),
            ctx.id,
            ctx.total_count
        );

        let cap = self.max_per_restaurant.min(self.quota.remaining());
        let mut run = RestaurantRun::new(&ctx, cap);

        // EXTRACT_EMBEDDED
        let embedded = parse_reviews(embedded_reviews(&state), &ctx);
        let batch = run.accept(embedded, &self.quota);
        self.commit(&ctx, &batch, "embedded");

        // PAGINATE
        let stop = self.paginate(&ctx, &mut run).await;

        tracing::info!(
            "Finished {} (ID: {}): {} reviews, {} API pages, {}",
            ctx.display_name(),
            ctx.id,
            run.extracted,
            run.pages_fetched,
            stop
        );

        ExtractionOutcome::Done {
            restaurant_id: ctx.id.clone(),
            records: run.extracted,
            pages_fetched: run.pages_fetched,
            stop,
        }
    }

    /// Marks a restaurant as taken; false if it already was
    fn claim(&self, restaurant_id: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(restaurant_id.to_string())
    }

    async fn init(
        &self,
        session: &mut dyn PageSession,
        page_url: &Url,
        served_from: &Url,
    ) -> Result<(RestaurantContext, serde_json::Value), String> {
        let state = session
            .probe(&PageProbe::InitialState)
            .await
            .map_err(|e| format!("initial state probe failed: {}", e))?;

        if state.is_null() {
            return Err("no embedded initial state".to_string());
        }

        let csrf_token = match session.probe(&PageProbe::CsrfToken).await {
            Ok(value) => value.as_str().map(str::to_string),
            Err(e) => {
                tracing::debug!("No CSRF token on {}: {}", page_url, e);
                None
            }
        };

        let ctx = RestaurantContext::from_initial_state(&state, page_url, served_from, csrf_token)
            .ok_or_else(|| "initial state has no restaurant id".to_string())?;

        Ok((ctx, state))
    }

    async fn paginate(&self, ctx: &RestaurantContext, run: &mut RestaurantRun) -> StopReason {
        let mut page: u32 = 1;

        loop {
            if let Some(stop) = run.limit_reached(&self.quota, ctx.total_count) {
                return stop;
            }

            if run.pages_fetched > 0 {
                let delay = self.delay.sample();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            page += 1;
            tracing::info!("Fetching review page {} for {}", page, ctx.display_name());

            let entries = match self.api.fetch_page(ctx, page).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Failed to fetch page {} for restaurant {}: {}", page, ctx.id, e);
                    return StopReason::ApiFailure(e.to_string());
                }
            };

            if entries.is_empty() {
                tracing::info!("No more reviews found via API for restaurant {}", ctx.id);
                return StopReason::EndOfData;
            }

            run.pages_fetched += 1;
            let records = parse_reviews(&entries, ctx);
            if !run.has_new(&records) {
                tracing::warn!(
                    "Page {} for restaurant {} returned no unseen reviews",
                    page,
                    ctx.id
                );
                return StopReason::NoNewRecords;
            }

            let batch = run.accept(records, &self.quota);
            self.commit(ctx, &batch, &format!("page {}", page));
        }
    }

    fn commit(&self, ctx: &RestaurantContext, batch: &[ReviewRecord], source: &str) {
        if batch.is_empty() {
            return;
        }

        match self.sink.commit(&ctx.id, batch) {
            Ok(stored) => tracing::debug!(
                "Stored {} of {} reviews ({}) for restaurant {}",
                stored,
                batch.len(),
                source,
                ctx.id
            ),
            Err(e) => tracing::error!(
                "Failed to store {} reviews ({}) for restaurant {}: {}",
                batch.len(),
                source,
                ctx.id,
                e
            ),
        }
    }
}

/// Per-page bookkeeping for one restaurant
struct RestaurantRun {
    cap: u64,
    extracted: u64,
    pages_fetched: u32,
    seen: HashSet<String>,
}

impl RestaurantRun {
    fn new(ctx: &RestaurantContext, cap: u64) -> Self {
        tracing::debug!("Restaurant {} cap: {}", ctx.id, cap);
        Self {
            cap,
            extracted: 0,
            pages_fetched: 0,
            seen: HashSet::new(),
        }
    }

    fn limit_reached(&self, quota: &Quota, total_count: u64) -> Option<StopReason> {
        if quota.reached() {
            Some(StopReason::QuotaReached)
        } else if self.extracted >= self.cap {
            Some(StopReason::RestaurantCapReached)
        } else if self.extracted >= total_count {
            Some(StopReason::TotalReached)
        } else {
            None
        }
    }

    fn has_new(&self, records: &[ReviewRecord]) -> bool {
        records.iter().any(|r| !self.seen.contains(&r.review_id))
    }

    /// Keeps unseen records in order, bounded by the cap and the quota
    fn accept(&mut self, records: Vec<ReviewRecord>, quota: &Quota) -> Vec<ReviewRecord> {
        let mut batch_ids = HashSet::new();
        let mut fresh: Vec<ReviewRecord> = records
            .into_iter()
            .filter(|r| !self.seen.contains(&r.review_id) && batch_ids.insert(r.review_id.clone()))
            .collect();

        let room = self.cap.saturating_sub(self.extracted);
        let wanted = (fresh.len() as u64).min(room);
        let granted = quota.take(wanted);
        fresh.truncate(granted as usize);

        self.extracted += granted;
        self.seen
            .extend(fresh.iter().map(|r| r.review_id.clone()));
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::ScriptedPage;
    use crate::storage::StorageResult;
    use serde_json::{json, Value};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// Sink that keeps every committed batch in memory
    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<(String, Vec<ReviewRecord>)>>,
        fail: bool,
    }

    impl MemorySink {
        fn total(&self) -> usize {
            self.batches.lock().unwrap().iter().map(|(_, b)| b.len()).sum()
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(|(_, b)| b.len()).collect()
        }
    }

    impl ReviewSink for MemorySink {
        fn commit(&self, restaurant_id: &str, records: &[ReviewRecord]) -> StorageResult<usize> {
            if self.fail {
                return Err(crate::storage::StorageError::Database("disk full".to_string()));
            }
            self.batches
                .lock()
                .unwrap()
                .push((restaurant_id.to_string(), records.to_vec()));
            Ok(records.len())
        }
    }

    fn reviews(prefix: &str, n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({ "reviewId": format!("{}-{}", prefix, i), "rating": { "overall": 4 } }))
            .collect()
    }

    fn state(embedded: Vec<Value>, total: u64) -> Value {
        json!({
            "restaurantProfile": {
                "restaurant": { "restaurantId": 77, "name": "Test Bistro" },
                "reviewsData": { "reviewSearchResults": { "totalCount": total, "reviews": embedded } }
            }
        })
    }

    fn page_of(entries: Vec<Value>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "data": { "restaurant": { "reviewSearchResults": { "reviews": entries } } }
        }))
    }

    fn requested_page(request: &Request) -> u64 {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        body["variables"]["page"].as_u64().unwrap()
    }

    fn extractor(target: u64, cap: u64, sink: Arc<MemorySink>) -> (ReviewExtractor, Arc<Quota>) {
        let quota = Arc::new(Quota::new(target));
        let api = ReviewApiClient::new("test-agent", None, Duration::from_secs(5), 10, Arc::default())
            .unwrap();
        (
            ReviewExtractor::new(Arc::clone(&quota), api, sink, cap, PageDelay::none()),
            quota,
        )
    }

    fn detail_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/r/test-bistro", server.uri())).unwrap()
    }

    #[test]
    fn test_page_delay_bounds() {
        let delay = PageDelay {
            base: Duration::from_millis(500),
            jitter: Duration::from_millis(1000),
        };
        for _ in 0..50 {
            let d = delay.sample();
            assert!(d >= Duration::from_millis(500) && d < Duration::from_millis(1500));
        }
        assert_eq!(PageDelay::none().sample(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_aborts_without_state() {
        let sink = Arc::new(MemorySink::default());
        let (extractor, quota) = extractor(10, 100, sink.clone());
        let mut page = ScriptedPage::default();
        let url = Url::parse("https://www.opentable.com/r/missing").unwrap();

        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(outcome, ExtractionOutcome::Aborted { .. }));
        assert_eq!(quota.emitted(), 0);
        assert_eq!(sink.total(), 0);
    }

    #[tokio::test]
    async fn test_aborts_without_restaurant_id() {
        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(10, 100, sink.clone());
        let mut page = ScriptedPage::default()
            .with_state(json!({ "restaurantProfile": { "restaurant": { "name": "Nameless" } } }));
        let url = Url::parse("https://www.opentable.com/r/no-id").unwrap();

        let outcome = extractor.extract(&mut page, &url, &url).await;
        assert!(matches!(outcome, ExtractionOutcome::Aborted { .. }));
    }

    #[tokio::test]
    async fn test_zero_total_never_paginates() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(page_of(reviews("api", 10)))
            .expect(0)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(10, 100, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(vec![], 0));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 0, pages_fetched: 0, stop: StopReason::TotalReached, .. }
        ));
        assert_eq!(sink.total(), 0);
    }

    #[tokio::test]
    async fn test_quota_stops_mid_pagination() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::header("x-csrf-token", "tok"))
            .respond_with(|request: &Request| {
                let page = requested_page(request);
                page_of(reviews(&format!("p{}", page), 10))
            })
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, quota) = extractor(5, 100, sink.clone());
        let mut page = ScriptedPage::default()
            .with_state(state(reviews("embedded", 3), 10))
            .with_csrf("tok");

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert_eq!(
            outcome,
            ExtractionOutcome::Done {
                restaurant_id: "77".to_string(),
                records: 5,
                pages_fetched: 1,
                stop: StopReason::QuotaReached,
            }
        );
        assert_eq!(quota.emitted(), 5);
        assert_eq!(sink.batch_sizes(), vec![3, 2]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requested_page(&requests[0]), 2);
    }

    #[tokio::test]
    async fn test_pages_advance_by_one_until_total() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(|request: &Request| {
                let page = requested_page(request);
                page_of(reviews(&format!("p{}", page), 10))
            })
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(1000, 100, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 10), 35));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 40, pages_fetched: 3, stop: StopReason::TotalReached, .. }
        ));

        let pages: Vec<u64> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(requested_page)
            .collect();
        assert_eq!(pages, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_restaurant_cap() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(|request: &Request| {
                let page = requested_page(request);
                page_of(reviews(&format!("p{}", page), 10))
            })
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, quota) = extractor(1000, 15, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 10), 500));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 15, stop: StopReason::RestaurantCapReached, .. }
        ));
        assert_eq!(quota.emitted(), 15);
        assert_eq!(sink.batch_sizes(), vec![10, 5]);
    }

    #[tokio::test]
    async fn test_api_error_keeps_embedded_batch() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(100, 100, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 3), 30));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        match outcome {
            ExtractionOutcome::Done { records, stop, .. } => {
                assert_eq!(records, 3);
                assert!(matches!(stop, StopReason::ApiFailure(_)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(sink.total(), 3);
    }

    #[tokio::test]
    async fn test_empty_page_ends_pagination() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(page_of(vec![]))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(100, 100, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 2), 30));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;
        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 2, stop: StopReason::EndOfData, .. }
        ));
    }

    #[tokio::test]
    async fn test_repeated_page_is_deduplicated_and_stops() {
        let server = MockServer::start().await;
        // API ignores the page number and always serves the embedded reviews again
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(page_of(reviews("embedded", 5)))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, quota) = extractor(100, 100, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 5), 50));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 5, stop: StopReason::NoNewRecords, .. }
        ));
        assert_eq!(quota.emitted(), 5);
        assert_eq!(sink.total(), 5);
    }

    #[tokio::test]
    async fn test_overlapping_page_keeps_only_new_reviews() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(|request: &Request| {
                let mut entries = reviews("embedded", 2);
                entries.extend(reviews(&format!("p{}", requested_page(request)), 3));
                page_of(entries)
            })
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(100, 100, sink.clone());
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 2), 5));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 5, pages_fetched: 1, stop: StopReason::TotalReached, .. }
        ));
        assert_eq!(sink.batch_sizes(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_extraction() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(page_of(reviews("api", 5)))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink {
            fail: true,
            ..MemorySink::default()
        });
        let (extractor, quota) = extractor(100, 100, sink);
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 5), 10));

        let url = detail_url(&server);
        let outcome = extractor.extract(&mut page, &url, &url).await;

        assert!(matches!(outcome, ExtractionOutcome::Done { records: 10, .. }));
        assert_eq!(quota.emitted(), 10);
    }

    #[tokio::test]
    async fn test_restaurant_extracted_once_per_run() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(page_of(vec![]))
            .expect(0)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, quota) = extractor(5, 100, sink.clone());

        let first = Url::parse(&format!("{}/r/ivy", server.uri())).unwrap();
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 3), 3));
        let outcome = extractor.extract(&mut page, &first, &first).await;
        assert!(matches!(outcome, ExtractionOutcome::Done { records: 3, .. }));

        // Same restaurant reached through another URL
        let second = Url::parse(&format!("{}/restref/ivy", server.uri())).unwrap();
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 3), 3));
        let outcome = extractor.extract(&mut page, &second, &second).await;

        assert_eq!(
            outcome,
            ExtractionOutcome::AlreadyExtracted {
                restaurant_id: "77".to_string()
            }
        );
        assert_eq!(quota.emitted(), 3);
        assert_eq!(sink.total(), 3);
    }

    #[tokio::test]
    async fn test_api_follows_redirected_origin() {
        let requested = MockServer::start().await;
        let served = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(page_of(reviews("wrong", 10)))
            .expect(0)
            .mount(&requested)
            .await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(|request: &Request| {
                let page = requested_page(request);
                page_of(reviews(&format!("p{}", page), 10))
            })
            .mount(&served)
            .await;

        let sink = Arc::new(MemorySink::default());
        let (extractor, _) = extractor(100, 100, sink.clone());
        let page_url = Url::parse(&format!("{}/r/old", requested.uri())).unwrap();
        let served_from = Url::parse(&format!("{}/r/new", served.uri())).unwrap();
        let mut page = ScriptedPage::default().with_state(state(reviews("embedded", 2), 12));

        let outcome = extractor.extract(&mut page, &page_url, &served_from).await;

        assert!(matches!(
            outcome,
            ExtractionOutcome::Done { records: 12, pages_fetched: 1, stop: StopReason::TotalReached, .. }
        ));
        let batches = sink.batches.lock().unwrap();
        assert!(batches
            .iter()
            .flat_map(|(_, b)| b)
            .all(|r| r.restaurant_url == page_url.as_str()));
    }
}
