//! Crawler coordinator - main crawl orchestration logic
//!
//! This module owns one crawl run:
//! - Opening storage and recording the run
//! - Seeding the request queue from the configured start URLs
//! - Driving a pool of page workers until the queue drains or the quota is met
//! - Persisting every request outcome and logging the final summary

use super::api::ReviewApiClient;
use super::extraction::{ExtractionOutcome, ReviewExtractor};
use super::queue::{CrawlRequest, RequestQueue};
use super::quota::Quota;
use super::traversal::TraversalPolicy;
use crate::browser::{
    build_renderer, pick_user_agent, PageSession, Renderer, RequestFilter, WaitCondition,
};
use crate::config::Config;
use crate::state::RequestState;
use crate::storage::{RequestRecord, RunSink, RunStatus, SqliteStorage, Storage};
use crate::url::RequestLabel;
use crate::{ConfigError, CrawlError};
use reqwest::cookie::Jar;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use url::Url;

/// Final figures for a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub records_emitted: u64,
    pub target: u64,
    pub requests: HashMap<RequestState, u64>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn requests_in(&self, state: RequestState) -> u64 {
        self.requests.get(&state).copied().unwrap_or(0)
    }
}

/// State shared by every worker of a run
struct CrawlContext {
    config: Config,
    storage: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
    user_agent: String,
    /// Session cookies shared by the page renderer and the review API client
    cookies: Arc<Jar>,
    quota: Arc<Quota>,
    queue: RequestQueue,
    traversal: TraversalPolicy,
    extractor: ReviewExtractor,
    outcomes: Mutex<HashMap<RequestState, u64>>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    ctx: Arc<CrawlContext>,
}

impl Coordinator {
    /// Creates a coordinator and starts a new run in storage
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    pub fn new(config: Config, config_hash: &str) -> Result<Self, CrawlError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let run_id = storage.create_run(config_hash)?;
        let storage = Arc::new(Mutex::new(storage));

        let user_agent = pick_user_agent(&config.browser.user_agents)
            .ok_or_else(|| ConfigError::Validation("no user agents configured".to_string()))?
            .to_string();
        tracing::debug!("Run {} user agent: {}", run_id, user_agent);

        let quota = Arc::new(Quota::new(config.extraction.results_wanted));
        let cookies = Arc::new(Jar::default());
        let api = ReviewApiClient::new(
            &user_agent,
            config.proxy.as_ref().map(|p| p.url.as_str()),
            Duration::from_millis(config.crawler.navigation_timeout_ms),
            config.extraction.page_size,
            Arc::clone(&cookies),
        )?;
        let sink = Arc::new(RunSink::new(Arc::clone(&storage), run_id));
        let extractor =
            ReviewExtractor::from_config(&config.extraction, Arc::clone(&quota), api, sink);

        let traversal = TraversalPolicy::new(
            config.site.domains.clone(),
            Duration::from_millis(config.crawler.scroll_settle_ms),
        );

        let ctx = CrawlContext {
            config,
            storage,
            run_id,
            user_agent,
            cookies,
            quota,
            queue: RequestQueue::new(),
            traversal,
            extractor,
            outcomes: Mutex::new(HashMap::new()),
        };
        ctx.seed();

        Ok(Self { ctx: Arc::new(ctx) })
    }

    pub fn run_id(&self) -> i64 {
        self.ctx.run_id
    }

    /// Number of requests waiting in the queue
    pub fn pending(&self) -> usize {
        self.ctx.queue.len()
    }

    /// Runs the crawl to completion
    ///
    /// The run ends when the queue is drained or the record target is met.
    /// Failures of individual requests are recorded and never abort the run;
    /// only a renderer that cannot start does.
    pub async fn run(&self) -> Result<RunSummary, CrawlError> {
        let ctx = &self.ctx;
        let start_time = Instant::now();

        tracing::info!(
            "Starting crawl run {}: {} start requests, target {} reviews",
            ctx.run_id,
            ctx.queue.len(),
            ctx.quota.target()
        );

        let proxy = ctx.config.proxy.as_ref().map(|p| p.url.as_str());
        let cookies = Arc::clone(&ctx.cookies);
        let renderer = match build_renderer(&ctx.config.browser, &ctx.user_agent, proxy, cookies)
            .await
        {
            Ok(renderer) => renderer,
            Err(e) => {
                tracing::error!("Failed to start renderer: {}", e);
                ctx.storage()
                    .finish_run(ctx.run_id, RunStatus::Failed, ctx.quota.emitted())?;
                return Err(e.into());
            }
        };

        let workers = ctx.config.crawler.max_concurrency.max(1);
        tracing::info!("Using {} renderer with {} workers", renderer.name(), workers);

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            let ctx = Arc::clone(&self.ctx);
            let renderer = Arc::clone(&renderer);
            tasks.spawn(async move { ctx.work(worker_id, renderer).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        let dropped = ctx.queue.close();
        if dropped > 0 {
            tracing::info!("{} queued requests left unprocessed", dropped);
        }

        if let Err(e) = renderer.shutdown().await {
            tracing::warn!("Renderer shutdown failed: {}", e);
        }

        let status = if ctx.quota.reached() {
            RunStatus::QuotaReached
        } else {
            RunStatus::Exhausted
        };
        ctx.storage()
            .finish_run(ctx.run_id, status, ctx.quota.emitted())?;

        let summary = RunSummary {
            run_id: ctx.run_id,
            status,
            records_emitted: ctx.quota.emitted(),
            target: ctx.quota.target(),
            requests: ctx.outcomes().clone(),
            elapsed: start_time.elapsed(),
        };
        log_summary(&summary);

        Ok(summary)
    }
}

impl CrawlContext {
    fn storage(&self) -> MutexGuard<'_, SqliteStorage> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn outcomes(&self) -> MutexGuard<'_, HashMap<RequestState, u64>> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueues the configured start URLs
    fn seed(&self) {
        for start in &self.config.start_urls {
            match CrawlRequest::parse(start.url(), start.label()) {
                Ok(request) => self.enqueue(request),
                Err(e) => tracing::warn!("Skipping start URL {}: {}", start.url(), e),
            }
        }
    }

    fn enqueue(&self, request: CrawlRequest) {
        if self.queue.is_closed() {
            tracing::debug!("Queue closed, not enqueuing {}", request.url);
            return;
        }
        if !self.traversal.admit(&request.url) {
            tracing::debug!("Already enqueued: {}", request.url);
            return;
        }
        self.record(&RequestRecord {
            url: request.url.to_string(),
            label: request.label,
            state: RequestState::Queued,
            restaurant_id: None,
            records: 0,
            error_message: None,
        });
        self.queue.push(request);
    }

    fn record(&self, record: &RequestRecord) {
        if let Err(e) = self.storage().record_request(self.run_id, record) {
            tracing::error!("Failed to record state of {}: {}", record.url, e);
        }
    }

    /// Worker loop: one page session, requests taken until the queue closes
    async fn work(&self, worker_id: u32, renderer: Arc<dyn Renderer>) {
        let mut session = match renderer.new_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Worker {} could not open a page: {}", worker_id, e);
                return;
            }
        };

        let filter = RequestFilter::from_config(&self.config.browser);
        if let Err(e) = session.set_request_filter(&filter).await {
            tracing::warn!("Worker {} could not install request filter: {}", worker_id, e);
        }

        while let Some(request) = self.queue.next().await {
            let record = self.process(session.as_mut(), &request).await;

            *self.outcomes().entry(record.state).or_insert(0) += 1;
            self.record(&record);
            self.queue.complete();

            if self.quota.reached() && !self.queue.is_closed() {
                let dropped = self.queue.close();
                tracing::info!(
                    "Reached {} reviews, stopping crawl ({} queued requests dropped)",
                    self.quota.emitted(),
                    dropped
                );
            }
        }

        if let Err(e) = session.close().await {
            tracing::debug!("Worker {} page close failed: {}", worker_id, e);
        }
        tracing::debug!("Worker {} finished", worker_id);
    }

    /// Runs one request to a terminal state
    async fn process(&self, session: &mut dyn PageSession, request: &CrawlRequest) -> RequestRecord {
        let mut record = RequestRecord {
            url: request.url.to_string(),
            label: request.label,
            state: RequestState::Processing,
            restaurant_id: None,
            records: 0,
            error_message: None,
        };

        if self.quota.reached() {
            record.state = RequestState::Skipped;
            return record;
        }

        self.record(&record);
        tracing::info!("Processing {} ({})", request.url, request.label);

        let final_url = match self.load(session, request).await {
            Ok(final_url) => final_url,
            Err(e) => {
                tracing::error!("Giving up on {}: {}", request.url, e);
                record.state = RequestState::Failed;
                record.error_message = Some(e.to_string());
                return record;
            }
        };

        match request.label {
            RequestLabel::Listing => {
                let discovered = self.traversal.discover(session, &final_url).await;
                for found in discovered {
                    self.enqueue(found);
                }
                record.state = RequestState::Processed;
            }
            RequestLabel::Detail => match self
                .extractor
                .extract(session, &request.url, &final_url)
                .await
            {
                ExtractionOutcome::Done {
                    restaurant_id,
                    records,
                    ..
                } => {
                    record.state = RequestState::Processed;
                    record.restaurant_id = Some(restaurant_id);
                    record.records = records;
                }
                ExtractionOutcome::Aborted { reason } => {
                    record.state = RequestState::Aborted;
                    record.error_message = Some(reason);
                }
                ExtractionOutcome::AlreadyExtracted { restaurant_id } => {
                    record.state = RequestState::Skipped;
                    record.restaurant_id = Some(restaurant_id);
                    record.error_message = Some("restaurant already extracted".to_string());
                }
            },
        }

        record
    }

    /// Navigates with retries, then waits for the page to settle
    ///
    /// Returns the URL the page was served from after redirects.
    async fn load(
        &self,
        session: &mut dyn PageSession,
        request: &CrawlRequest,
    ) -> Result<Url, CrawlError> {
        let crawler = &self.config.crawler;
        let nav_timeout = Duration::from_millis(crawler.navigation_timeout_ms);
        let attempts = crawler.max_request_retries + 1;

        let mut attempt = 1;
        let final_url = loop {
            match session.navigate(&request.url, nav_timeout).await {
                Ok(final_url) => {
                    if final_url != request.url {
                        tracing::debug!("{} redirected to {}", request.url, final_url);
                    }
                    break final_url;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Navigation to {} failed (attempt {}/{}): {}",
                        request.url,
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = session.wait_for(WaitCondition::NetworkIdle, nav_timeout).await {
            tracing::debug!("{} on {}", e, request.url);
        }

        if request.label == RequestLabel::Detail {
            let timeout = Duration::from_millis(crawler.initial_state_timeout_ms);
            if let Err(e) = session.wait_for(WaitCondition::InitialState, timeout).await {
                tracing::warn!("{} on {}", e, request.url);
            }
        }

        Ok(final_url)
    }
}

fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * u64::from(attempt))
}

fn log_summary(summary: &RunSummary) {
    tracing::info!("=== Crawl run {} finished ===", summary.run_id);
    tracing::info!(
        "Reviews: {}/{} ({})",
        summary.records_emitted,
        summary.target,
        summary.status.to_db_string()
    );
    for state in RequestState::all_states() {
        let count = summary.requests_in(state);
        if count > 0 {
            tracing::info!("  {}: {}", state, count);
        }
    }
    let secs = summary.elapsed.as_secs_f64();
    tracing::info!(
        "Elapsed: {:.1}s ({:.2} reviews/sec)",
        secs,
        if secs > 0.0 {
            summary.records_emitted as f64 / secs
        } else {
            0.0
        }
    );
}

/// Runs a complete crawl operation
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `config_hash` - Hash of the configuration file
pub async fn run_crawl(config: Config, config_hash: &str) -> Result<RunSummary, CrawlError> {
    let coordinator = Coordinator::new(config, config_hash)?;
    coordinator.run().await
}
