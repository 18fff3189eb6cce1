//! Shared request queue feeding the worker pool
//!
//! This module handles:
//! - FIFO ordering of crawl requests
//! - Tracking in-flight requests so idle workers know when the crawl is over
//! - Closing the queue once the quota is reached

use crate::url::{classify_url, normalize_url, RequestLabel};
use crate::UrlResult;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use url::Url;

/// A unit of crawl work: a normalized URL and the kind of page it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub url: Url,
    pub label: RequestLabel,
}

impl CrawlRequest {
    /// Builds a request from a raw URL string
    ///
    /// The URL is normalized (query and fragment removed). When `label` is
    /// None it is inferred with [`classify_url`].
    pub fn parse(raw: &str, label: Option<RequestLabel>) -> UrlResult<Self> {
        let url = normalize_url(raw)?;
        let label = label.unwrap_or_else(|| classify_url(&url));
        Ok(Self { url, label })
    }

    /// Builds a DETAIL request from an already-normalized URL
    pub fn detail(url: Url) -> Self {
        Self {
            url,
            label: RequestLabel::Detail,
        }
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<CrawlRequest>,
    in_flight: usize,
    closed: bool,
}

/// FIFO queue shared by all workers
///
/// A worker that receives a request from [`RequestQueue::next`] must call
/// [`RequestQueue::complete`] once it is done with it, after pushing any
/// requests it discovered.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a request to the back of the queue
    pub fn push(&self, request: CrawlRequest) {
        {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.items.push_back(request);
        }
        self.notify.notify_waiters();
    }

    /// Waits for the next request
    ///
    /// # Returns
    ///
    /// * `Some(CrawlRequest)` - A request this worker now owns
    /// * `None` - The queue was closed, or it is empty with nothing in flight
    ///   that could still add work
    pub async fn next(&self) -> Option<CrawlRequest> {
        loop {
            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(request) = inner.items.pop_front() {
                    inner.in_flight += 1;
                    return Some(request);
                }
                if inner.in_flight == 0 {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks a request returned by `next` as finished
    pub fn complete(&self) {
        {
            let mut inner = self.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Stops handing out work; pending requests are dropped
    ///
    /// # Returns
    ///
    /// The number of pending requests that were dropped.
    pub fn close(&self) -> usize {
        let dropped = {
            let mut inner = self.lock();
            inner.closed = true;
            let dropped = inner.items.len();
            inner.items.clear();
            dropped
        };
        self.notify.notify_waiters();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of requests waiting for a worker
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
