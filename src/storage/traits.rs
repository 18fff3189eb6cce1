//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends, the narrow
//! sink interface the extraction engine writes through, and associated error
//! types.

use crate::crawler::ReviewRecord;
use crate::state::RequestState;
use crate::storage::{RequestRecord, RestaurantSummary, RunRecord, RunStatus};
use crate::url::RequestLabel;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler and the
/// reporting commands.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with its final status and emitted count
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records_emitted: u64,
    ) -> StorageResult<()>;

    // ===== Request Tracking =====

    /// Records the latest state of a crawl request, replacing any earlier row
    fn record_request(&mut self, run_id: i64, request: &RequestRecord) -> StorageResult<()>;

    /// Gets the recorded state of a request URL
    fn get_request_state(&self, url: &str) -> StorageResult<Option<RequestState>>;

    /// Counts requests with a specific label
    fn count_requests_by_label(&self, label: RequestLabel) -> StorageResult<u64>;

    /// Counts requests in a specific state
    fn count_requests_by_state(&self, state: RequestState) -> StorageResult<u64>;

    /// Counts all recorded requests
    fn count_total_requests(&self) -> StorageResult<u64>;

    /// Gets request counts for every state that occurs
    fn get_state_summary(&self) -> StorageResult<HashMap<RequestState, u64>>;

    // ===== Reviews =====

    /// Appends a batch of reviews
    ///
    /// Reviews whose (restaurant_id, review_id) pair is already stored are
    /// skipped.
    ///
    /// # Returns
    ///
    /// The number of rows actually inserted
    fn insert_reviews(
        &mut self,
        run_id: i64,
        batch_seq: i64,
        records: &[ReviewRecord],
    ) -> StorageResult<usize>;

    /// Counts all stored reviews
    fn count_reviews(&self) -> StorageResult<u64>;

    /// Counts stored reviews for one restaurant
    fn count_reviews_for_restaurant(&self, restaurant_id: &str) -> StorageResult<u64>;

    /// Counts restaurants with at least one stored review
    fn count_restaurants(&self) -> StorageResult<u64>;

    /// Gets per-restaurant review counts, largest first
    fn get_restaurant_summaries(&self) -> StorageResult<Vec<RestaurantSummary>>;

    /// Loads every stored review in insertion order
    fn load_reviews(&self) -> StorageResult<Vec<ReviewRecord>>;
}

/// Durable destination for extracted review batches
///
/// `commit` is called once per embedded batch and once per API page. Callers
/// log failures and move on; nothing is retried.
pub trait ReviewSink: Send + Sync {
    /// Appends an ordered batch of records for one restaurant
    ///
    /// # Returns
    ///
    /// The number of records durably stored
    fn commit(&self, restaurant_id: &str, records: &[ReviewRecord]) -> StorageResult<usize>;
}
