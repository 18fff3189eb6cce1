//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Run tracking
//! - Terminal request state persistence
//! - The append-only review sink

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ReviewSink, Storage, StorageError, StorageResult};

use crate::crawler::ReviewRecord;
use crate::state::RequestState;
use crate::url::RequestLabel;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub records_emitted: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Stopped because the record target was met
    QuotaReached,
    /// Ran out of work before the target was met
    Exhausted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::QuotaReached => "quota_reached",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "quota_reached" => Some(Self::QuotaReached),
            "exhausted" => Some(Self::Exhausted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The outcome of one crawl request, as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub url: String,
    pub label: RequestLabel,
    pub state: RequestState,
    pub restaurant_id: Option<String>,
    pub records: u64,
    pub error_message: Option<String>,
}

/// Review count for one restaurant
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantSummary {
    pub restaurant_id: String,
    pub restaurant_name: Option<String>,
    pub reviews: u64,
}

/// Review sink writing one run's batches into SQLite
///
/// Each committed batch gets the next sequence number so the original batch
/// boundaries survive in the `reviews` table.
pub struct RunSink {
    storage: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
    batch_seq: AtomicI64,
}

impl RunSink {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, run_id: i64) -> Self {
        Self {
            storage,
            run_id,
            batch_seq: AtomicI64::new(0),
        }
    }
}

impl ReviewSink for RunSink {
    fn commit(&self, restaurant_id: &str, records: &[ReviewRecord]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let seq = self.batch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;

        let inserted = storage.insert_reviews(self.run_id, seq, records)?;
        if inserted < records.len() {
            tracing::debug!(
                "Batch {} for restaurant {}: {} of {} reviews already stored",
                seq,
                restaurant_id,
                records.len() - inserted,
                records.len()
            );
        }
        Ok(inserted)
    }
}
