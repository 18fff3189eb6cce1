//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::ReviewRecord;
use crate::state::RequestState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RequestRecord, RestaurantSummary, RunRecord, RunStatus};
use crate::url::RequestLabel;
use crate::CrawlError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const REVIEW_COLUMNS: &str = "review_id, restaurant_id, restaurant_name, restaurant_url, rating, \
     text, author, date, visit_date, submitted_date, food_rating, service_rating, \
     ambience_rating, value_rating, noise_level, helpful_count";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str, args: impl rusqlite::Params) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, args, |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
        records_emitted: row.get::<_, i64>(5)? as u64,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRecord> {
    Ok(ReviewRecord {
        review_id: row.get(0)?,
        restaurant_id: row.get(1)?,
        restaurant_name: row.get(2)?,
        restaurant_url: row.get(3)?,
        rating: row.get(4)?,
        text: row.get(5)?,
        author: row.get(6)?,
        date: row.get(7)?,
        visit_date: row.get(8)?,
        submitted_date: row.get(9)?,
        food_rating: row.get(10)?,
        service_rating: row.get(11)?,
        ambience_rating: row.get(12)?,
        value_rating: row.get(13)?,
        noise_level: row.get(14)?,
        helpful_count: row.get(15)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, records_emitted
                 FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, records_emitted
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records_emitted: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records_emitted = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, records_emitted as i64, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Request Tracking =====

    fn record_request(&mut self, run_id: i64, request: &RequestRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO requests (url, label, state, restaurant_id, records, error_message, run_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url) DO UPDATE SET
                label = excluded.label,
                state = excluded.state,
                restaurant_id = excluded.restaurant_id,
                records = excluded.records,
                error_message = excluded.error_message,
                run_id = excluded.run_id,
                updated_at = excluded.updated_at",
            params![
                request.url,
                request.label.to_db_string(),
                request.state.to_db_string(),
                request.restaurant_id,
                request.records as i64,
                request.error_message,
                run_id,
                now
            ],
        )?;
        Ok(())
    }

    fn get_request_state(&self, url: &str) -> StorageResult<Option<RequestState>> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM requests WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(state.and_then(|s| RequestState::from_db_string(&s)))
    }

    fn count_requests_by_label(&self, label: RequestLabel) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM requests WHERE label = ?1",
            params![label.to_db_string()],
        )
    }

    fn count_requests_by_state(&self, state: RequestState) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM requests WHERE state = ?1",
            params![state.to_db_string()],
        )
    }

    fn count_total_requests(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM requests", [])
    }

    fn get_state_summary(&self) -> StorageResult<HashMap<RequestState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM requests GROUP BY state")?;

        let rows = stmt.query_map([], |row| {
            let state_str: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((state_str, count))
        })?;

        let mut summary = HashMap::new();
        for row in rows {
            let (state_str, count) = row?;
            if let Some(state) = RequestState::from_db_string(&state_str) {
                summary.insert(state, count as u64);
            }
        }

        Ok(summary)
    }

    // ===== Reviews =====

    fn insert_reviews(
        &mut self,
        run_id: i64,
        batch_seq: i64,
        records: &[ReviewRecord],
    ) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO reviews ({}, run_id, batch_seq, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                REVIEW_COLUMNS
            ))?;

            for r in records {
                inserted += stmt.execute(params![
                    r.review_id,
                    r.restaurant_id,
                    r.restaurant_name,
                    r.restaurant_url,
                    r.rating,
                    r.text,
                    r.author,
                    r.date,
                    r.visit_date,
                    r.submitted_date,
                    r.food_rating,
                    r.service_rating,
                    r.ambience_rating,
                    r.value_rating,
                    r.noise_level,
                    r.helpful_count,
                    run_id,
                    batch_seq,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn count_reviews(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM reviews", [])
    }

    fn count_reviews_for_restaurant(&self, restaurant_id: &str) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM reviews WHERE restaurant_id = ?1",
            params![restaurant_id],
        )
    }

    fn count_restaurants(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(DISTINCT restaurant_id) FROM reviews", [])
    }

    fn get_restaurant_summaries(&self) -> StorageResult<Vec<RestaurantSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT restaurant_id, MAX(restaurant_name), COUNT(*) AS n
             FROM reviews
             GROUP BY restaurant_id
             ORDER BY n DESC, restaurant_id",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(RestaurantSummary {
                    restaurant_id: row.get(0)?,
                    restaurant_name: row.get(1)?,
                    reviews: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    fn load_reviews(&self) -> StorageResult<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM reviews ORDER BY id",
            REVIEW_COLUMNS
        ))?;

        let reviews = stmt
            .query_map([], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(reviews)
    }
}
