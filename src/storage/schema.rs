//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Table-Reviews database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    records_emitted INTEGER NOT NULL DEFAULT 0
);

-- Terminal state of every crawl request
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    label TEXT NOT NULL,
    state TEXT NOT NULL,
    restaurant_id TEXT,
    records INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_state ON requests(state);

-- Append-only review records
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    review_id TEXT NOT NULL,
    restaurant_id TEXT NOT NULL,
    restaurant_name TEXT,
    restaurant_url TEXT NOT NULL,
    rating REAL,
    text TEXT,
    author TEXT,
    date TEXT,
    visit_date TEXT,
    submitted_date TEXT,
    food_rating REAL,
    service_rating REAL,
    ambience_rating REAL,
    value_rating REAL,
    noise_level TEXT,
    helpful_count INTEGER,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    batch_seq INTEGER NOT NULL,
    stored_at TEXT NOT NULL,
    UNIQUE(restaurant_id, review_id)
);

CREATE INDEX IF NOT EXISTS idx_reviews_restaurant ON reviews(restaurant_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
