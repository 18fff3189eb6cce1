//! Output module for reporting on stored crawl results
//!
//! This module handles:
//! - Loading and printing statistics from the database
//! - Exporting stored reviews as JSON Lines

mod export;
pub mod stats;

pub use export::{export_jsonl, write_jsonl};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
