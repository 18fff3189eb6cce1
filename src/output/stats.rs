//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::RequestState;
use crate::storage::{RestaurantSummary, RunRecord, Storage};
use crate::url::RequestLabel;
use crate::CrawlError;
use std::collections::HashMap;

/// Restaurants listed in the printed report
const TOP_RESTAURANTS: usize = 10;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of requests recorded
    pub total_requests: u64,

    /// Count of requests by state
    pub requests_by_state: HashMap<RequestState, u64>,

    pub listing_requests: u64,
    pub detail_requests: u64,

    /// Total reviews stored
    pub total_reviews: u64,

    /// Restaurants with at least one stored review
    pub restaurants: u64,

    /// Per-restaurant review counts, largest first
    pub top_restaurants: Vec<RestaurantSummary>,

    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, CrawlError> {
    let mut top_restaurants = storage.get_restaurant_summaries()?;
    top_restaurants.truncate(TOP_RESTAURANTS);

    Ok(CrawlStatistics {
        total_requests: storage.count_total_requests()?,
        requests_by_state: storage.get_state_summary()?,
        listing_requests: storage.count_requests_by_label(RequestLabel::Listing)?,
        detail_requests: storage.count_requests_by_label(RequestLabel::Detail)?,
        total_reviews: storage.count_reviews()?,
        restaurants: storage.count_restaurants()?,
        top_restaurants,
        latest_run: storage.get_latest_run()?,
    })
}

impl CrawlStatistics {
    /// Mean stored reviews per restaurant
    pub fn reviews_per_restaurant(&self) -> f64 {
        if self.restaurants == 0 {
            0.0
        } else {
            self.total_reviews as f64 / self.restaurants as f64
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Status: {}", run.status.to_db_string());
        println!("  Reviews emitted: {}", run.records_emitted);
        println!();
    }

    println!("Requests:");
    println!("  Total: {}", stats.total_requests);
    println!("  Listing pages: {}", stats.listing_requests);
    println!("  Restaurant pages: {}", stats.detail_requests);
    println!();

    println!("Requests by State:");
    // Sort states by count (descending)
    let mut state_counts: Vec<_> = stats.requests_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        let percentage = if stats.total_requests > 0 {
            (*count as f64 / stats.total_requests as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    println!("Reviews:");
    println!("  Stored: {}", stats.total_reviews);
    println!("  Restaurants: {}", stats.restaurants);
    println!("  Per restaurant: {:.1}", stats.reviews_per_restaurant());

    if !stats.top_restaurants.is_empty() {
        println!("\nTop Restaurants:");
        for summary in &stats.top_restaurants {
            println!(
                "  {} (ID: {}): {}",
                summary.restaurant_name.as_deref().unwrap_or("<unnamed>"),
                summary.restaurant_id,
                summary.reviews
            );
        }
    }
}
