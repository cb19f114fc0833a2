//! Statistics over the listing store
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::HarvestError;
use chrono::{DateTime, Utc};

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct ListingStatistics {
    /// Number of distinct listings stored
    pub total_listings: u64,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl ListingStatistics {
    /// Wall-clock duration of the latest run, once it has finished
    pub fn latest_run_duration_seconds(&self) -> Option<i64> {
        let run = self.latest_run.as_ref()?;
        let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
        let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
        Some((finished - started).num_seconds())
    }

    /// Share of queued links in the latest run that ended up stored, in percent
    pub fn latest_run_yield(&self) -> Option<f64> {
        let counts = self.latest_run.as_ref()?.counts;
        if counts.links_queued == 0 {
            return None;
        }
        Some(counts.listings_saved as f64 / counts.links_queued as f64 * 100.0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(ListingStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<ListingStatistics, HarvestError> {
    Ok(ListingStatistics {
        total_listings: storage.count_listings()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ListingStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Listings stored: {}", stats.total_listings);
    println!();

    let Some(run) = &stats.latest_run else {
        println!("No runs recorded yet.");
        return;
    };

    println!("Latest Run (#{}):", run.id);
    println!("  Status: {}", run.status.to_db_string());
    println!("  Started: {}", run.started_at);
    match &run.finished_at {
        Some(finished) => println!("  Finished: {}", finished),
        None => println!("  Finished: -"),
    }
    if let Some(seconds) = stats.latest_run_duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  Config hash: {}", run.config_hash);
    println!();

    println!("Counters:");
    println!("  Search pages scanned: {}", run.counts.pages_scanned);
    println!("  Links queued: {}", run.counts.links_queued);
    println!("  Listings saved: {}", run.counts.listings_saved);
    println!("  Links dropped: {}", run.counts.links_dropped);

    if let Some(rate) = stats.latest_run_yield() {
        println!();
        println!(
            "Yield: {:.1}% ({} / {} links stored)",
            rate, run.counts.listings_saved, run.counts.links_queued
        );
    }
}
