//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::listing::Listing;
use crate::storage::{RunCounts, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The harvester shares one backend between all workers behind a mutex, so
/// implementations only need to be `Send`.
pub trait Storage {
    // ===== Run Management =====

    /// Records the start of a run and returns its ID
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Records the end of a run with its final status and counters
    fn finish_run(&mut self, run_id: i64, status: RunStatus, counts: &RunCounts)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Listings =====

    /// Inserts or refreshes a batch of listings keyed by `source_url`
    ///
    /// New URLs are inserted; known URLs get every mutable field overwritten.
    /// Either way `last_seen_at` is set to the current time. The batch is applied
    /// atomically.
    ///
    /// # Returns
    ///
    /// The number of listings written
    fn upsert_listings(&mut self, listings: &[Listing]) -> StorageResult<usize>;

    /// Gets a stored listing by its source URL
    fn get_listing(&self, source_url: &str) -> StorageResult<Option<Listing>>;

    /// Counts stored listings
    fn count_listings(&self) -> StorageResult<u64>;
}
