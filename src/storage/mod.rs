//! Storage module for persisting harvested listings
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Idempotent listing upserts keyed by source URL
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::HarvestError;

use std::path::Path;

/// Opens a storage database
///
/// The schema is created lazily, before the first read or write.
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counts: RunCounts,
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    /// Search pages whose links were collected
    pub pages_scanned: u64,
    /// Detail links placed on the work queue
    pub links_queued: u64,
    /// Listings written to storage
    pub listings_saved: u64,
    /// Links that produced no stored listing
    pub links_dropped: u64,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
