//! Lot-Harvester: a used-car listing harvester
//!
//! This crate discovers listing pages on a paginated classifieds site, extracts
//! every car detail page it links to, and upserts normalized records into SQLite,
//! refreshing listings it has already seen.

pub mod config;
pub mod crawler;
pub mod listing;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Lot-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    RunConflict(#[from] state::RunConflict),

    #[error("Worker {worker_id} terminated abnormally: {message}")]
    Worker { worker_id: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for Lot-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, RunParams, RunReport};
pub use listing::Listing;
pub use state::RunState;
