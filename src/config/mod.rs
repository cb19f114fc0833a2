//! Configuration module for Lot-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use lot_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Running {} workers", config.scraper.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, HttpConfig, OutputConfig, ScraperConfig, SourceConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, hash_config_text, load_config, load_config_with_hash, parse_config,
};
pub use validation::{
    validate, validate_page_limit, validate_worker_count, MAX_ATTEMPTS, MAX_WORKERS,
};
