//! Output module for reporting on harvested data
//!
//! This module handles:
//! - Loading listing and run statistics from storage
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, ListingStatistics};
