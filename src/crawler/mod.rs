//! Harvesting pipeline
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching and response classification
//! - Retry state machines with injectable sleeping
//! - Search-page discovery feeding a shared link queue
//! - The extraction worker pool
//! - Run coordination

mod coordinator;
mod discovery;
mod fetcher;
mod queue;
mod retry;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{Coordinator, RunParams, RunReport};
pub use discovery::{
    discover_all, discover_page_links, discover_total_pages, total_pages_for, DiscoverySummary,
    SearchLayout,
};
pub use fetcher::{
    build_http_client, fetch_url, FetchClass, FetchResult, FetcherFactory, HttpFetcher,
    HttpFetcherFactory, PageFetcher,
};
pub use queue::LinkQueue;
pub use retry::{
    backoff_delay, InstantSleeper, RetryDecision, RetryPolicy, RetryRule, RetryState, Sleeper,
    TokioSleeper,
};
pub use worker::{process_link, run_worker, LinkOutcome, WorkerReport, WorkerSettings};
