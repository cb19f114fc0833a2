//! Extraction workers
//!
//! A worker pops links until the queue is drained. Each link is fetched (with
//! retries), parsed into a [`Listing`] and added to the worker's own batch,
//! which is upserted whenever it reaches the batch size and once more when the
//! queue runs dry. Link-level failures only ever drop that link.

use crate::config::ScraperConfig;
use crate::crawler::fetcher::{FetchResult, PageFetcher};
use crate::crawler::queue::LinkQueue;
use crate::crawler::retry::{RetryDecision, RetryPolicy, RetryState, Sleeper};
use crate::listing::{parse_listing, Listing};
use crate::storage::{Storage, StorageError};
use rand::Rng;
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

/// Per-worker behaviour shared by the whole pool
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Listings accumulated before an upsert
    pub batch_size: usize,
    /// Retry rules for detail pages
    pub retry: RetryPolicy,
    /// Pause after every link, in seconds, sampled uniformly
    pub pause_secs: Range<f64>,
}

impl WorkerSettings {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::detail_page(config.max_detail_attempts),
            pause_secs: 0.5..1.5,
        }
    }

    fn sample_pause(&self) -> Duration {
        let secs = if self.pause_secs.start < self.pause_secs.end {
            rand::thread_rng().gen_range(self.pause_secs.clone())
        } else {
            self.pause_secs.start
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Result of working one link
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    /// The parsed listing, or `None` if the link was dropped
    pub listing: Option<Listing>,
    /// Number of fetches made
    pub fetches: u32,
}

/// Per-worker totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub processed: u64,
    pub saved: u64,
    pub dropped: u64,
    pub flushes: u64,
}

/// Fetches and parses one detail page
///
/// 429 and transport failures are retried according to the policy; any other
/// status drops the link straight away. A dropped link is logged, never raised.
pub async fn process_link(
    link: &str,
    fetcher: &dyn PageFetcher,
    sleeper: &dyn Sleeper,
    policy: RetryPolicy,
) -> LinkOutcome {
    let mut retry = RetryState::new(policy);
    let mut fetches = 0;

    loop {
        fetches += 1;
        let failure = match fetcher.fetch(link).await {
            FetchResult::Success { body } => {
                return LinkOutcome {
                    listing: Some(parse_listing(&body, link)),
                    fetches,
                };
            }
            failure => failure,
        };

        let jitter: f64 = rand::thread_rng().gen();
        match retry.record(failure.class(), jitter) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    "{} on {}; retry {}/{} in {:.2}s",
                    failure,
                    link,
                    retry.attempts(),
                    policy.max_attempts,
                    delay.as_secs_f64()
                );
                sleeper.sleep(delay).await;
            }
            RetryDecision::Abandon => {
                tracing::warn!("Permanent error ({}) for {}", failure, link);
                return LinkOutcome {
                    listing: None,
                    fetches,
                };
            }
            RetryDecision::Exhausted | RetryDecision::Done => {
                tracing::warn!(
                    "Dropping {} after {} failed attempts ({})",
                    link,
                    retry.attempts(),
                    failure
                );
                return LinkOutcome {
                    listing: None,
                    fetches,
                };
            }
        }
    }
}

/// Drains the queue, batching parsed listings into storage
pub async fn run_worker<S>(
    worker_id: usize,
    queue: &LinkQueue,
    fetcher: &dyn PageFetcher,
    storage: &Mutex<S>,
    sleeper: &dyn Sleeper,
    settings: &WorkerSettings,
) -> WorkerReport
where
    S: Storage + Send,
{
    let mut report = WorkerReport {
        worker_id,
        ..WorkerReport::default()
    };
    let mut batch = Vec::with_capacity(settings.batch_size);

    tracing::debug!("Worker {} started", worker_id);

    while let Some(link) = queue.pop() {
        let outcome = process_link(&link, fetcher, sleeper, settings.retry).await;
        report.processed += 1;

        match outcome.listing {
            Some(listing) => batch.push(listing),
            None => report.dropped += 1,
        }

        if batch.len() >= settings.batch_size {
            flush_batch(worker_id, storage, &mut batch, &mut report);
        }

        sleeper.sleep(settings.sample_pause()).await;
    }

    if !batch.is_empty() {
        flush_batch(worker_id, storage, &mut batch, &mut report);
    }

    tracing::info!(
        "Worker {} finished: {} links, {} saved, {} dropped",
        worker_id,
        report.processed,
        report.saved,
        report.dropped
    );

    report
}

/// Upserts a batch and clears it
///
/// A failed upsert is logged and its listings count as dropped.
fn flush_batch<S: Storage>(
    worker_id: usize,
    storage: &Mutex<S>,
    batch: &mut Vec<Listing>,
    report: &mut WorkerReport,
) {
    let size = batch.len();
    let result = match storage.lock() {
        Ok(mut storage) => storage.upsert_listings(batch),
        Err(_) => Err(StorageError::LockPoisoned),
    };

    match result {
        Ok(written) => {
            report.saved += written as u64;
            report.flushes += 1;
            tracing::info!("Worker {} saved {} listings", worker_id, written);
        }
        Err(e) => {
            report.dropped += size as u64;
            tracing::error!(
                "Worker {} failed to save {} listings: {}",
                worker_id,
                size,
                e
            );
        }
    }

    batch.clear();
}
