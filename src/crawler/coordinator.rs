//! Run coordinator - main harvest orchestration logic
//!
//! A run goes through fixed phases:
//! - Claim the single-flight run state (or reject with a conflict)
//! - Record the run in storage
//! - Count search pages and discover every detail link, concurrently
//! - Start the worker pool against the filled queue and wait for it
//! - Record the final counters and release the run state

use crate::config::{validate_page_limit, validate_worker_count, Config, ScraperConfig};
use crate::crawler::discovery::{discover_all, discover_total_pages, SearchLayout};
use crate::crawler::fetcher::{FetcherFactory, HttpFetcherFactory};
use crate::crawler::queue::LinkQueue;
use crate::crawler::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::crawler::worker::{run_worker, WorkerSettings};
use crate::state::{RunGuard, RunState};
use crate::storage::{RunCounts, RunStatus, Storage, StorageError};
use crate::{ConfigError, HarvestError};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Parameters of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParams {
    /// Number of extraction workers
    pub workers: usize,
    /// Maximum number of search pages to scan
    pub page_limit: Option<u32>,
}

impl RunParams {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            workers: config.workers,
            page_limit: config.page_limit,
        }
    }

    /// Rejects a worker count outside `1..=MAX_WORKERS` and a zero page limit
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_worker_count(self.workers)?;
        if let Some(limit) = self.page_limit {
            validate_page_limit(limit)?;
        }
        Ok(())
    }

    /// Pages to scan given the number the search reports
    pub fn pages_to_scan(&self, total_pages: u32) -> u32 {
        match self.page_limit {
            Some(limit) => total_pages.min(limit),
            None => total_pages,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: i64,
    /// Search pages reported by the site before any limit
    pub total_pages: u32,
    pub counts: RunCounts,
    pub batches_flushed: u64,
}

/// Orchestrates harvest runs against one storage backend
///
/// Cloning is cheap; clones share storage and run state.
pub struct Coordinator<S> {
    config: Arc<Config>,
    config_hash: String,
    storage: Arc<Mutex<S>>,
    run_state: RunState,
    fetchers: Arc<dyn FetcherFactory>,
    sleeper: Arc<dyn Sleeper>,
}

impl<S> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_hash: self.config_hash.clone(),
            storage: Arc::clone(&self.storage),
            run_state: self.run_state.clone(),
            fetchers: Arc::clone(&self.fetchers),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<S> Coordinator<S>
where
    S: Storage + Send + 'static,
{
    /// Creates a coordinator that fetches over HTTP and sleeps on the tokio timer
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `config_hash` - Hash of the configuration file, recorded with each run
    /// * `storage` - Where listings and runs are written
    pub fn new(config: Config, config_hash: impl Into<String>, storage: S) -> Self {
        let fetchers = Arc::new(HttpFetcherFactory::from_config(&config));
        Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            storage: Arc::new(Mutex::new(storage)),
            run_state: RunState::new(),
            fetchers,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Shares an existing run state, e.g. one also read by a status endpoint
    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn with_fetchers(mut self, fetchers: Arc<dyn FetcherFactory>) -> Self {
        self.fetchers = fetchers;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn storage(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.storage)
    }

    /// Starts a run in the background
    ///
    /// Returns as soon as the run has claimed the run state. The handle can be
    /// awaited for the report or dropped.
    ///
    /// # Returns
    ///
    /// * `Ok(JoinHandle)` - The run has started
    /// * `Err(HarvestError::Config)` - The parameters are out of range; nothing is recorded
    /// * `Err(HarvestError::RunConflict)` - Another run is active; it is not affected
    pub fn start_run(
        &self,
        params: RunParams,
    ) -> Result<JoinHandle<Result<RunReport, HarvestError>>, HarvestError> {
        params.validate()?;
        let guard = self.run_state.try_begin()?;
        let coordinator = self.clone();
        Ok(tokio::spawn(async move {
            coordinator.execute(params, guard).await
        }))
    }

    /// Runs to completion on the current task
    pub async fn run(&self, params: RunParams) -> Result<RunReport, HarvestError> {
        params.validate()?;
        let guard = self.run_state.try_begin()?;
        self.execute(params, guard).await
    }

    async fn execute(&self, params: RunParams, _guard: RunGuard) -> Result<RunReport, HarvestError> {
        let run_id = self.begin_run_record()?;
        tracing::info!(
            "Starting run {} with {} workers (page limit: {})",
            run_id,
            params.workers,
            params
                .page_limit
                .map_or_else(|| "none".to_string(), |l| l.to_string())
        );

        let mut counts = RunCounts::default();
        match self.harvest(params, &mut counts).await {
            Ok((total_pages, batches_flushed)) => {
                self.finish_run_record(run_id, RunStatus::Completed, &counts)?;
                tracing::info!(
                    "Run {} complete: {} listings saved, {} links dropped",
                    run_id,
                    counts.listings_saved,
                    counts.links_dropped
                );
                Ok(RunReport {
                    run_id,
                    total_pages,
                    counts,
                    batches_flushed,
                })
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                if let Err(record_err) = self.finish_run_record(run_id, RunStatus::Failed, &counts)
                {
                    tracing::error!("Could not record failure of run {}: {}", run_id, record_err);
                }
                Err(e)
            }
        }
    }

    /// Discovery followed by extraction; returns total pages and batches flushed
    async fn harvest(
        &self,
        params: RunParams,
        counts: &mut RunCounts,
    ) -> Result<(u32, u64), HarvestError> {
        let config = &self.config;
        let layout = SearchLayout::from_config(&config.source)?;
        let discovery = self.fetchers.discovery_fetcher()?;

        let total_pages = discover_total_pages(discovery.as_ref(), &layout).await;
        let pages = params.pages_to_scan(total_pages);
        tracing::info!("Found {} pages, scanning {}", total_pages, pages);

        let queue = LinkQueue::new();
        let discovered = discover_all(
            pages,
            discovery.as_ref(),
            self.sleeper.as_ref(),
            &queue,
            &layout,
            RetryPolicy::search_page(config.scraper.max_discovery_attempts),
        )
        .await;
        counts.pages_scanned = discovered.pages_scanned;
        counts.links_queued = discovered.links_queued;

        if discovered.pages_failed > 0 {
            tracing::warn!("{} search pages could not be read", discovered.pages_failed);
        }
        tracing::info!(
            "Queue filled with {} links. Starting {} workers...",
            queue.len(),
            params.workers
        );

        let fetchers = (0..params.workers)
            .map(|worker_id| self.fetchers.worker_fetcher(worker_id))
            .collect::<Result<Vec<_>, _>>()?;
        let settings = Arc::new(WorkerSettings::from_config(&config.scraper));

        let handles: Vec<_> = fetchers
            .into_iter()
            .enumerate()
            .map(|(worker_id, fetcher)| {
                let queue = queue.clone();
                let storage = Arc::clone(&self.storage);
                let sleeper = Arc::clone(&self.sleeper);
                let settings = Arc::clone(&settings);
                tokio::spawn(async move {
                    run_worker(
                        worker_id,
                        &queue,
                        fetcher.as_ref(),
                        storage.as_ref(),
                        sleeper.as_ref(),
                        &settings,
                    )
                    .await
                })
            })
            .collect();

        let mut batches_flushed = 0;
        let mut failed_worker = None;
        for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(report) => {
                    counts.listings_saved += report.saved;
                    counts.links_dropped += report.dropped;
                    batches_flushed += report.flushes;
                }
                Err(e) => {
                    tracing::error!("Worker {} terminated abnormally: {}", worker_id, e);
                    if failed_worker.is_none() {
                        failed_worker = Some(HarvestError::Worker {
                            worker_id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        match failed_worker {
            Some(e) => Err(e),
            None => Ok((total_pages, batches_flushed)),
        }
    }

    fn begin_run_record(&self) -> Result<i64, HarvestError> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(storage.begin_run(&self.config_hash)?)
    }

    fn finish_run_record(
        &self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
    ) -> Result<(), HarvestError> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(storage.finish_run(run_id, status, counts)?)
    }
}
