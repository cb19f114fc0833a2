//! Test doubles for the pipeline: scripted fetcher, recording sleeper, in-memory storage

use crate::crawler::fetcher::{FetchResult, FetcherFactory, PageFetcher};
use crate::crawler::retry::Sleeper;
use crate::listing::Listing;
use crate::storage::{
    RunCounts, RunRecord, RunStatus, Storage, StorageError, StorageResult,
};
use crate::HarvestError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ok(body: &str) -> FetchResult {
    FetchResult::Success {
        body: body.to_string(),
    }
}

pub fn status(code: u16) -> FetchResult {
    if code == 429 {
        FetchResult::RateLimited
    } else {
        FetchResult::HttpError { status_code: code }
    }
}

pub fn transport() -> FetchResult {
    FetchResult::NetworkError {
        error: "connection reset".to_string(),
    }
}

/// Replays canned responses per URL
///
/// The last scripted response for a URL repeats forever. Unscripted URLs get the
/// fallback response (404 unless set).
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<FetchResult>>>,
    fallback: FetchResult,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: status(404),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, url: &str, responses: Vec<FetchResult>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    pub fn fallback(mut self, response: FetchResult) -> Self {
        self.fallback = response;
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        self.calls.lock().unwrap().push(url.to_string());

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(responses) if responses.len() > 1 => responses.pop_front().unwrap(),
            Some(responses) => responses.front().cloned().unwrap_or_else(|| status(404)),
            None => self.fallback.clone(),
        }
    }
}

/// Hands the same scripted fetcher to discovery and every worker
pub struct SharedFetcherFactory(pub Arc<ScriptedFetcher>);

impl FetcherFactory for SharedFetcherFactory {
    fn discovery_fetcher(&self) -> Result<Arc<dyn PageFetcher>, HarvestError> {
        Ok(self.0.clone())
    }

    fn worker_fetcher(&self, _worker_id: usize) -> Result<Arc<dyn PageFetcher>, HarvestError> {
        Ok(self.0.clone())
    }
}

/// Records requested sleeps without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Storage that keeps everything in vectors and remembers batch sizes
#[derive(Default)]
pub struct MemoryStorage {
    pub listings: Vec<Listing>,
    pub batches: Vec<usize>,
    pub runs: Vec<RunRecord>,
    pub fail_upserts: bool,
}

impl Storage for MemoryStorage {
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let id = self.runs.len() as i64 + 1;
        self.runs.push(RunRecord {
            id,
            started_at: "2024-01-01T00:00:00Z".to_string(),
            finished_at: None,
            config_hash: config_hash.to_string(),
            status: RunStatus::Running,
            counts: RunCounts::default(),
        });
        Ok(id)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
    ) -> StorageResult<()> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or(StorageError::RunNotFound(run_id))?;
        run.status = status;
        run.counts = *counts;
        run.finished_at = Some("2024-01-01T01:00:00Z".to_string());
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.runs
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        Ok(self.runs.last().cloned())
    }

    fn upsert_listings(&mut self, listings: &[Listing]) -> StorageResult<usize> {
        if self.fail_upserts {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.batches.push(listings.len());
        for listing in listings {
            match self
                .listings
                .iter_mut()
                .find(|l| l.source_url == listing.source_url)
            {
                Some(existing) => *existing = listing.clone(),
                None => self.listings.push(listing.clone()),
            }
        }
        Ok(listings.len())
    }

    fn get_listing(&self, source_url: &str) -> StorageResult<Option<Listing>> {
        Ok(self
            .listings
            .iter()
            .find(|l| l.source_url == source_url)
            .cloned())
    }

    fn count_listings(&self) -> StorageResult<u64> {
        Ok(self.listings.len() as u64)
    }
}
