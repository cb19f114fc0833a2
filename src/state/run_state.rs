//! Single-flight run state shared between the coordinator and whatever triggers runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Returned when a run is requested while another one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("A harvest run is already in progress")]
pub struct RunConflict;

/// Owned, cloneable handle to the "is a run active" flag
///
/// Created once per process and handed to the coordinator; every clone observes
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    running: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a run holds the guard
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Marks a run as started
    ///
    /// The flag flips from false to true atomically, so of two concurrent callers
    /// exactly one gets the guard. The active run is unaffected by a rejected call.
    ///
    /// # Returns
    ///
    /// * `Ok(RunGuard)` - The caller now owns the run; dropping the guard ends it
    /// * `Err(RunConflict)` - Another run is active
    pub fn try_begin(&self) -> Result<RunGuard, RunConflict> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RunConflict)?;

        Ok(RunGuard {
            running: Arc::clone(&self.running),
        })
    }
}

/// Held for the lifetime of a run; resets the flag on drop, including on panic or abort
#[derive(Debug)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
