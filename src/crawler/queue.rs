//! Shared FIFO of detail-page links
//!
//! Discovery pushes every card link it finds; workers pop until the queue is
//! empty. Popping never blocks, so a worker that finds the queue empty simply
//! exits instead of waiting on a link that will never arrive.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe link queue; clones share the same underlying queue
#[derive(Debug, Clone, Default)]
pub struct LinkQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl LinkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a link to the back of the queue
    pub fn push(&self, link: String) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(link);
    }

    /// Appends several links, preserving their order
    pub fn extend<I>(&self, links: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(links);
    }

    /// Takes the link at the front, or `None` when the queue is drained
    pub fn pop(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
