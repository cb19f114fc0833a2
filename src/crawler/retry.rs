//! Retry state machine and pacing
//!
//! Retrying is modelled as plain data: a [`RetryPolicy`] says how each kind of
//! failure is handled, and a [`RetryState`] counts attempts and turns each fetch
//! outcome into a [`RetryDecision`]. Waiting goes through the [`Sleeper`] trait so
//! backoff can be observed in tests without real delays.

use crate::crawler::fetcher::FetchClass;
use async_trait::async_trait;
use std::time::Duration;

/// How one kind of failure is handled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryRule {
    /// Give up on the first occurrence
    Abandon,

    /// Wait `base * 2^attempt` (plus jitter when enabled), then retry
    Exponential { base: Duration, jitter: bool },

    /// Wait a fixed delay, then retry
    Fixed(Duration),
}

/// Per-failure-kind retry rules plus an attempt budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Failed attempts allowed before the item is dropped
    pub max_attempts: u32,
    pub on_rate_limited: RetryRule,
    pub on_http_error: RetryRule,
    pub on_transport: RetryRule,
}

impl RetryPolicy {
    /// Detail pages: back off on 429, wait 2s on transport errors, drop other statuses
    pub fn detail_page(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            on_rate_limited: RetryRule::Exponential {
                base: Duration::from_millis(2500),
                jitter: true,
            },
            on_http_error: RetryRule::Abandon,
            on_transport: RetryRule::Fixed(Duration::from_secs(2)),
        }
    }

    /// Search pages: every failure backs off `10 * 2^attempt` seconds
    pub fn search_page(max_attempts: u32) -> Self {
        let backoff = RetryRule::Exponential {
            base: Duration::from_secs(10),
            jitter: false,
        };
        Self {
            max_attempts,
            on_rate_limited: backoff,
            on_http_error: backoff,
            on_transport: backoff,
        }
    }

    fn rule_for(&self, class: FetchClass) -> Option<RetryRule> {
        match class {
            FetchClass::Success => None,
            FetchClass::RateLimited => Some(self.on_rate_limited),
            FetchClass::HttpError => Some(self.on_http_error),
            FetchClass::Transport => Some(self.on_transport),
        }
    }
}

/// What to do after one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// The fetch succeeded
    Done,
    /// Wait, then fetch again
    RetryAfter(Duration),
    /// The failure is not retryable
    Abandon,
    /// The attempt budget is spent
    Exhausted,
}

/// Attempt counter for a single item
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Failed attempts counted so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Feeds one outcome into the state machine
    ///
    /// `jitter` is a sample from `[0, 1)`, added in seconds to jittered backoffs.
    pub fn record(&mut self, class: FetchClass, jitter: f64) -> RetryDecision {
        let rule = match self.policy.rule_for(class) {
            None => return RetryDecision::Done,
            Some(RetryRule::Abandon) => return RetryDecision::Abandon,
            Some(rule) => rule,
        };

        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::Exhausted;
        }

        RetryDecision::RetryAfter(backoff_delay(rule, self.attempts, jitter))
    }
}

/// Computes the wait before the next attempt
pub fn backoff_delay(rule: RetryRule, attempt: u32, jitter: f64) -> Duration {
    match rule {
        RetryRule::Abandon => Duration::ZERO,
        RetryRule::Fixed(delay) => delay,
        RetryRule::Exponential { base, jitter: jittered } => {
            let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
            let mut seconds = base.as_secs_f64() * 2f64.powi(exponent);
            if jittered {
                seconds += jitter.clamp(0.0, 1.0);
            }
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        }
    }
}

/// Abstraction over waiting
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Waits on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately; for runs against local test servers
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}
