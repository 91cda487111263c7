//! Bounded polling over the physical time capability
//!
//! Waits probe a condition, sleep with exponential backoff, and give up once
//! the caller's deadline has elapsed. Nothing runs in the background; dropping
//! the returned future cancels the wait.

use crate::config::WaitConfig;
use crate::effects::PhysicalTimeEffects;
use crate::errors::{ConsortiumError, Result};
use std::future::Future;
use tracing::trace;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Condition met
    Ready(T),
    /// Not yet; probe again after backing off
    Pending,
}

/// Relative deadline for a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    timeout_ms: u64,
}

impl Deadline {
    /// Deadline `timeout_ms` after the wait starts
    pub fn after_ms(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    /// Total time allowed
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

/// Exponential backoff between probes
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// First sleep between probes
    pub initial_ms: u64,
    /// Upper bound on a single sleep
    pub max_ms: u64,
    /// Growth factor applied after each sleep
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Fixed interval with no growth
    pub fn fixed(interval_ms: u64) -> Self {
        Self {
            initial_ms: interval_ms,
            max_ms: interval_ms,
            multiplier: 1.0,
        }
    }

    /// Sleep that follows `current`
    pub fn next_delay(&self, current: u64) -> u64 {
        let grown = (current as f64 * self.multiplier).ceil() as u64;
        grown.max(1).min(self.max_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&WaitConfig::default())
    }
}

impl From<&WaitConfig> for BackoffPolicy {
    fn from(config: &WaitConfig) -> Self {
        Self {
            initial_ms: config.initial_backoff_ms,
            max_ms: config.max_backoff_ms,
            multiplier: config.backoff_multiplier,
        }
    }
}

/// Probe until ready, the probe fails, or the deadline passes.
///
/// The probe always runs at least once. Probe errors end the wait
/// immediately; an elapsed deadline yields [`ConsortiumError::Timeout`].
pub async fn poll_until<T, E, F, Fut>(
    time: &E,
    deadline: Deadline,
    backoff: &BackoffPolicy,
    what: &str,
    mut probe: F,
) -> Result<T>
where
    E: PhysicalTimeEffects + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>>>,
{
    let started = time.physical_time().await?;
    let mut delay = backoff.initial_ms.max(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let PollOutcome::Ready(value) = probe().await? {
            trace!(what, attempts, "wait condition met");
            return Ok(value);
        }

        let waited = time.physical_time().await?.since(started);
        if waited >= deadline.timeout_ms {
            return Err(ConsortiumError::timeout(what, waited));
        }

        let sleep = delay.min(deadline.timeout_ms - waited);
        trace!(what, attempts, sleep_ms = sleep, "wait condition pending");
        time.sleep_ms(sleep).await?;
        delay = backoff.next_delay(delay);
    }
}
