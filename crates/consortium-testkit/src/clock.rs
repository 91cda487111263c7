//! Controllable physical time for deterministic tests

use async_trait::async_trait;
use consortium_core::{PhysicalTime, PhysicalTimeEffects, TimeError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Clock that only moves when a test or a sleep moves it.
///
/// Sleeping advances the clock by the requested amount and returns after
/// yielding once, so bounded waits run to their deadline without real delay.
#[derive(Debug, Clone)]
pub struct ControllableClock {
    now_ms: Arc<AtomicU64>,
    frozen: Arc<AtomicBool>,
}

impl ControllableClock {
    /// Clock starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
            frozen: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    /// Move the clock forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set the absolute time
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    /// Stop sleeps from advancing the clock
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    /// Let sleeps advance the clock again
    pub fn unfreeze(&self) {
        self.frozen.store(false, Ordering::SeqCst);
    }
}

impl Default for ControllableClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(PhysicalTime::from_ms(self.now_ms()))
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        if !self.frozen.load(Ordering::SeqCst) {
            self.advance(ms);
        }
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_advances_time() {
        let clock = ControllableClock::new(100);
        clock.sleep_ms(50).await.unwrap();
        assert_eq!(clock.physical_time().await.unwrap().ts_ms, 150);
    }

    #[tokio::test]
    async fn test_frozen_clock_ignores_sleep() {
        let clock = ControllableClock::new(100);
        clock.freeze();
        clock.sleep_ms(50).await.unwrap();
        assert_eq!(clock.now_ms(), 100);
        clock.unfreeze();
        clock.advance(5);
        assert_eq!(clock.now_ms(), 105);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = ControllableClock::new(0);
        let other = clock.clone();
        other.set(42);
        assert_eq!(clock.now_ms(), 42);
    }
}
