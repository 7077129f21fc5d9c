use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Decides when the gateway sweeps expired records out of its storage.
///
/// Only backends without native expiry have anything to sweep; for the
/// others [`OtpStorage::cleanup_expired`] is a no-op and the strategy merely
/// paces those no-op calls.
///
/// [`OtpStorage::cleanup_expired`]: crate::storage::OtpStorage::cleanup_expired
#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    /// Called after every successful issuance. Returning true schedules a
    /// background sweep.
    async fn should_cleanup(&self) -> bool;

    /// Called once the scheduled sweep has finished.
    async fn mark_as_cleaned(&self);
}

/// Sweeps after a number of issuances or after a period of time, whichever
/// comes first.
///
/// ```
/// use std::time::Duration;
/// use otp_gateway::cleanup::HybridCleanupStrategy;
///
/// // Sweep every 500 issuances or every 10 minutes
/// let strategy = HybridCleanupStrategy::new(500, Duration::from_secs(600));
/// ```
pub struct HybridCleanupStrategy {
    count_threshold: u32,
    time_threshold: Duration,
    issued_since_cleanup: AtomicU32,
    started: Instant,
    /// Milliseconds between `started` and the last sweep.
    last_cleanup_ms: AtomicU64,
}

impl HybridCleanupStrategy {
    pub fn new(count_threshold: u32, time_threshold: Duration) -> Self {
        Self {
            count_threshold,
            time_threshold,
            issued_since_cleanup: AtomicU32::new(0),
            started: Instant::now(),
            last_cleanup_ms: AtomicU64::new(0),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis().min(u64::MAX as u128) as u64
    }

    pub fn count_threshold(&self) -> u32 {
        self.count_threshold
    }

    pub fn time_threshold(&self) -> Duration {
        self.time_threshold
    }
}

#[async_trait]
impl CleanupStrategy for HybridCleanupStrategy {
    async fn should_cleanup(&self) -> bool {
        let issued = self.issued_since_cleanup.fetch_add(1, Ordering::SeqCst) + 1;
        if issued >= self.count_threshold {
            return true;
        }

        let since_last = self
            .elapsed_ms()
            .saturating_sub(self.last_cleanup_ms.load(Ordering::SeqCst));
        since_last >= self.time_threshold.as_millis().min(u64::MAX as u128) as u64
    }

    async fn mark_as_cleaned(&self) {
        self.issued_since_cleanup.store(0, Ordering::SeqCst);
        self.last_cleanup_ms
            .store(self.elapsed_ms(), Ordering::SeqCst);
    }
}

impl Default for HybridCleanupStrategy {
    /// 100 issuances or 5 minutes.
    fn default() -> Self {
        Self::new(100, Duration::from_secs(300))
    }
}

/// A strategy backed by an async closure.
///
/// The closure owns whatever state it needs; `mark_as_cleaned` does nothing.
///
/// ```
/// use otp_gateway::cleanup::CustomCleanupStrategy;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let maintenance_window = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&maintenance_window);
/// let strategy = CustomCleanupStrategy::new(move || {
///     let flag = Arc::clone(&flag);
///     async move { flag.load(Ordering::Relaxed) }
/// });
/// ```
pub struct CustomCleanupStrategy<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    strategy_fn: F,
}

impl<F, Fut> CustomCleanupStrategy<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    pub fn new(strategy_fn: F) -> Self {
        Self { strategy_fn }
    }
}

#[async_trait]
impl<F, Fut> CleanupStrategy for CustomCleanupStrategy<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn should_cleanup(&self) -> bool {
        (self.strategy_fn)().await
    }

    async fn mark_as_cleaned(&self) {}
}

pub type BoxedCleanupStrategy = Box<dyn CleanupStrategy>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_hybrid_count_threshold() {
        let strategy = HybridCleanupStrategy::new(3, Duration::from_secs(3600));

        assert!(!strategy.should_cleanup().await);
        assert!(!strategy.should_cleanup().await);
        assert!(strategy.should_cleanup().await);
    }

    #[tokio::test]
    async fn test_hybrid_time_threshold() {
        let strategy = HybridCleanupStrategy::new(1000, Duration::from_millis(100));
        assert!(!strategy.should_cleanup().await);

        sleep(Duration::from_millis(150)).await;
        assert!(strategy.should_cleanup().await);

        strategy.mark_as_cleaned().await;
        assert!(!strategy.should_cleanup().await);
    }

    #[tokio::test]
    async fn test_hybrid_reset_after_cleanup() {
        let strategy = HybridCleanupStrategy::new(2, Duration::from_secs(3600));

        assert!(!strategy.should_cleanup().await);
        assert!(strategy.should_cleanup().await);
        strategy.mark_as_cleaned().await;
        assert!(!strategy.should_cleanup().await);
    }

    #[test]
    fn test_hybrid_default_thresholds() {
        let strategy = HybridCleanupStrategy::default();
        assert_eq!(strategy.count_threshold(), 100);
        assert_eq!(strategy.time_threshold(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_custom_strategy_every_third_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let strategy = CustomCleanupStrategy::new(move || {
            let calls = Arc::clone(&calls_clone);
            async move { (calls.fetch_add(1, Ordering::SeqCst) + 1) % 3 == 0 }
        });

        assert!(!strategy.should_cleanup().await);
        assert!(!strategy.should_cleanup().await);
        assert!(strategy.should_cleanup().await);
        strategy.mark_as_cleaned().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
