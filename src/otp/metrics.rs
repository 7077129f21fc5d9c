//! Optional metrics collection for gateway operations.
//!
//! Enabled with the `metrics` feature. The gateway emits one
//! [`MetricEvent`] per lifecycle operation into whatever
//! [`MetricsCollector`] the builder was given.

use crate::otp::OtpError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters tracked across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpMetrics {
    /// Records issued (successful `issue` calls)
    pub otps_issued: u64,
    /// Verification attempts, successful or not
    pub verification_attempts: u64,
    pub verification_successes: u64,
    pub verification_failures: u64,
    /// Successful resends
    pub resends: u64,
    /// Storage operations that completed
    pub storage_operations: u64,
    /// Background sweeps run
    pub cleanup_operations: u64,
    /// Expired records removed by those sweeps
    pub records_cleaned: u64,
    pub error_counts: ErrorMetrics,
    /// Mean verification latency in microseconds
    pub avg_verification_time_us: u64,
}

/// Error counts by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMetrics {
    pub not_found: u64,
    pub locked: u64,
    pub mismatch: u64,
    pub delivery_failed: u64,
    pub storage_errors: u64,
    /// Everything else, validation errors included
    pub other_errors: u64,
}

/// Events emitted by the gateway.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    OtpIssued {
        channel: String,
        duration: Duration,
    },
    VerificationAttempt {
        duration: Duration,
        success: bool,
    },
    Resent {
        channel: String,
    },
    StorageOperation {
        /// `create`, `read` or `close`
        operation: &'static str,
        duration: Duration,
        success: bool,
    },
    CleanupOperation {
        items_cleaned: usize,
        duration: Duration,
    },
    Error {
        /// See [`OtpError::error_code`]
        error_code: &'static str,
        error_message: String,
    },
}

impl MetricEvent {
    pub fn from_error(error: &OtpError) -> Self {
        Self::Error {
            error_code: error.error_code(),
            error_message: error.to_string(),
        }
    }
}

/// Sink for gateway metric events.
///
/// Implementations must be cheap to call; the gateway awaits
/// `record_event` inline on the request path.
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    async fn record_event(&self, event: MetricEvent);

    async fn get_metrics(&self) -> Result<OtpMetrics, OtpError>;

    async fn reset_metrics(&self) -> Result<(), OtpError>;

    /// Flush buffered events to an external system, if any.
    async fn flush(&self) -> Result<(), OtpError> {
        Ok(())
    }
}

/// Atomic counters held in process memory.
///
/// ```rust
/// use otp_gateway::metrics::{InMemoryMetricsCollector, MetricEvent, MetricsCollector};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), otp_gateway::OtpError> {
/// let collector = InMemoryMetricsCollector::new();
/// collector
///     .record_event(MetricEvent::VerificationAttempt {
///         duration: Duration::from_micros(250),
///         success: true,
///     })
///     .await;
///
/// let metrics = collector.get_metrics().await?;
/// assert_eq!(metrics.verification_successes, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetricsCollector {
    otps_issued: AtomicU64,
    verification_attempts: AtomicU64,
    verification_successes: AtomicU64,
    verification_failures: AtomicU64,
    resends: AtomicU64,
    storage_operations: AtomicU64,
    cleanup_operations: AtomicU64,
    records_cleaned: AtomicU64,

    not_found_errors: AtomicU64,
    locked_errors: AtomicU64,
    mismatch_errors: AtomicU64,
    delivery_errors: AtomicU64,
    storage_errors: AtomicU64,
    other_errors: AtomicU64,

    verification_time_total_us: AtomicU64,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> [&AtomicU64; 15] {
        [
            &self.otps_issued,
            &self.verification_attempts,
            &self.verification_successes,
            &self.verification_failures,
            &self.resends,
            &self.storage_operations,
            &self.cleanup_operations,
            &self.records_cleaned,
            &self.not_found_errors,
            &self.locked_errors,
            &self.mismatch_errors,
            &self.delivery_errors,
            &self.storage_errors,
            &self.other_errors,
            &self.verification_time_total_us,
        ]
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[async_trait]
impl MetricsCollector for InMemoryMetricsCollector {
    async fn record_event(&self, event: MetricEvent) {
        match event {
            MetricEvent::OtpIssued { .. } => bump(&self.otps_issued),
            MetricEvent::VerificationAttempt { duration, success } => {
                bump(&self.verification_attempts);
                if success {
                    bump(&self.verification_successes);
                } else {
                    bump(&self.verification_failures);
                }
                self.verification_time_total_us
                    .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
            }
            MetricEvent::Resent { .. } => bump(&self.resends),
            MetricEvent::StorageOperation { success, .. } => {
                if success {
                    bump(&self.storage_operations);
                }
            }
            MetricEvent::CleanupOperation { items_cleaned, .. } => {
                bump(&self.cleanup_operations);
                self.records_cleaned
                    .fetch_add(items_cleaned as u64, Ordering::Relaxed);
            }
            MetricEvent::Error { error_code, .. } => match error_code {
                "not_found" => bump(&self.not_found_errors),
                "locked" => bump(&self.locked_errors),
                "mismatch" => bump(&self.mismatch_errors),
                "delivery_failed" => bump(&self.delivery_errors),
                "storage_error" => bump(&self.storage_errors),
                _ => bump(&self.other_errors),
            },
        }
    }

    async fn get_metrics(&self) -> Result<OtpMetrics, OtpError> {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let attempts = load(&self.verification_attempts);

        Ok(OtpMetrics {
            otps_issued: load(&self.otps_issued),
            verification_attempts: attempts,
            verification_successes: load(&self.verification_successes),
            verification_failures: load(&self.verification_failures),
            resends: load(&self.resends),
            storage_operations: load(&self.storage_operations),
            cleanup_operations: load(&self.cleanup_operations),
            records_cleaned: load(&self.records_cleaned),
            error_counts: ErrorMetrics {
                not_found: load(&self.not_found_errors),
                locked: load(&self.locked_errors),
                mismatch: load(&self.mismatch_errors),
                delivery_failed: load(&self.delivery_errors),
                storage_errors: load(&self.storage_errors),
                other_errors: load(&self.other_errors),
            },
            avg_verification_time_us: load(&self.verification_time_total_us)
                .checked_div(attempts)
                .unwrap_or(0),
        })
    }

    async fn reset_metrics(&self) -> Result<(), OtpError> {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoOpMetricsCollector;

impl NoOpMetricsCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsCollector for NoOpMetricsCollector {
    async fn record_event(&self, _event: MetricEvent) {}

    async fn get_metrics(&self) -> Result<OtpMetrics, OtpError> {
        Ok(OtpMetrics::default())
    }

    async fn reset_metrics(&self) -> Result<(), OtpError> {
        Ok(())
    }
}
