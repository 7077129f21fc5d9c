use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::time::Instant;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use super::channel::{Channel, ChannelRegistry, mask_recipient};
use super::cleanup::BoxedCleanupStrategy;
use super::generator;
use super::message::{MessageContext, MessageTemplate};
use super::storage::{OtpStorage, StorageStats};
use super::{NewOtp, OtpConfig, OtpError, OtpRecord};

#[cfg(feature = "memory-storage")]
use super::storage::MemoryStorage;

#[cfg(feature = "metrics")]
use super::metrics::{MetricEvent, MetricsCollector, NoOpMetricsCollector, OtpMetrics};

/// Minimum length of a caller-supplied record id.
pub const MIN_ID_LEN: usize = 6;

/// Parameters of an issuance.
///
/// ```rust
/// use otp_gateway::IssueRequest;
///
/// let request = IssueRequest::new("email", "dummy@to.com")
///     .with_id("myotp123")
///     .with_description("Sign-up confirmation");
/// assert_eq!(request.passcode, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    #[serde(rename = "provider")]
    pub channel: String,
    #[serde(rename = "to")]
    pub recipient: String,
    #[serde(default)]
    pub description: String,
    /// Generated when absent or empty.
    #[serde(default)]
    pub id: Option<String>,
    /// Generated when absent or empty.
    #[serde(default, rename = "otp")]
    pub passcode: Option<String>,
}

impl IssueRequest {
    pub fn new<C: Into<String>, R: Into<String>>(channel: C, recipient: R) -> Self {
        Self {
            channel: channel.into(),
            recipient: recipient.into(),
            description: String::new(),
            id: None,
            passcode: None,
        }
    }

    pub fn with_id<I: Into<String>>(mut self, id: I) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_passcode<P: Into<String>>(mut self, passcode: P) -> Self {
        self.passcode = Some(passcode.into());
        self
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }
}

/// A freshly issued record together with its verification page URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedOtp {
    #[serde(flatten)]
    pub record: OtpRecord,
    pub url: String,
}

/// Issues, verifies and resends one-time passcodes.
///
/// The gateway holds no per-record state of its own. Every decision is made
/// on the record returned by a single atomic storage operation, so any
/// number of gateways may share one storage backend.
///
/// To create an instance, use [`OtpGateway::builder()`].
///
/// # Attempt budget
///
/// Issuance consumes the first attempt. Each verification and each resend
/// consumes one more, whether or not it succeeds. Once `attempts` exceeds
/// `max_attempts` the record is locked until its TTL runs out.
pub struct OtpGateway<S: OtpStorage> {
    pub(crate) config: OtpConfig,
    pub(crate) storage: Arc<S>,
    pub(crate) channels: ChannelRegistry,
    pub(crate) templates: HashMap<String, MessageTemplate>,
    pub(crate) default_template: MessageTemplate,
    pub(crate) cleanup_strategy: BoxedCleanupStrategy,
    #[cfg(feature = "metrics")]
    pub(crate) metrics_collector: Arc<dyn MetricsCollector>,
}

#[cfg(feature = "memory-storage")]
impl OtpGateway<MemoryStorage> {
    /// Creates a new `OtpGatewayBuilder` backed by `MemoryStorage`.
    ///
    /// Use `.with_storage()` on the builder to switch backends.
    pub fn builder() -> super::OtpGatewayBuilder<MemoryStorage> {
        super::OtpGatewayBuilder::new(Arc::new(MemoryStorage::new()))
    }
}

impl<S: OtpStorage + 'static> OtpGateway<S> {
    /// Internal constructor used by the builder.
    pub(crate) fn new(
        storage: Arc<S>,
        config: OtpConfig,
        channels: ChannelRegistry,
        templates: HashMap<String, MessageTemplate>,
        default_template: MessageTemplate,
        cleanup_strategy: BoxedCleanupStrategy,
        #[cfg(feature = "metrics")] metrics_collector: Option<Arc<dyn MetricsCollector>>,
    ) -> Self {
        Self {
            config,
            storage,
            channels,
            templates,
            default_template,
            cleanup_strategy,
            #[cfg(feature = "metrics")]
            metrics_collector: metrics_collector
                .unwrap_or_else(|| Arc::new(NoOpMetricsCollector::new())),
        }
    }

    pub(crate) async fn init(&self) -> Result<(), OtpError> {
        self.storage.init().await
    }

    /// Issues a passcode and delivers it through the requested channel.
    ///
    /// Re-issuing under an existing id replaces the record and resets its
    /// attempt count, unless that record is locked.
    ///
    /// # Errors
    ///
    /// - `UnknownChannel`, `InvalidRecipient`, `InvalidId`, `Validation` for
    ///   bad input; nothing is written.
    /// - `Locked` if a locked record lives under the id.
    /// - `DeliveryFailed` if the channel failed. The record was written and
    ///   can be resent.
    pub async fn issue(
        &self,
        namespace: &str,
        request: IssueRequest,
    ) -> Result<IssuedOtp, OtpError> {
        #[cfg(feature = "metrics")]
        let start_time = Instant::now();

        let result = self.issue_inner(namespace, request).await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(issued) => {
                self.record_metric(MetricEvent::OtpIssued {
                    channel: issued.record.channel.clone(),
                    duration: start_time.elapsed(),
                })
                .await
            }
            Err(e) => self.record_metric(MetricEvent::from_error(e)).await,
        }

        result
    }

    async fn issue_inner(
        &self,
        namespace: &str,
        request: IssueRequest,
    ) -> Result<IssuedOtp, OtpError> {
        let IssueRequest {
            channel: channel_id,
            recipient,
            description,
            id,
            passcode,
        } = request;

        let channel = self
            .channels
            .get(&channel_id)
            .ok_or_else(|| OtpError::UnknownChannel(channel_id.clone()))?;
        channel
            .validate_address(&recipient)
            .map_err(|e| OtpError::InvalidRecipient(e.to_string()))?;

        let id = match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                check_id(&id)?;
                id
            }
            None => generator::generate_id()?,
        };

        let max_len = channel.max_passcode_len();
        let passcode = match passcode.filter(|p| !p.is_empty()) {
            Some(p) if p.chars().count() > max_len => {
                return Err(OtpError::Validation(format!(
                    "`otp` should be max {max_len} chars"
                )));
            }
            Some(p) => p,
            None => generator::generate_passcode(max_len)?,
        };

        // Fails fast on a locked record; `create` repeats the check atomically.
        match self.store_read(namespace, &id, false).await {
            Ok(existing) if existing.is_locked() => {
                warn!(namespace, id = %id, "issue refused, record is locked");
                return Err(OtpError::Locked(Box::new(existing)));
            }
            Ok(_) | Err(OtpError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let new_otp = NewOtp {
            passcode,
            recipient,
            description,
            channel: channel_id,
            max_attempts: self.config.max_attempts,
        };
        let record = self
            .store_create(namespace, &id, &new_otp, self.config.ttl)
            .await?;

        self.push(channel.as_ref(), &record).await?;

        info!(
            namespace,
            id = %record.id,
            channel = %record.channel,
            to = %mask_recipient(&record.recipient),
            "otp issued"
        );

        self.maybe_trigger_cleanup().await;

        let url = self.view_url(namespace, &record.id);
        Ok(IssuedOtp { record, url })
    }

    /// Checks a passcode against the stored record.
    ///
    /// Every call that reaches storage consumes one attempt. On a match the
    /// record is closed and returned.
    ///
    /// # Errors
    ///
    /// - `EmptyPasscode` / `InvalidId` without touching storage.
    /// - `NotFound` when the record is absent or expired.
    /// - `Locked`, `AlreadyClosed` or `Mismatch` with the record as read.
    pub async fn verify(
        &self,
        namespace: &str,
        id: &str,
        passcode: &str,
    ) -> Result<OtpRecord, OtpError> {
        #[cfg(feature = "metrics")]
        let start_time = Instant::now();

        let result = self.verify_inner(namespace, id, passcode).await;

        #[cfg(feature = "metrics")]
        {
            self.record_metric(MetricEvent::VerificationAttempt {
                duration: start_time.elapsed(),
                success: result.is_ok(),
            })
            .await;
            if let Err(e) = &result {
                self.record_metric(MetricEvent::from_error(e)).await;
            }
        }

        result
    }

    async fn verify_inner(
        &self,
        namespace: &str,
        id: &str,
        passcode: &str,
    ) -> Result<OtpRecord, OtpError> {
        if passcode.is_empty() {
            return Err(OtpError::EmptyPasscode);
        }
        check_id(id)?;

        let record = self.store_read(namespace, id, true).await?;

        if record.is_locked() {
            warn!(
                namespace,
                id,
                attempts = record.attempts,
                max_attempts = record.max_attempts,
                "verification refused, record is locked"
            );
            return Err(OtpError::Locked(Box::new(record)));
        }
        if record.closed {
            return Err(OtpError::AlreadyClosed(Box::new(record)));
        }
        if !bool::from(record.passcode.as_bytes().ct_eq(passcode.as_bytes())) {
            warn!(
                namespace,
                id,
                attempts = record.attempts,
                max_attempts = record.max_attempts,
                "passcode mismatch"
            );
            return Err(OtpError::Mismatch(Box::new(record)));
        }

        let closed = self.store_close(namespace, id).await?;
        info!(namespace, id, "otp verified");
        Ok(closed)
    }

    /// Delivers the existing passcode again.
    ///
    /// Consumes one attempt of the same budget verifications use.
    pub async fn resend(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        let result = self.resend_inner(namespace, id).await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(record) => {
                self.record_metric(MetricEvent::Resent {
                    channel: record.channel.clone(),
                })
                .await
            }
            Err(e) => self.record_metric(MetricEvent::from_error(e)).await,
        }

        result
    }

    async fn resend_inner(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        let record = self.store_read(namespace, id, true).await?;

        if record.is_locked() {
            warn!(namespace, id, "resend refused, record is locked");
            return Err(OtpError::Locked(Box::new(record)));
        }
        if record.closed {
            return Err(OtpError::AlreadyClosed(Box::new(record)));
        }

        let channel = self
            .channels
            .get(&record.channel)
            .ok_or_else(|| OtpError::UnknownChannel(record.channel.clone()))?;
        self.push(channel.as_ref(), &record).await?;

        info!(
            namespace,
            id,
            to = %mask_recipient(&record.recipient),
            attempts = record.attempts,
            "otp resent"
        );
        Ok(record)
    }

    /// Loads a record for display without consuming an attempt.
    ///
    /// Closed records are returned as-is so the caller can show them as
    /// already verified; locked records fail with `Locked`.
    pub async fn view(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        let record = self.store_read(namespace, id, false).await?;
        if record.is_locked() {
            return Err(OtpError::Locked(Box::new(record)));
        }
        Ok(record)
    }

    /// Ids of the registered channels, sorted.
    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.ids()
    }

    pub fn channel(&self, id: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(id)
    }

    /// `{root_url}/otp/{namespace}/{id}`
    pub fn view_url(&self, namespace: &str, id: &str) -> String {
        format!("{}/otp/{}/{}", self.root_url(), namespace, id)
    }

    /// The one-click link embedded in messages; opening it checks `otp`.
    pub fn check_url(&self, namespace: &str, id: &str, otp: &str) -> String {
        format!("{}?otp={}&action=check", self.view_url(namespace, id), otp)
    }

    fn root_url(&self) -> &str {
        self.config.root_url.trim_end_matches('/')
    }

    /// Renders the channel's template for `record` and pushes it.
    async fn push(&self, channel: &dyn Channel, record: &OtpRecord) -> Result<(), OtpError> {
        let otp_url = self.check_url(&record.namespace, &record.id, &record.passcode);
        let template = self
            .templates
            .get(channel.id())
            .unwrap_or(&self.default_template);
        let (subject, body) = template.render(&MessageContext::new(record, channel.name(), &otp_url));

        let max_body_len = channel.max_body_len();
        if body.len() > max_body_len {
            warn!(
                channel = channel.id(),
                len = body.len(),
                max_body_len,
                "message body too long"
            );
            return Err(OtpError::DeliveryFailed(format!(
                "message body exceeds {max_body_len} bytes"
            )));
        }

        channel
            .push(&record.recipient, &subject, body.as_bytes())
            .await
            .map_err(|e| {
                warn!(
                    channel = channel.id(),
                    to = %mask_recipient(&record.recipient),
                    "delivery failed: {}",
                    e
                );
                OtpError::DeliveryFailed(e.to_string())
            })
    }

    async fn store_read(
        &self,
        namespace: &str,
        id: &str,
        increment: bool,
    ) -> Result<OtpRecord, OtpError> {
        #[cfg(feature = "metrics")]
        let start_time = Instant::now();

        let result = self.storage.read(namespace, id, increment).await;
        debug!(namespace, id, increment, found = result.is_ok(), "record read");

        #[cfg(feature = "metrics")]
        self.record_storage_operation("read", start_time.elapsed(), &result)
            .await;

        log_storage_failure("read", &result);
        result
    }

    async fn store_create(
        &self,
        namespace: &str,
        id: &str,
        otp: &NewOtp,
        ttl: Duration,
    ) -> Result<OtpRecord, OtpError> {
        #[cfg(feature = "metrics")]
        let start_time = Instant::now();

        let result = self.storage.create(namespace, id, otp, ttl).await;

        #[cfg(feature = "metrics")]
        self.record_storage_operation("create", start_time.elapsed(), &result)
            .await;

        log_storage_failure("create", &result);
        result
    }

    async fn store_close(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        #[cfg(feature = "metrics")]
        let start_time = Instant::now();

        let result = self.storage.close(namespace, id).await;

        #[cfg(feature = "metrics")]
        self.record_storage_operation("close", start_time.elapsed(), &result)
            .await;

        log_storage_failure("close", &result);
        result
    }

    #[cfg(feature = "metrics")]
    async fn record_metric(&self, event: MetricEvent) {
        self.metrics_collector.record_event(event).await;
    }

    #[cfg(feature = "metrics")]
    async fn record_storage_operation(
        &self,
        operation: &'static str,
        duration: Duration,
        result: &Result<OtpRecord, OtpError>,
    ) {
        let success = !matches!(result, Err(OtpError::StorageError(_)));
        self.record_metric(MetricEvent::StorageOperation {
            operation,
            duration,
            success,
        })
        .await;
    }

    /// Check cleanup strategy and trigger background cleanup if needed.
    async fn maybe_trigger_cleanup(&self) {
        if self.cleanup_strategy.should_cleanup().await {
            self.spawn_background_cleanup();
            self.cleanup_strategy.mark_as_cleaned().await;
        }
    }

    fn spawn_background_cleanup(&self) {
        let storage = Arc::clone(&self.storage);

        #[cfg(feature = "metrics")]
        let metrics = Arc::clone(&self.metrics_collector);

        tokio::spawn(async move {
            #[cfg(feature = "metrics")]
            let start_time = Instant::now();

            let cleanup_result = storage.cleanup_expired().await;

            #[cfg(feature = "metrics")]
            if let Ok(items_cleaned) = cleanup_result {
                metrics
                    .record_event(MetricEvent::CleanupOperation {
                        items_cleaned,
                        duration: start_time.elapsed(),
                    })
                    .await;
            }

            match cleanup_result {
                Ok(removed) => debug!(removed, "background cleanup finished"),
                Err(e) => warn!("Background cleanup failed: {}", e),
            }
        });
    }

    /// Removes expired records now, regardless of the cleanup strategy.
    pub async fn cleanup_expired(&self) -> Result<usize, OtpError> {
        self.storage.cleanup_expired().await
    }

    pub async fn storage_stats(&self) -> Result<StorageStats, OtpError> {
        self.storage.get_stats().await
    }

    /// Snapshot of the collected metrics.
    #[cfg(feature = "metrics")]
    pub async fn metrics(&self) -> Result<OtpMetrics, OtpError> {
        self.metrics_collector.get_metrics().await
    }

    /// TTL given to newly issued records.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Attempt budget given to newly issued records.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Returns a reference to the storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

fn check_id(id: &str) -> Result<(), OtpError> {
    if id.chars().count() < MIN_ID_LEN {
        return Err(OtpError::InvalidId(MIN_ID_LEN));
    }
    Ok(())
}

fn log_storage_failure(operation: &str, result: &Result<OtpRecord, OtpError>) {
    if let Err(OtpError::StorageError(e)) = result {
        error!(operation, "storage failure: {}", e);
    }
}
