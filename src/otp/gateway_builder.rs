use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::otp::channel::{Channel, ChannelRegistry};
use crate::otp::cleanup::{BoxedCleanupStrategy, CustomCleanupStrategy, HybridCleanupStrategy};
use crate::otp::message::MessageTemplate;
use crate::otp::storage::OtpStorage;
use crate::otp::{OtpConfig, OtpError, OtpGateway};

#[cfg(feature = "metrics")]
use crate::otp::metrics::MetricsCollector;

/// A builder for creating an `OtpGateway` instance.
///
/// Obtained from [`OtpGateway::builder()`], which starts out with
/// `MemoryStorage`, or from [`OtpGatewayBuilder::new`] with any backend.
/// Configuration defaults to [`OtpConfig::default()`], which honours the
/// `OTP_GATEWAY_*` environment variables.
///
/// # Example
///
/// ```rust
/// use otp_gateway::channel::LogChannel;
/// use otp_gateway::message::MessageTemplate;
/// use otp_gateway::{ConfigPreset, OtpGateway};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), otp_gateway::OtpError> {
/// let gateway = OtpGateway::builder()
///     .with_config(ConfigPreset::HighSecurity.into())
///     .with_channel(Arc::new(LogChannel::new("log")))
///     .with_template("log", MessageTemplate::new("Your code", "Code: {otp}"))
///     .build_and_init()
///     .await?;
/// assert_eq!(gateway.max_attempts(), 3);
/// # Ok(())
/// # }
/// ```
#[must_use = "The builder does nothing unless `.build_and_init()` is called."]
pub struct OtpGatewayBuilder<S: OtpStorage> {
    storage: Arc<S>,
    config: OtpConfig,
    channels: ChannelRegistry,
    templates: HashMap<String, MessageTemplate>,
    default_template: MessageTemplate,
    cleanup_strategy: Option<BoxedCleanupStrategy>,
    #[cfg(feature = "metrics")]
    metrics_collector: Option<Arc<dyn MetricsCollector>>,
}

impl<S: OtpStorage + 'static> OtpGatewayBuilder<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            config: OtpConfig::default(),
            channels: ChannelRegistry::new(),
            templates: HashMap::new(),
            default_template: MessageTemplate::default(),
            cleanup_strategy: None,
            #[cfg(feature = "metrics")]
            metrics_collector: None,
        }
    }

    /// Swaps the storage backend, keeping every other setting.
    pub fn with_storage<T: OtpStorage + 'static>(self, storage: Arc<T>) -> OtpGatewayBuilder<T> {
        OtpGatewayBuilder {
            storage,
            config: self.config,
            channels: self.channels,
            templates: self.templates,
            default_template: self.default_template,
            cleanup_strategy: self.cleanup_strategy,
            #[cfg(feature = "metrics")]
            metrics_collector: self.metrics_collector,
        }
    }

    pub fn with_config(mut self, config: OtpConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Base URL of the verification pages, e.g. `https://otp.example.com`.
    pub fn with_root_url<U: Into<String>>(mut self, root_url: U) -> Self {
        self.config.root_url = root_url.into();
        self
    }

    /// Registers a delivery channel under its [`Channel::id`]. A later
    /// channel with the same id replaces the earlier one.
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        if let Some(previous) = self.channels.insert(channel) {
            tracing::warn!(channel = previous.id(), "channel registered twice, keeping the last one");
        }
        self
    }

    /// Message template for one channel.
    pub fn with_template<I: Into<String>>(mut self, channel_id: I, template: MessageTemplate) -> Self {
        self.templates.insert(channel_id.into(), template);
        self
    }

    /// Message template for channels without their own.
    pub fn with_default_template(mut self, template: MessageTemplate) -> Self {
        self.default_template = template;
        self
    }

    /// Sweeps expired records after `count_threshold` issuances or after
    /// `time_threshold`, whichever comes first.
    ///
    /// The default is 100 issuances or 5 minutes.
    pub fn with_hybrid_cleanup_thresholds(
        mut self,
        count_threshold: u32,
        time_threshold: Duration,
    ) -> Self {
        let strategy = HybridCleanupStrategy::new(count_threshold, time_threshold);
        self.cleanup_strategy = Some(Box::new(strategy));
        self
    }

    /// Replaces the cleanup decision with a closure, called after each
    /// successful issuance.
    ///
    /// ```rust
    /// # use otp_gateway::OtpGateway;
    /// # use otp_gateway::channel::LogChannel;
    /// # use std::sync::Arc;
    /// # async fn example() -> Result<(), otp_gateway::OtpError> {
    /// // Never sweep; the backend expires records by itself.
    /// let gateway = OtpGateway::builder()
    ///     .with_channel(Arc::new(LogChannel::new("log")))
    ///     .with_custom_cleanup_strategy(|| async { false })
    ///     .build_and_init()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_custom_cleanup_strategy<F, Fut>(mut self, strategy_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let strategy = CustomCleanupStrategy::new(strategy_fn);
        self.cleanup_strategy = Some(Box::new(strategy));
        self
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics_collector = Some(collector);
        self
    }

    /// Builds the gateway and initializes its storage backend.
    ///
    /// # Errors
    ///
    /// `ConfigError` when no channel is registered, when a template names an
    /// unregistered channel, or when the TTL or attempt budget is zero.
    /// Storage initialization errors are passed through.
    pub async fn build_and_init(self) -> Result<OtpGateway<S>, OtpError> {
        if self.channels.is_empty() {
            return Err(OtpError::ConfigError(
                "at least one channel must be registered".to_string(),
            ));
        }
        if let Some(unknown) = self
            .templates
            .keys()
            .find(|id| self.channels.get(id).is_none())
        {
            return Err(OtpError::ConfigError(format!(
                "template registered for unknown channel `{unknown}`"
            )));
        }
        if self.config.ttl.is_zero() {
            return Err(OtpError::ConfigError("ttl must be positive".to_string()));
        }
        if self.config.max_attempts == 0 {
            return Err(OtpError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        for warning in self.config.validate() {
            tracing::warn!("{}", warning);
        }
        tracing::debug!(channels = ?self.channels, "{}", self.config.summary());

        let cleanup_strategy = self
            .cleanup_strategy
            .unwrap_or_else(|| Box::new(HybridCleanupStrategy::default()));

        let gateway = OtpGateway::new(
            self.storage,
            self.config,
            self.channels,
            self.templates,
            self.default_template,
            cleanup_strategy,
            #[cfg(feature = "metrics")]
            self.metrics_collector,
        );
        gateway.init().await?;
        Ok(gateway)
    }
}

#[cfg(all(test, feature = "memory-storage"))]
mod tests {
    use super::*;
    use crate::channel::LogChannel;
    use serial_test::serial;

    fn log_channel(id: &str) -> Arc<dyn Channel> {
        Arc::new(LogChannel::new(id))
    }

    #[tokio::test]
    async fn test_requires_a_channel() {
        let result = OtpGateway::builder().build_and_init().await;
        assert!(matches!(result, Err(OtpError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_rejects_zero_budget_and_ttl() {
        let result = OtpGateway::builder()
            .with_channel(log_channel("log"))
            .with_max_attempts(0)
            .build_and_init()
            .await;
        assert!(matches!(result, Err(OtpError::ConfigError(_))));

        let result = OtpGateway::builder()
            .with_channel(log_channel("log"))
            .with_ttl(Duration::ZERO)
            .build_and_init()
            .await;
        assert!(matches!(result, Err(OtpError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_rejects_template_for_unknown_channel() {
        let result = OtpGateway::builder()
            .with_channel(log_channel("log"))
            .with_template("sms", MessageTemplate::new("s", "{otp}"))
            .build_and_init()
            .await;
        assert!(matches!(result, Err(OtpError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_individual_settings() -> Result<(), OtpError> {
        let gateway = OtpGateway::builder()
            .with_ttl(Duration::from_secs(120))
            .with_max_attempts(4)
            .with_root_url("https://verify.example.com")
            .with_channel(log_channel("sms"))
            .with_channel(log_channel("email"))
            .build_and_init()
            .await?;

        assert_eq!(gateway.ttl(), Duration::from_secs(120));
        assert_eq!(gateway.max_attempts(), 4);
        assert_eq!(gateway.config().root_url, "https://verify.example.com");
        assert_eq!(gateway.channel_ids(), vec!["email", "sms"]);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_default_config_reads_environment() -> Result<(), OtpError> {
        unsafe {
            std::env::set_var("OTP_GATEWAY_MAX_ATTEMPTS", "7");
        }
        let gateway = OtpGateway::builder()
            .with_channel(log_channel("log"))
            .build_and_init()
            .await;
        unsafe {
            std::env::remove_var("OTP_GATEWAY_MAX_ATTEMPTS");
        }

        assert_eq!(gateway?.max_attempts(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_with_storage_keeps_settings() -> Result<(), OtpError> {
        let storage = Arc::new(crate::storage::MemoryStorage::with_capacity(16));
        let gateway = OtpGateway::builder()
            .with_max_attempts(9)
            .with_channel(log_channel("log"))
            .with_storage(Arc::clone(&storage))
            .build_and_init()
            .await?;

        assert_eq!(gateway.max_attempts(), 9);
        assert!(Arc::ptr_eq(gateway.storage(), &storage));
        Ok(())
    }
}
