// Core lifecycle components
mod config;
mod error;
mod gateway;
mod gateway_builder;
mod record;
#[cfg(feature = "sqlite-storage")]
mod time_utils;

// Policy, generation and delivery
pub mod channel;
pub mod generator;
pub mod lockout;
pub mod message;
pub mod response;

// Storage and cleanup systems
pub mod cleanup;
pub mod storage;

// Metrics (optional feature)
#[cfg(feature = "metrics")]
pub mod metrics;

// Core components exports
pub use config::{ConfigPreset, DEFAULT_ROOT_URL, OtpConfig};
pub use error::OtpError;
pub use gateway::{IssueRequest, IssuedOtp, MIN_ID_LEN, OtpGateway};
pub use gateway_builder::OtpGatewayBuilder;
pub use lockout::LockoutInfo;
pub use record::{NewOtp, OtpRecord};

// Delivery exports
pub use channel::{Channel, ChannelError, ChannelRegistry, LogChannel};
pub use message::MessageTemplate;

// Storage and cleanup exports
pub use cleanup::{
    BoxedCleanupStrategy, CleanupStrategy, CustomCleanupStrategy, HybridCleanupStrategy,
};
pub use storage::{OtpStorage, StorageStats};

// Metrics exports (optional feature)
#[cfg(feature = "metrics")]
pub use metrics::{
    ErrorMetrics, InMemoryMetricsCollector, MetricEvent, MetricsCollector, NoOpMetricsCollector,
    OtpMetrics,
};
