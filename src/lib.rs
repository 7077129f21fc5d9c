//! # OTP Gateway
//!
//! A Rust library that issues, verifies and rate-limits one-time passcodes
//! delivered through pluggable channels (e-mail, SMS, ...) on behalf of
//! multiple tenant namespaces.
//!
//! Each passcode lives in a TTL-bound record addressed by `(namespace, id)`.
//! Issuance, verification and resends all draw from one attempt budget per
//! record; once it is exhausted the record is locked until it expires.
//!
//! ## Features
//!
//! - **Atomic storage operations**: concurrent wrong guesses are all counted
//! - **Lockout**: a locked record can neither be checked nor re-issued
//! - **Expiry**: an expired record is indistinguishable from a missing one
//! - **Pluggable channels**: any type implementing [`Channel`]
//! - **Pluggable storage**: memory (default), SQLite and Redis backends
//! - **Async Support**: fully asynchronous API built on tokio
//!
//! ## Quick Start
//!
//! ```rust
//! use otp_gateway::channel::LogChannel;
//! use otp_gateway::{IssueRequest, OtpError, OtpGateway};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), OtpError> {
//! let gateway = OtpGateway::builder()
//!     .with_ttl(Duration::from_secs(300))
//!     .with_max_attempts(5)
//!     .with_channel(Arc::new(LogChannel::new("log")))
//!     .build_and_init()
//!     .await?;
//!
//! let issued = gateway
//!     .issue("myapp", IssueRequest::new("log", "dummy@to.com").with_id("myotp123"))
//!     .await?;
//! println!("verification page: {}", issued.url);
//!
//! match gateway.verify("myapp", "myotp123", &issued.record.passcode).await {
//!     Ok(record) => assert!(record.closed),
//!     Err(e) => println!("verification failed: {e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! ```rust
//! # #[cfg(feature = "sqlite-storage")]
//! # async fn example() -> Result<(), otp_gateway::OtpError> {
//! use otp_gateway::OtpGateway;
//! use otp_gateway::channel::LogChannel;
//! use otp_gateway::storage::SqliteStorage;
//! use std::sync::Arc;
//!
//! let gateway = OtpGateway::builder()
//!     .with_storage(Arc::new(SqliteStorage::new("otp.db")?))
//!     .with_channel(Arc::new(LogChannel::new("log")))
//!     .build_and_init()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`OtpError`]. Errors about an existing record
//! (`Locked`, `Mismatch`, `AlreadyClosed`) carry a snapshot of it, and
//! [`response::ApiResponse::from_error`] turns any error into the JSON
//! envelope HTTP transports return.

pub mod otp;

// Re-export commonly used types
pub use otp::{
    Channel, ConfigPreset, IssueRequest, IssuedOtp, LockoutInfo, NewOtp, OtpConfig, OtpError,
    OtpGateway, OtpGatewayBuilder, OtpRecord,
};

// Re-export modules at the crate root for shorter paths
pub use otp::{channel, cleanup, generator, lockout, message, response, storage};

#[cfg(feature = "metrics")]
pub use otp::metrics;
