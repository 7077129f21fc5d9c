use thiserror::Error;

use super::{LockoutInfo, OtpRecord};

/// Error types that can occur during OTP lifecycle operations.
///
/// # Error Categories
///
/// - **Validation Errors**: `InvalidRecipient`, `InvalidId`, `EmptyPasscode`,
///   `UnknownChannel`, `Validation`
/// - **Lifecycle Errors**: `NotFound`, `Locked`, `Mismatch`, `AlreadyClosed`
/// - **System Errors**: `DeliveryFailed`, `StorageError`, `RandomSourceFailure`,
///   `ConfigError`
///
/// The lifecycle variants that concern an existing record carry a snapshot
/// of it, so the caller can render diagnostics without a second read.
///
/// # Example
///
/// ```rust
/// use otp_gateway::{OtpError, OtpGateway};
///
/// # async fn example(gateway: OtpGateway<otp_gateway::storage::MemoryStorage>) {
/// match gateway.verify("myapp", "myotp123", "123456").await {
///     Ok(record) => println!("{} verified", record.recipient),
///     Err(OtpError::NotFound) => println!("Session expired"),
///     Err(OtpError::Locked(record)) => {
///         println!("Too many attempts, retry in {}s", record.ttl_seconds())
///     }
///     Err(OtpError::Mismatch(_)) => println!("Wrong code"),
///     Err(e) => println!("Other error: {e}"),
/// }
/// # }
/// ```
#[derive(Error, Debug)]
pub enum OtpError {
    /// The channel rejected the destination address.
    #[error("invalid `to` address: {0}")]
    InvalidRecipient(String),

    /// A caller-supplied id is shorter than the minimum length.
    #[error("ID should be min {0} chars")]
    InvalidId(usize),

    /// A verification was submitted without a passcode.
    #[error("`otp` is empty")]
    EmptyPasscode,

    /// No channel is registered under the requested id.
    #[error("unknown provider: {0}")]
    UnknownChannel(String),

    /// Any other malformed input.
    #[error("{0}")]
    Validation(String),

    /// The record does not exist or its TTL has elapsed.
    ///
    /// The two cases are deliberately indistinguishable. Callers usually
    /// present this as an expired session.
    #[error("OTP does not exist or has expired")]
    NotFound,

    /// The attempt budget has been exceeded.
    ///
    /// Carries the record as read, including the remaining TTL after which
    /// the key can be issued again.
    #[error("Too many attempts. Please retry after {} seconds.", .0.ttl_seconds())]
    Locked(Box<OtpRecord>),

    /// The supplied passcode does not match the stored one.
    #[error("OTP does not match")]
    Mismatch(Box<OtpRecord>),

    /// The record was already verified and accepts no further attempts.
    #[error("OTP is already verified")]
    AlreadyClosed(Box<OtpRecord>),

    /// The channel failed to transmit the message.
    ///
    /// The record is not rolled back; it can still be resent.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The system random source could not produce bytes.
    #[error("Random source failure: {0}")]
    RandomSourceFailure(String),

    /// The gateway was built with an unusable configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl OtpError {
    /// Creates a storage error from any displayable backend error.
    pub fn from_storage_error<E: std::fmt::Display>(err: E) -> Self {
        Self::StorageError(err.to_string())
    }

    /// Creates a storage error from a message.
    pub fn from_storage_message<M: Into<String>>(message: M) -> Self {
        Self::StorageError(message.into())
    }

    /// Returns the record snapshot attached to this error, if any.
    pub fn record(&self) -> Option<&OtpRecord> {
        match self {
            Self::Locked(record) | Self::Mismatch(record) | Self::AlreadyClosed(record) => {
                Some(record)
            }
            _ => None,
        }
    }

    /// Returns the lockout diagnostics when this is a `Locked` error.
    pub fn lockout_info(&self) -> Option<LockoutInfo> {
        match self {
            Self::Locked(record) => Some(LockoutInfo::from(record.as_ref())),
            _ => None,
        }
    }

    /// Tells whether the failure is caused by the request rather than by the
    /// system. Transports map client errors to 400 and the rest to 500.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::DeliveryFailed(_)
                | Self::StorageError(_)
                | Self::RandomSourceFailure(_)
                | Self::ConfigError(_)
        )
    }

    /// A stable short code for the variant, used for metrics and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRecipient(_) => "invalid_recipient",
            Self::InvalidId(_) => "invalid_id",
            Self::EmptyPasscode => "empty_passcode",
            Self::UnknownChannel(_) => "unknown_channel",
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::Locked(_) => "locked",
            Self::Mismatch(_) => "mismatch",
            Self::AlreadyClosed(_) => "already_closed",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::StorageError(_) => "storage_error",
            Self::RandomSourceFailure(_) => "random_source_failure",
            Self::ConfigError(_) => "config_error",
        }
    }
}
