//! Delivery channel contract and the registry the gateway resolves channels from.
//!
//! Concrete channels (SMTP, SMS providers, ...) live outside this crate and
//! implement [`Channel`]. The gateway never inspects their concrete type; it
//! only looks them up by [`Channel::id`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Failure reported by a channel implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ChannelError(pub String);

impl ChannelError {
    pub fn new<M: Into<String>>(message: M) -> Self {
        Self(message.into())
    }
}

/// Capability interface every delivery channel must satisfy.
///
/// # Example Implementation
///
/// ```rust
/// use async_trait::async_trait;
/// use otp_gateway::channel::{Channel, ChannelError};
///
/// struct ConsoleSms;
///
/// #[async_trait]
/// impl Channel for ConsoleSms {
///     fn id(&self) -> &str { "console-sms" }
///     fn name(&self) -> &str { "Phone" }
///
///     fn validate_address(&self, to: &str) -> Result<(), ChannelError> {
///         if to.starts_with('+') && to[1..].chars().all(|c| c.is_ascii_digit()) {
///             Ok(())
///         } else {
///             Err(ChannelError::new("phone number must be in E.164 format"))
///         }
///     }
///
///     async fn push(&self, to: &str, _subject: &str, body: &[u8]) -> Result<(), ChannelError> {
///         println!("SMS to {to}: {}", String::from_utf8_lossy(body));
///         Ok(())
///     }
///
///     fn max_passcode_len(&self) -> usize { 6 }
///     fn max_body_len(&self) -> usize { 160 }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identifier records refer to.
    fn id(&self) -> &str;

    /// Human-readable channel name, e.g. "E-mail".
    fn name(&self) -> &str;

    /// Help text shown on the verification page.
    fn description(&self) -> &str {
        ""
    }

    /// Checks that `to` is a usable destination for this channel.
    fn validate_address(&self, to: &str) -> Result<(), ChannelError>;

    /// Transmits a rendered message.
    async fn push(&self, to: &str, subject: &str, body: &[u8]) -> Result<(), ChannelError>;

    /// Maximum length of passcodes generated for this channel.
    fn max_passcode_len(&self) -> usize;

    /// Maximum size of a message body in bytes.
    fn max_body_len(&self) -> usize;
}

/// Immutable mapping from channel id to implementation.
///
/// Built once by [`OtpGatewayBuilder`](crate::OtpGatewayBuilder) and never
/// mutated afterwards.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel, replacing any earlier one with the same id.
    pub(crate) fn insert(&mut self, channel: Arc<dyn Channel>) -> Option<Arc<dyn Channel>> {
        self.channels.insert(channel.id().to_string(), channel)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.ids())
            .finish()
    }
}

/// Masks a recipient address for logging, keeping the last four characters.
///
/// ```rust
/// use otp_gateway::channel::mask_recipient;
///
/// assert_eq!(mask_recipient("+1234567890"), "+******7890");
/// assert_eq!(mask_recipient("abc"), "***");
/// ```
pub fn mask_recipient(to: &str) -> String {
    let chars: Vec<char> = to.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }

    let visible: String = chars[chars.len() - 4..].iter().collect();
    if chars[0] == '+' {
        format!("+{}{}", "*".repeat(chars.len() - 5), visible)
    } else {
        format!("{}{}", "*".repeat(chars.len() - 4), visible)
    }
}

/// Development channel that logs messages through `tracing` instead of
/// delivering them.
///
/// Accepts any non-blank address and counts the messages it has "sent".
#[derive(Debug)]
pub struct LogChannel {
    id: String,
    max_passcode_len: usize,
    sent: AtomicU64,
}

impl LogChannel {
    pub fn new<I: Into<String>>(id: I) -> Self {
        Self {
            id: id.into(),
            max_passcode_len: 6,
            sent: AtomicU64::new(0),
        }
    }

    pub fn with_max_passcode_len(mut self, len: usize) -> Self {
        self.max_passcode_len = len;
        self
    }

    /// Number of messages pushed so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Log"
    }

    fn description(&self) -> &str {
        "Messages are written to the application log."
    }

    fn validate_address(&self, to: &str) -> Result<(), ChannelError> {
        if to.trim().is_empty() {
            return Err(ChannelError::new("address is empty"));
        }
        Ok(())
    }

    async fn push(&self, to: &str, subject: &str, body: &[u8]) -> Result<(), ChannelError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            channel = %self.id,
            to = %mask_recipient(to),
            subject,
            body = %String::from_utf8_lossy(body),
            "message pushed"
        );
        Ok(())
    }

    fn max_passcode_len(&self) -> usize {
        self.max_passcode_len
    }

    fn max_body_len(&self) -> usize {
        64 * 1024
    }
}
