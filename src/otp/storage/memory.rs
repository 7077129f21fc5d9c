//! In-memory storage backend implementation.
//!
//! Records live in a `HashMap` behind a tokio `RwLock`. Every operation
//! completes while holding the lock without awaiting anything else, which
//! makes each call atomic with respect to the others. Suited to tests,
//! development and single-instance deployments.

use super::{OtpStorage, StorageStats};
use crate::otp::{NewOtp, OtpError, OtpRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

type Key = (String, String);

#[derive(Debug, Clone)]
struct Entry {
    passcode: String,
    recipient: String,
    description: String,
    channel: String,
    attempts: u32,
    max_attempts: u32,
    closed: bool,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    fn to_record(&self, key: &Key, now: Instant) -> OtpRecord {
        OtpRecord {
            namespace: key.0.clone(),
            id: key.1.clone(),
            passcode: self.passcode.clone(),
            recipient: self.recipient.clone(),
            description: self.description.clone(),
            channel: self.channel.clone(),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            ttl: self.expires_at.saturating_duration_since(now),
            closed: self.closed,
        }
    }
}

/// A simple in-memory storage implementation.
///
/// Expired records are invisible to every operation as soon as their
/// deadline passes; [`OtpStorage::cleanup_expired`] reclaims their memory.
///
/// # Example
///
/// ```rust
/// use otp_gateway::storage::{MemoryStorage, OtpStorage};
/// use otp_gateway::NewOtp;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), otp_gateway::OtpError> {
/// let storage = MemoryStorage::new();
/// let otp = NewOtp {
///     passcode: "123456".to_string(),
///     recipient: "dummy@to.com".to_string(),
///     description: String::new(),
///     channel: "email".to_string(),
///     max_attempts: 3,
/// };
///
/// let record = storage.create("myapp", "myotp123", &otp, Duration::from_secs(300)).await?;
/// assert_eq!(record.attempts, 1);
///
/// let record = storage.read("myapp", "myotp123", true).await?;
/// assert_eq!(record.attempts, 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<Key, Entry>>>,
}

impl MemoryStorage {
    /// Creates a new in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage instance with room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
        }
    }

    fn make_key(namespace: &str, id: &str) -> Key {
        (namespace.to_string(), id.to_string())
    }
}

#[async_trait]
impl OtpStorage for MemoryStorage {
    async fn create(
        &self,
        namespace: &str,
        id: &str,
        otp: &NewOtp,
        ttl: Duration,
    ) -> Result<OtpRecord, OtpError> {
        let key = Self::make_key(namespace, id);
        let mut data = self.data.write().await;
        let now = Instant::now();

        if let Some(existing) = data.get(&key).filter(|e| e.is_live(now)) {
            let record = existing.to_record(&key, now);
            if record.is_locked() {
                return Err(OtpError::Locked(Box::new(record)));
            }
        }

        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| OtpError::Validation("TTL is out of range".to_string()))?;
        data.insert(
            key,
            Entry {
                passcode: otp.passcode.clone(),
                recipient: otp.recipient.clone(),
                description: otp.description.clone(),
                channel: otp.channel.clone(),
                attempts: 1,
                max_attempts: otp.max_attempts,
                closed: false,
                expires_at,
            },
        );

        Ok(otp.clone().into_record(namespace, id, ttl))
    }

    async fn read(
        &self,
        namespace: &str,
        id: &str,
        increment: bool,
    ) -> Result<OtpRecord, OtpError> {
        let key = Self::make_key(namespace, id);
        let now = Instant::now();

        if !increment {
            let data = self.data.read().await;
            return data
                .get(&key)
                .filter(|e| e.is_live(now))
                .map(|e| e.to_record(&key, now))
                .ok_or(OtpError::NotFound);
        }

        let mut data = self.data.write().await;
        match data.get_mut(&key) {
            Some(entry) if entry.is_live(now) => {
                entry.attempts = entry.attempts.saturating_add(1);
                Ok(entry.to_record(&key, now))
            }
            Some(_) => {
                data.remove(&key);
                Err(OtpError::NotFound)
            }
            None => Err(OtpError::NotFound),
        }
    }

    async fn close(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        let key = Self::make_key(namespace, id);
        let mut data = self.data.write().await;
        let now = Instant::now();

        match data.get_mut(&key) {
            Some(entry) if entry.is_live(now) => {
                entry.closed = true;
                Ok(entry.to_record(&key, now))
            }
            Some(_) => {
                data.remove(&key);
                Err(OtpError::NotFound)
            }
            None => Err(OtpError::NotFound),
        }
    }

    async fn cleanup_expired(&self) -> Result<usize, OtpError> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        let initial_count = data.len();
        data.retain(|_, entry| entry.is_live(now));
        Ok(initial_count - data.len())
    }

    async fn get_stats(&self) -> Result<StorageStats, OtpError> {
        let data = self.data.read().await;
        let now = Instant::now();
        let live = data.values().filter(|e| e.is_live(now)).count();
        Ok(StorageStats {
            total_records: live,
            backend_info: format!(
                "In-memory HashMap storage ({} entries, {} expired pending cleanup)",
                data.len(),
                data.len() - live
            ),
        })
    }
}
