//! Attempt-budget lockout policy.

use serde::{Deserialize, Serialize};

use super::OtpRecord;

/// Tells whether a record has exhausted its attempt budget.
///
/// Issuance consumes the first attempt, so a record issued with a budget of
/// `n` allows `n - 1` checks or resends before the next one locks it.
pub fn is_locked(record: &OtpRecord) -> bool {
    record.attempts > record.max_attempts
}

/// Diagnostics returned alongside a lockout so callers can tell the user
/// when to retry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockoutInfo {
    /// Seconds until the locked record expires and the key can be reissued.
    pub ttl_seconds: f64,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl From<&OtpRecord> for LockoutInfo {
    fn from(record: &OtpRecord) -> Self {
        Self {
            ttl_seconds: record.ttl.as_secs_f64(),
            attempts: record.attempts,
            max_attempts: record.max_attempts,
        }
    }
}
