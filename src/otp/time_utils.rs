//! Time utilities for storage backends that persist wall-clock deadlines.

use crate::otp::error::OtpError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since Unix epoch.
///
/// Returns an error instead of panicking when the system clock is before the
/// epoch.
pub(crate) fn current_timestamp_millis() -> Result<i64, OtpError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| OtpError::from_storage_message("System time is before Unix epoch"))
}

/// Deadline in epoch milliseconds `ttl` from `now`.
pub(crate) fn deadline_millis(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}

/// Time left until `deadline`, zero once it has passed.
pub(crate) fn remaining(deadline: i64, now: i64) -> Duration {
    Duration::from_millis(deadline.saturating_sub(now).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp_millis() {
        let ts = current_timestamp_millis().unwrap();
        // Should be a reasonable timestamp (after year 2020)
        assert!(ts > 1_577_836_800_000);
    }

    #[test]
    fn test_deadline_and_remaining() {
        let now = 1_000_000;
        let deadline = deadline_millis(now, Duration::from_secs(5));
        assert_eq!(deadline, 1_005_000);
        assert_eq!(remaining(deadline, now + 1_500), Duration::from_millis(3_500));
        assert_eq!(remaining(deadline, deadline + 1), Duration::ZERO);
    }

    #[test]
    fn test_deadline_saturates() {
        assert_eq!(deadline_millis(i64::MAX - 1, Duration::from_secs(10)), i64::MAX);
    }
}
