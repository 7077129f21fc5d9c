use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The persisted state of one verification challenge.
///
/// A record is addressed by `(namespace, id)` and lives until its TTL
/// elapses. The `ttl` field is not stored; every backend recomputes it from
/// its own expiry clock whenever the record is read.
///
/// The serialized form keeps the field names used on the wire by the HTTP
/// API (`otp`, `to`, `provider`, `ttl` in seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// Tenant scope the record belongs to.
    pub namespace: String,
    /// Identifier, unique within the namespace.
    pub id: String,
    /// The secret value the end user must supply.
    #[serde(rename = "otp")]
    pub passcode: String,
    /// Destination address the passcode is delivered to.
    #[serde(rename = "to")]
    pub recipient: String,
    /// Human-readable context shown on the verification page.
    #[serde(default)]
    pub description: String,
    /// Identifier of the channel that delivers this record.
    #[serde(rename = "provider")]
    pub channel: String,
    /// Issuance, verification and resend operations consumed so far.
    pub attempts: u32,
    /// Attempt budget fixed at issuance.
    pub max_attempts: u32,
    /// Time-to-live remaining at the moment the record was read.
    #[serde(with = "ttl_seconds")]
    pub ttl: Duration,
    /// Set once the passcode has been verified.
    pub closed: bool,
}

impl OtpRecord {
    /// Returns true once the attempt budget has been exceeded.
    pub fn is_locked(&self) -> bool {
        super::lockout::is_locked(self)
    }

    /// Remaining TTL in whole seconds, rounded up so a live record never
    /// reports zero.
    pub fn ttl_seconds(&self) -> u64 {
        let secs = self.ttl.as_secs();
        if self.ttl.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// The caller-controlled part of a record handed to [`OtpStorage::create`].
///
/// `attempts` and `closed` are not part of it: a freshly created record
/// always starts at one consumed attempt and open.
///
/// [`OtpStorage::create`]: crate::storage::OtpStorage::create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOtp {
    pub passcode: String,
    pub recipient: String,
    pub description: String,
    pub channel: String,
    pub max_attempts: u32,
}

impl NewOtp {
    /// Builds the record a backend returns right after writing this value.
    pub(crate) fn into_record(self, namespace: &str, id: &str, ttl: Duration) -> OtpRecord {
        OtpRecord {
            namespace: namespace.to_string(),
            id: id.to_string(),
            passcode: self.passcode,
            recipient: self.recipient,
            description: self.description,
            channel: self.channel,
            attempts: 1,
            max_attempts: self.max_attempts,
            ttl,
            closed: false,
        }
    }
}

mod ttl_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(ttl.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs.max(0.0)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OtpRecord {
        NewOtp {
            passcode: "123456".to_string(),
            recipient: "dummy@to.com".to_string(),
            description: "sign-up".to_string(),
            channel: "email".to_string(),
            max_attempts: 3,
        }
        .into_record("myapp", "myotp123", Duration::from_millis(2500))
    }

    #[test]
    fn test_new_record_starts_open_with_one_attempt() {
        let record = sample();
        assert_eq!(record.attempts, 1);
        assert!(!record.closed);
        assert!(!record.is_locked());
    }

    #[test]
    fn test_ttl_seconds_rounds_up() {
        let record = sample();
        assert_eq!(record.ttl_seconds(), 3);

        let exact = OtpRecord {
            ttl: Duration::from_secs(10),
            ..record
        };
        assert_eq!(exact.ttl_seconds(), 10);
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["otp"], "123456");
        assert_eq!(json["to"], "dummy@to.com");
        assert_eq!(json["provider"], "email");
        assert_eq!(json["ttl"], 2.5);
        assert_eq!(json["max_attempts"], 3);
        assert!(json.get("passcode").is_none());
    }

    #[test]
    fn test_deserialize_from_wire() {
        let json = r#"{
            "namespace": "myapp",
            "id": "myotp123",
            "otp": "123456",
            "to": "dummy@to.com",
            "provider": "email",
            "attempts": 2,
            "max_attempts": 3,
            "ttl": 4.0,
            "closed": true
        }"#;
        let record: OtpRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.passcode, "123456");
        assert_eq!(record.description, "");
        assert_eq!(record.ttl, Duration::from_secs(4));
        assert!(record.closed);
    }
}
