use std::time::Duration;

/// Predefined configuration presets for common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Production-ready configuration.
    ///
    /// - TTL: 5 minutes
    /// - Max attempts: 5
    Production,

    /// Development-friendly configuration.
    ///
    /// Relaxed settings for manual testing:
    /// - TTL: 15 minutes
    /// - Max attempts: 10
    Development,

    /// High-security configuration.
    ///
    /// - TTL: 2 minutes
    /// - Max attempts: 3
    HighSecurity,

    /// Load configuration from environment variables.
    ///
    /// Reads configuration from:
    /// - `OTP_GATEWAY_TTL`: record TTL in seconds (default: 300)
    /// - `OTP_GATEWAY_MAX_ATTEMPTS`: attempt budget (default: 5)
    /// - `OTP_GATEWAY_ROOT_URL`: public base URL (default: `http://localhost:9000`)
    FromEnv,
}

/// Default public base URL of the verification pages.
pub const DEFAULT_ROOT_URL: &str = "http://localhost:9000";

/// Configuration for the OTP lifecycle.
///
/// # Environment Variables
///
/// - `OTP_GATEWAY_TTL`: record TTL in seconds (default: 300)
/// - `OTP_GATEWAY_MAX_ATTEMPTS`: attempt budget (default: 5)
/// - `OTP_GATEWAY_ROOT_URL`: public base URL (default: `http://localhost:9000`)
///
/// # Example
///
/// ```rust
/// use otp_gateway::{ConfigPreset, OtpConfig};
/// use std::time::Duration;
///
/// let config = OtpConfig::from(ConfigPreset::Production);
/// assert_eq!(config.ttl, Duration::from_secs(300));
///
/// let config = OtpConfig {
///     ttl: Duration::from_secs(600),
///     max_attempts: 3,
///     root_url: "https://otp.example.com".to_string(),
/// };
/// assert!(config.validate().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpConfig {
    /// Lifetime of a record from its last issuance.
    pub ttl: Duration,
    /// Attempt budget given to every new record. Issuance uses one of them.
    pub max_attempts: u32,
    /// Base URL used to build verification links, without a trailing slash.
    pub root_url: String,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(
                std::env::var("OTP_GATEWAY_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_attempts: std::env::var("OTP_GATEWAY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            root_url: std::env::var("OTP_GATEWAY_ROOT_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROOT_URL.to_string()),
        }
    }
}

impl OtpConfig {
    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.ttl.as_secs() < 60 {
            warnings.push("Very short TTL (< 1 minute) may expire codes before delivery".to_string());
        }
        if self.ttl.as_secs() > 3600 {
            warnings.push("Long TTL (> 1 hour) keeps passcodes guessable for longer".to_string());
        }

        if self.max_attempts < 2 {
            warnings.push(
                "Max attempts below 2 leaves no verification attempt after issuance".to_string(),
            );
        }
        if self.max_attempts > 20 {
            warnings.push("High max attempts (> 20) weakens brute-force protection".to_string());
        }

        if !(self.root_url.starts_with("http://") || self.root_url.starts_with("https://")) {
            warnings.push("Root URL should start with http:// or https://".to_string());
        }
        if self.root_url.ends_with('/') {
            warnings.push("Root URL should not end with a slash".to_string());
        }

        warnings
    }

    /// Returns a summary of the current configuration.
    pub fn summary(&self) -> String {
        format!(
            "OtpConfig {{ TTL: {}s, Max Attempts: {}, Root URL: {} }}",
            self.ttl.as_secs(),
            self.max_attempts,
            self.root_url,
        )
    }
}

impl From<ConfigPreset> for OtpConfig {
    fn from(preset: ConfigPreset) -> Self {
        let root_url = DEFAULT_ROOT_URL.to_string();
        match preset {
            ConfigPreset::Production => Self {
                ttl: Duration::from_secs(300),
                max_attempts: 5,
                root_url,
            },
            ConfigPreset::Development => Self {
                ttl: Duration::from_secs(900),
                max_attempts: 10,
                root_url,
            },
            ConfigPreset::HighSecurity => Self {
                ttl: Duration::from_secs(120),
                max_attempts: 3,
                root_url,
            },
            ConfigPreset::FromEnv => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env_vars() {
        unsafe {
            std::env::remove_var("OTP_GATEWAY_TTL");
            std::env::remove_var("OTP_GATEWAY_MAX_ATTEMPTS");
            std::env::remove_var("OTP_GATEWAY_ROOT_URL");
        }
    }

    #[test]
    fn test_production_preset() {
        let config = OtpConfig::from(ConfigPreset::Production);
        assert_eq!(config.ttl.as_secs(), 300);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.root_url, DEFAULT_ROOT_URL);
    }

    #[test]
    fn test_development_preset() {
        let config = OtpConfig::from(ConfigPreset::Development);
        assert_eq!(config.ttl.as_secs(), 900);
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn test_high_security_preset() {
        let config = OtpConfig::from(ConfigPreset::HighSecurity);
        assert_eq!(config.ttl.as_secs(), 120);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env_vars();

        unsafe {
            std::env::set_var("OTP_GATEWAY_TTL", "900");
            std::env::set_var("OTP_GATEWAY_MAX_ATTEMPTS", "7");
            std::env::set_var("OTP_GATEWAY_ROOT_URL", "https://otp.example.com");
        }

        let config = OtpConfig::from(ConfigPreset::FromEnv);
        assert_eq!(config.ttl.as_secs(), 900);
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.root_url, "https://otp.example.com");

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env_vars();

        unsafe {
            std::env::set_var("OTP_GATEWAY_TTL", "soon");
            std::env::set_var("OTP_GATEWAY_MAX_ATTEMPTS", "-1");
        }

        let config = OtpConfig::default();
        assert_eq!(config.ttl.as_secs(), 300);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.root_url, DEFAULT_ROOT_URL);

        clear_env_vars();
    }

    #[test]
    fn test_validation_valid_config() {
        let config = OtpConfig::from(ConfigPreset::Production);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validation_warnings() {
        let config = OtpConfig {
            ttl: Duration::from_secs(10),
            max_attempts: 1,
            root_url: "localhost/".to_string(),
        };
        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("Very short TTL")));
        assert!(warnings.iter().any(|w| w.contains("Max attempts below 2")));
        assert!(warnings.iter().any(|w| w.contains("http://")));
        assert!(warnings.iter().any(|w| w.contains("trailing") || w.contains("slash")));
    }

    #[test]
    fn test_summary() {
        let summary = OtpConfig::from(ConfigPreset::HighSecurity).summary();
        assert!(summary.contains("120s"));
        assert!(summary.contains("Max Attempts: 3"));
    }
}
