//! JSON envelope used by transports that expose the gateway over HTTP.

use serde::{Deserialize, Serialize};

use super::{LockoutInfo, OtpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{"status": "success"|"error", "message": ..., "data": ...}`
///
/// `message` and `data` are omitted when empty.
///
/// ```rust
/// use otp_gateway::response::ApiResponse;
///
/// let body = serde_json::to_string(&ApiResponse::success(vec!["email", "sms"])).unwrap();
/// assert_eq!(body, r#"{"status":"success","data":["email","sms"]}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl ApiResponse<LockoutInfo> {
    /// Error envelope for a failed operation. Lockouts carry their
    /// [`LockoutInfo`] as `data`.
    pub fn from_error(error: &OtpError) -> Self {
        Self::error(error.to_string(), error.lockout_info())
    }
}
