//! Error types for the HTTP gateway.

/// Failures produced while talking to a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid JSON response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Human-readable message with the service's own wording preserved.
    ///
    /// For `Status` this is exactly the error text the service reported.
    pub fn message(&self) -> String {
        match self {
            GatewayError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}
