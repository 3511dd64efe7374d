//! Error types for the dashboard resolver.

use cityboard_gateway::GatewayError;
use serde::Serialize;

/// Errors surfaced by index resolution or a component fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DashboardError {
    /// Network, parse, or service-reported failure; the message is passed through.
    #[error("{message}")]
    Transport { message: String },
    /// The index response did not have the expected keys or types.
    #[error("unexpected dashboard payload: {detail}")]
    PayloadShape { detail: String },
    /// No entry under the city carries the requested index.
    #[error("Index \"{index}\" not found under city=\"{city}\".")]
    IndexNotFound { city: String, index: String },
}

impl DashboardError {
    pub fn transport(message: impl Into<String>) -> Self {
        DashboardError::Transport {
            message: message.into(),
        }
    }

    pub fn payload_shape(detail: impl Into<String>) -> Self {
        DashboardError::PayloadShape {
            detail: detail.into(),
        }
    }
}

impl From<GatewayError> for DashboardError {
    fn from(err: GatewayError) -> Self {
        DashboardError::transport(err.message())
    }
}
