//! Error types for the conversation session.

use cityboard_gateway::GatewayError;

/// Errors surfaced by a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// No credential configured. Nothing was sent.
    #[error("a valid Gemini API key is required")]
    MissingCredential,
    /// Network, parse, or service-reported failure; the message is passed through.
    #[error("{0}")]
    Transport(String),
}

impl From<GatewayError> for ChatError {
    fn from(err: GatewayError) -> Self {
        ChatError::Transport(err.message())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Transport(format!("unexpected generation response: {}", err))
    }
}
