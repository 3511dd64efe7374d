//! Conversation session for Cityboard.
//!
//! Owns the transcript, drives one request/response exchange at a time
//! against a text-generation endpoint, and publishes its state to whoever
//! renders it.

pub mod error;
pub mod generator;
pub mod session;

pub use error::ChatError;
pub use generator::{ContentGenerator, GeminiGenerator};
pub use session::{
    ConversationSession, IgnoreReason, PendingTurn, SendOutcome, SessionSnapshot, TurnOutcome,
};
