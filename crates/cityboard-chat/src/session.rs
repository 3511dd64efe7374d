//! Conversation session: transcript ownership and turn orchestration.
//!
//! At most one turn is in flight. `send` appends the user message before the
//! request is issued, so the message is observable immediately. The reply is
//! committed by a spawned task only if the turn is still current: `start`
//! resets the session and makes any in-flight turn stale.

use std::sync::{Arc, Mutex, MutexGuard};

use cityboard_core::config::ChatConfig;
use cityboard_core::generation::{Generation, GenerationToken};
use cityboard_core::types::Message;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ChatError;
use crate::generator::ContentGenerator;

/// Everything a renderer needs to draw the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub model: String,
    pub transcript: Vec<Message>,
    /// Composer contents.
    pub draft: String,
    /// True from an accepted `send` until its turn resolves.
    pub loading: bool,
    pub error: Option<ChatError>,
}

/// Why a `send` call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The text was empty after trimming.
    EmptyText,
    /// Another turn is still pending.
    Busy,
}

/// Result of calling `send`.
#[derive(Debug)]
pub enum SendOutcome {
    /// The user message was appended and a request is in flight.
    Accepted(PendingTurn),
    /// Nothing changed.
    Ignored(IgnoreReason),
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted(_))
    }

    /// The pending turn, if the send was accepted.
    pub fn into_pending(self) -> Option<PendingTurn> {
        match self {
            SendOutcome::Accepted(turn) => Some(turn),
            SendOutcome::Ignored(_) => None,
        }
    }
}

/// How a turn ended, as seen by the caller that started it.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model message that was appended.
    Replied(Message),
    /// The request failed; the error is also in the snapshot.
    Failed(ChatError),
    /// The session was restarted before the reply arrived; nothing was committed.
    Superseded,
}

/// Handle to an in-flight turn.
#[derive(Debug)]
pub struct PendingTurn {
    token: GenerationToken,
    handle: JoinHandle<TurnOutcome>,
}

impl PendingTurn {
    pub fn token(&self) -> GenerationToken {
        self.token
    }

    /// Wait for the turn to resolve.
    pub async fn wait(self) -> TurnOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => TurnOutcome::Failed(ChatError::Transport(format!(
                "generation task aborted: {}",
                e
            ))),
        }
    }
}

struct Shared {
    generation: Generation,
    state: Mutex<SessionSnapshot>,
    updates: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &SessionSnapshot) {
        self.updates.send_replace(state.clone());
    }

    /// Commit a finished turn if it is still the current one.
    fn complete(
        &self,
        token: GenerationToken,
        result: Result<String, ChatError>,
        placeholder: &str,
    ) -> TurnOutcome {
        let mut state = self.lock();
        if !self.generation.is_current(token) {
            tracing::debug!(
                session_id = %state.session_id,
                generation = %token,
                current = %self.generation.current(),
                "Dropping reply for superseded turn"
            );
            return TurnOutcome::Superseded;
        }

        state.loading = false;
        let outcome = match result {
            Ok(text) => {
                let text = if text.is_empty() {
                    placeholder.to_string()
                } else {
                    text
                };
                let message = Message::model(text);
                state.transcript.push(message.clone());
                tracing::debug!(
                    session_id = %state.session_id,
                    transcript_len = state.transcript.len(),
                    "Turn completed"
                );
                TurnOutcome::Replied(message)
            }
            Err(err) => {
                tracing::warn!(session_id = %state.session_id, error = %err, "Turn failed");
                state.error = Some(err.clone());
                TurnOutcome::Failed(err)
            }
        };
        self.publish(&state);
        outcome
    }
}

/// A multi-turn conversation against a [`ContentGenerator`].
///
/// Cheap to clone; clones share the same transcript.
#[derive(Clone)]
pub struct ConversationSession {
    generator: Arc<dyn ContentGenerator>,
    placeholder: String,
    suggestions: Vec<String>,
    shared: Arc<Shared>,
}

impl ConversationSession {
    /// Create a session with an empty transcript. Call `start` to greet.
    pub fn new(generator: Arc<dyn ContentGenerator>, config: &ChatConfig) -> Self {
        let initial = SessionSnapshot {
            session_id: Uuid::new_v4(),
            model: config.model.clone(),
            transcript: Vec::new(),
            draft: String::new(),
            loading: false,
            error: None,
        };
        let (updates, _) = watch::channel(initial.clone());
        Self {
            generator,
            placeholder: config.empty_reply_placeholder.clone(),
            suggestions: config.suggestions.clone(),
            shared: Arc::new(Shared {
                generation: Generation::new(),
                state: Mutex::new(initial),
                updates,
            }),
        }
    }

    /// Reset the transcript to a single model greeting and seed the composer.
    ///
    /// Any pending turn becomes stale and its reply is dropped.
    pub fn start(&self, greeting: &str, seed_input: &str) {
        let mut state = self.shared.lock();
        let token = self.shared.generation.advance();
        state.transcript = vec![Message::model(greeting)];
        state.draft = seed_input.to_string();
        state.loading = false;
        state.error = None;
        tracing::info!(session_id = %state.session_id, generation = %token, "Session started");
        self.shared.publish(&state);
    }

    /// Send `text` as the next user turn.
    ///
    /// Ignored when `text` is blank or a turn is pending. Fails with
    /// `MissingCredential` (without touching the transcript) when no
    /// credential is given. Otherwise appends the user message, marks the
    /// session loading, and issues one request carrying the entire
    /// transcript. Must be called from within a Tokio runtime.
    pub fn send(
        &self,
        text: &str,
        credential: Option<&str>,
        model: &str,
    ) -> Result<SendOutcome, ChatError> {
        let content = text.trim();
        let mut state = self.shared.lock();

        if content.is_empty() {
            return Ok(SendOutcome::Ignored(IgnoreReason::EmptyText));
        }
        if state.loading {
            tracing::debug!(session_id = %state.session_id, "Send ignored: turn pending");
            return Ok(SendOutcome::Ignored(IgnoreReason::Busy));
        }

        let Some(credential) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            state.error = Some(ChatError::MissingCredential);
            self.shared.publish(&state);
            return Err(ChatError::MissingCredential);
        };

        state.error = None;
        state.loading = true;
        state.draft.clear();
        state.model = model.to_string();
        state.transcript.push(Message::user(content));
        let contents = state.transcript.clone();
        let token = self.shared.generation.advance();
        tracing::info!(
            session_id = %state.session_id,
            generation = %token,
            model = %model,
            turns = contents.len(),
            "Sending turn"
        );
        self.shared.publish(&state);
        drop(state);

        let shared = Arc::clone(&self.shared);
        let generator = Arc::clone(&self.generator);
        let placeholder = self.placeholder.clone();
        let credential = credential.to_string();
        let model = model.to_string();
        let handle = tokio::spawn(async move {
            let result = generator.generate(&model, &credential, &contents).await;
            shared.complete(token, result, &placeholder)
        });

        Ok(SendOutcome::Accepted(PendingTurn { token, handle }))
    }

    /// Send whatever is in the composer.
    pub fn send_draft(
        &self,
        credential: Option<&str>,
        model: &str,
    ) -> Result<SendOutcome, ChatError> {
        let draft = self.shared.lock().draft.clone();
        self.send(&draft, credential, model)
    }

    /// Replace the composer contents.
    pub fn set_draft(&self, text: &str) {
        let mut state = self.shared.lock();
        state.draft = text.to_string();
        self.shared.publish(&state);
    }

    /// Change the default model name.
    pub fn set_model(&self, model: &str) {
        let mut state = self.shared.lock();
        state.model = model.to_string();
        self.shared.publish(&state);
    }

    pub fn model(&self) -> String {
        self.shared.lock().model.clone()
    }

    /// Quick prompts configured for this session.
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().clone()
    }

    /// Receive a new snapshot after every committed change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }
}
