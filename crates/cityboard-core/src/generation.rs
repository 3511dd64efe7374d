//! Generation counter used to tell the current orchestration run apart from
//! superseded ones.
//!
//! Every run (a chat turn, a dashboard build) takes a token when it starts.
//! Before a completion is allowed to write shared state it compares its token
//! with the counter; a mismatch means a newer run owns the slot and the
//! completion is dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationToken(u64);

impl GenerationToken {
    /// Raw counter value, mostly useful for logging.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically increasing run counter for one logical slot.
#[derive(Debug, Default)]
pub struct Generation {
    current: AtomicU64,
}

impl Generation {
    /// Create a counter at generation zero. No run holds token zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run, invalidating every previously issued token.
    pub fn advance(&self) -> GenerationToken {
        GenerationToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The token of the newest run.
    pub fn current(&self) -> GenerationToken {
        GenerationToken(self.current.load(Ordering::SeqCst))
    }

    /// Whether `token` still identifies the newest run.
    pub fn is_current(&self, token: GenerationToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.0
    }
}
