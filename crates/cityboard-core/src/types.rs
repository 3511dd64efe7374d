use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Conversation
// =============================================================================

/// Author of a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed by the person using the session.
    User,
    /// Produced by the generation service (or the session greeting).
    Model,
}

impl Role {
    /// Wire name used by the generation endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversational turn. Immutable once appended to a transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// Smallest component limit a query may carry.
pub const MIN_COMPONENT_LIMIT: u32 = 1;

/// Largest component limit a query may carry.
pub const MAX_COMPONENT_LIMIT: u32 = 12;

/// The `(city, index, limit)` tuple identifying one dashboard build.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub city: String,
    pub index: String,
    pub limit: u32,
}

impl DashboardQuery {
    /// Build a query, clamping `limit` into `[MIN_COMPONENT_LIMIT, MAX_COMPONENT_LIMIT]`.
    pub fn new(city: impl Into<String>, index: impl Into<String>, limit: u32) -> Self {
        Self {
            city: city.into(),
            index: index.into(),
            limit: limit.clamp(MIN_COMPONENT_LIMIT, MAX_COMPONENT_LIMIT),
        }
    }

    /// Number of components kept after resolution.
    pub fn effective_limit(&self) -> usize {
        self.limit.max(1) as usize
    }
}

impl fmt::Display for DashboardQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (limit {})", self.city, self.index, self.limit)
    }
}

/// Opaque identifier of one dashboard component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentRef {
    pub id: u64,
}

impl ComponentRef {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

// =============================================================================
// Request lifecycle
// =============================================================================

/// Lifecycle of one asynchronous request.
///
/// Created `Idle`, moves to `Loading` when the request starts, and ends in
/// `Success` or `Failed`. A superseded request never transitions; its result
/// is simply not observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FetchState<T, E> {
    Idle,
    Loading,
    Success(T),
    Failed(E),
}

impl<T, E> Default for FetchState<T, E> {
    fn default() -> Self {
        FetchState::Idle
    }
}

impl<T, E> FetchState<T, E> {
    pub fn is_idle(&self) -> bool {
        matches!(self, FetchState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    /// Whether the request reached `Success` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchState::Success(_) | FetchState::Failed(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            FetchState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Build a terminal state from a request result.
    pub fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => FetchState::Success(data),
            Err(err) => FetchState::Failed(err),
        }
    }
}
