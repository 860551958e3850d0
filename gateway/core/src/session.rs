//! Session Management
//!
//! A [`ChatSession`] is the explicit conversation state a surface owns: the
//! session identifier sent to the agent, the turns exchanged so far and the
//! trace of the most recent decode.
//!
//! # Lifecycle
//!
//! ```text
//! ChatSession::new() ──► record_turn() ... record_turn() ──► end()
//!      Active                    Active                      Ended
//! ```
//!
//! Only successful exchanges are recorded. Ending a session drops its history;
//! the identifier stays readable so the surface can tell the agent to close
//! its side too.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier correlating turns with remote agent state
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One question and its answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// The user's question
    pub question: String,
    /// The answer as shown to the user
    pub answer: String,
    /// When the turn was recorded (Unix timestamp ms)
    pub timestamp: u64,
}

/// Session state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Session accepts new turns
    Active,
    /// Session has ended
    Ended,
}

/// Errors from session bookkeeping
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session was already ended
    #[error("session {0} has ended")]
    Ended(SessionId),
}

/// A conversation owned by one surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSession {
    id: SessionId,
    state: SessionState,
    history: Vec<ChatTurn>,
    last_trace: String,
    created_at: u64,
    last_active: u64,
}

impl ChatSession {
    /// Start a session with a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    /// Start a session with a caller-supplied identifier
    #[must_use]
    pub fn with_id(id: SessionId) -> Self {
        let now = now_ms();
        Self {
            id,
            state: SessionState::Active,
            history: Vec::new(),
            last_trace: String::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still accepts turns
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// When the session started (Unix timestamp ms)
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// When the session was last used (Unix timestamp ms)
    #[must_use]
    pub fn last_active_at(&self) -> u64 {
        self.last_active
    }

    /// Mark the session as used now
    pub fn touch(&mut self) {
        self.last_active = now_ms();
    }

    /// Whether the session has gone unused for at least `idle` as of `now_ms`
    #[must_use]
    pub fn is_idle(&self, now_ms: u64, idle: Duration) -> bool {
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        now_ms.saturating_sub(self.last_active) >= idle_ms
    }

    /// Record a successful exchange and the trace that produced it
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Ended`] if the session has ended.
    pub fn record_turn(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
        trace: impl Into<String>,
    ) -> Result<&ChatTurn, SessionError> {
        if !self.is_active() {
            return Err(SessionError::Ended(self.id.clone()));
        }

        let now = now_ms();
        self.last_trace = trace.into();
        self.last_active = now;
        self.history.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
            timestamp: now,
        });

        tracing::debug!(session_id = %self.id, turns = self.history.len(), "Recorded chat turn");
        Ok(&self.history[self.history.len() - 1])
    }

    /// Turns in the order they happened
    #[must_use]
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Turns newest first, the order chat surfaces display them in
    pub fn newest_first(&self) -> impl Iterator<Item = &ChatTurn> {
        self.history.iter().rev()
    }

    /// Trace of the most recent successful exchange
    #[must_use]
    pub fn last_trace(&self) -> &str {
        &self.last_trace
    }

    /// End the session and drop its history
    pub fn end(&mut self) {
        self.state = SessionState::Ended;
        self.history.clear();
        self.last_trace.clear();
        tracing::debug!(session_id = %self.id, "Session ended");
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time in milliseconds since Unix epoch
#[must_use]
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
