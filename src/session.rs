//! Session identity and the outbound request settings.

use stream_protocol::QueryRequest;
use tracing::{info, warn};

/// Request settings read at construction time, never mid-stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub model: String,
    pub max_turns: u32,
    pub max_budget_usd: f64,
    pub enable_thinking: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: "sonnet".to_string(),
            max_turns: 25,
            max_budget_usd: 1.0,
            enable_thinking: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active(String),
}

/// Result of offering an upstream session id to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First id seen; the session is now active.
    Adopted,
    /// Same id as the active session.
    Unchanged,
    /// A different id while a session is active; the active id is kept.
    Ignored,
}

/// Owns the write-once session id. Only this type sets `resume` on a request.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: SessionState,
    settings: SessionSettings,
}

impl SessionManager {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            state: SessionState::NoSession,
            settings,
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active(session_id) => Some(session_id),
            SessionState::NoSession => None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn observe(&mut self, session_id: &str) -> Observation {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Observation::Unchanged;
        }

        match &self.state {
            SessionState::NoSession => {
                info!(session_id, "session established");
                self.state = SessionState::Active(session_id.to_owned());
                Observation::Adopted
            }
            SessionState::Active(current) if current == session_id => Observation::Unchanged,
            SessionState::Active(current) => {
                warn!(
                    active = %current,
                    received = session_id,
                    "ignoring different session id for the active session"
                );
                Observation::Ignored
            }
        }
    }

    /// Clears the session; the next observed id starts a new one.
    pub fn reset(&mut self) {
        self.state = SessionState::NoSession;
    }

    #[must_use]
    pub fn build_request(&self, prompt: &str) -> QueryRequest {
        let request = QueryRequest::new(prompt, &self.settings.model)
            .with_limits(self.settings.max_turns, self.settings.max_budget_usd)
            .with_thinking(self.settings.enable_thinking);
        match self.session_id() {
            Some(session_id) => request.with_resume(session_id),
            None => request,
        }
    }
}
