use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use turn_model::{ToolResultRecord, Turn};

use crate::error::TurnStoreError;
use crate::schema::SessionLog;
use crate::store::TurnStore;

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<String, SessionLog>,
    active: Option<String>,
}

/// Process-local store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryTurnStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTurnStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TurnStore for MemoryTurnStore {
    fn put(&self, session_id: &str, turn: &Turn) -> Result<(), TurnStoreError> {
        if session_id.is_empty() {
            return Err(TurnStoreError::EmptySessionId);
        }
        self.lock()
            .sessions
            .entry(session_id.to_owned())
            .or_default()
            .turns
            .push(turn.clone());
        Ok(())
    }

    fn put_tool_result(
        &self,
        session_id: &str,
        record: &ToolResultRecord,
    ) -> Result<(), TurnStoreError> {
        if session_id.is_empty() {
            return Err(TurnStoreError::EmptySessionId);
        }
        self.lock()
            .sessions
            .entry(session_id.to_owned())
            .or_default()
            .tool_results
            .push(record.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<SessionLog, TurnStoreError> {
        Ok(self
            .lock()
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn clear(&self, session_id: &str) -> Result<(), TurnStoreError> {
        self.lock().sessions.remove(session_id);
        Ok(())
    }

    fn active_session(&self) -> Result<Option<String>, TurnStoreError> {
        Ok(self.lock().active.clone())
    }

    fn set_active_session(&self, session_id: Option<&str>) -> Result<(), TurnStoreError> {
        self.lock().active = session_id.map(ToOwned::to_owned);
        Ok(())
    }
}
