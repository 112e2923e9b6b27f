//! Side channel between the dispatch loop and the durable store.
//!
//! The engine only queues [`PersistOp`]s; a writer task applies them and logs
//! failures. Nothing a store does can reach the dispatch path.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use turn_model::{ToolResultRecord, Turn};
use turn_store::TurnStore;

#[derive(Debug)]
pub enum PersistOp {
    Turn {
        session_id: String,
        turn: Turn,
    },
    ToolResult {
        session_id: String,
        record: ToolResultRecord,
    },
    SetActiveSession(Option<String>),
    /// Acknowledged once every earlier op has been applied.
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
enum Unkeyed {
    Turn(Turn),
    ToolResult(ToolResultRecord),
}

/// Queue of store writes, holding back records frozen before a session id existed.
#[derive(Debug, Default)]
pub struct Outbox {
    ready: VecDeque<PersistOp>,
    unkeyed: Vec<Unkeyed>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist_turn(&mut self, session_id: Option<&str>, turn: Turn) {
        match session_id {
            Some(session_id) => self.ready.push_back(PersistOp::Turn {
                session_id: session_id.to_owned(),
                turn,
            }),
            None => {
                debug!(turn_id = %turn.id, "holding turn until a session id is known");
                self.unkeyed.push(Unkeyed::Turn(turn));
            }
        }
    }

    pub fn persist_tool_result(&mut self, session_id: Option<&str>, record: ToolResultRecord) {
        match session_id {
            Some(session_id) => self.ready.push_back(PersistOp::ToolResult {
                session_id: session_id.to_owned(),
                record,
            }),
            None => self.unkeyed.push(Unkeyed::ToolResult(record)),
        }
    }

    pub fn set_active_session(&mut self, session_id: Option<&str>) {
        self.ready
            .push_back(PersistOp::SetActiveSession(session_id.map(ToOwned::to_owned)));
    }

    /// Keys every held record with the newly observed session id, in freeze order.
    pub fn release_unkeyed(&mut self, session_id: &str) {
        for held in self.unkeyed.drain(..) {
            let op = match held {
                Unkeyed::Turn(turn) => PersistOp::Turn {
                    session_id: session_id.to_owned(),
                    turn,
                },
                Unkeyed::ToolResult(record) => PersistOp::ToolResult {
                    session_id: session_id.to_owned(),
                    record,
                },
            };
            self.ready.push_back(op);
        }
    }

    pub fn drop_unkeyed(&mut self) -> usize {
        let dropped = self.unkeyed.len();
        self.unkeyed.clear();
        dropped
    }

    #[must_use]
    pub fn unkeyed_len(&self) -> usize {
        self.unkeyed.len()
    }

    pub fn drain(&mut self) -> Vec<PersistOp> {
        self.ready.drain(..).collect()
    }
}

/// Applies one op, logging and swallowing store failures.
pub fn apply_persist_op(store: &dyn TurnStore, op: PersistOp) {
    let outcome = match op {
        PersistOp::Turn { session_id, turn } => store
            .put(&session_id, &turn)
            .map_err(|error| (session_id, error)),
        PersistOp::ToolResult { session_id, record } => store
            .put_tool_result(&session_id, &record)
            .map_err(|error| (session_id, error)),
        PersistOp::SetActiveSession(session_id) => store
            .set_active_session(session_id.as_deref())
            .map_err(|error| (session_id.unwrap_or_default(), error)),
        PersistOp::Flush(ack) => {
            let _ = ack.send(());
            Ok(())
        }
    };

    if let Err((session_id, error)) = outcome {
        warn!(session_id = %session_id, %error, "failed to persist session record");
    }
}

/// Spawns the blocking writer that drains persistence ops in order.
pub fn spawn_writer(store: Arc<dyn TurnStore>) -> (mpsc::UnboundedSender<PersistOp>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<PersistOp>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(op) = receiver.blocking_recv() {
            apply_persist_op(store.as_ref(), op);
        }
        debug!("persistence writer stopped");
    });
    (sender, handle)
}

#[cfg(test)]
mod tests {
    use turn_model::Turn;
    use turn_store::{MemoryTurnStore, TurnStore};

    use super::{apply_persist_op, Outbox, PersistOp};

    const TS: &str = "2026-02-14T00:00:00Z";

    #[test]
    fn unkeyed_turns_release_in_freeze_order() {
        let mut outbox = Outbox::new();
        outbox.persist_turn(None, Turn::user("u1", "a", TS));
        outbox.persist_turn(None, Turn::user("u2", "b", TS));
        assert!(outbox.drain().is_empty());
        assert_eq!(outbox.unkeyed_len(), 2);

        outbox.release_unkeyed("sess-1");
        let ids: Vec<String> = outbox
            .drain()
            .into_iter()
            .filter_map(|op| match op {
                PersistOp::Turn { session_id, turn } => {
                    assert_eq!(session_id, "sess-1");
                    Some(turn.id)
                }
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn store_failures_are_swallowed() {
        let store = MemoryTurnStore::new();
        apply_persist_op(
            &store,
            PersistOp::Turn {
                session_id: String::new(),
                turn: Turn::user("u1", "a", TS),
            },
        );
        assert!(store.session_ids().is_empty());

        apply_persist_op(&store, PersistOp::SetActiveSession(Some("sess-1".to_string())));
        assert_eq!(
            store.active_session().expect("memory store never fails"),
            Some("sess-1".to_string())
        );
    }
}
