//! Engine state and the run lifecycle: submit, transport end, reset and restore.
//!
//! The engine is synchronous and owns all turn and session state. Frame routing
//! lives in `dispatch`, cancellation in `interrupt`. Every operation returns the
//! [`EngineEvent`]s the sink should see; store writes are queued on the outbox.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use stream_protocol::QueryRequest;
use tracing::{debug, info, warn};
use turn_model::{RunId, Turn, TurnCompletion, TurnSource};

use crate::cost::CostAccumulator;
use crate::error::EngineError;
use crate::events::{EngineEvent, RunOutcome};
use crate::outbox::{Outbox, PersistOp};
use crate::session::{Observation, SessionManager, SessionSettings};
use crate::turn_builder::{new_turn_id, timestamp_now, TurnBuilder};

#[derive(Debug)]
pub(crate) struct ActiveRun {
    pub(crate) run_id: RunId,
    /// Sources that produced `stream_event` frames during this run.
    pub(crate) streamed_sources: HashSet<TurnSource>,
}

/// A started run: the request to send and the events its submission produced.
#[derive(Debug, Clone)]
pub struct Submission {
    pub run_id: RunId,
    pub request: QueryRequest,
    pub events: Vec<EngineEvent>,
}

/// How a run's transport stopped delivering bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEnd {
    Closed,
    Failed(String),
}

#[derive(Debug)]
pub struct Engine {
    pub(crate) session: SessionManager,
    pub(crate) cost: CostAccumulator,
    pub(crate) builders: BTreeMap<TurnSource, TurnBuilder>,
    pub(crate) active_run: Option<ActiveRun>,
    /// Runs closed by an interrupt whose transport has not ended yet.
    pub(crate) interrupted_runs: BTreeSet<RunId>,
    pub(crate) frozen_calls: HashSet<String>,
    pub(crate) outbox: Outbox,
    next_run_id: RunId,
}

impl Engine {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            session: SessionManager::new(settings),
            cost: CostAccumulator::default(),
            builders: BTreeMap::new(),
            active_run: None,
            interrupted_runs: BTreeSet::new(),
            frozen_calls: HashSet::new(),
            outbox: Outbox::new(),
            next_run_id: 1,
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    #[must_use]
    pub fn cost(&self) -> &CostAccumulator {
        &self.cost
    }

    #[must_use]
    pub fn active_run_id(&self) -> Option<RunId> {
        self.active_run.as_ref().map(|run| run.run_id)
    }

    #[must_use]
    pub fn is_run_active(&self) -> bool {
        self.active_run.is_some()
    }

    /// The turn currently streaming for `source`, if any.
    #[must_use]
    pub fn open_turn(&self, source: &TurnSource) -> Option<&Turn> {
        self.builders.get(source).and_then(TurnBuilder::open_turn)
    }

    /// Store writes queued since the last drain, in order.
    pub fn drain_persistence(&mut self) -> Vec<PersistOp> {
        self.outbox.drain()
    }

    /// Starts a run for `prompt`. Rejected, not queued, while another run is open.
    pub fn submit(&mut self, prompt: &str) -> Result<Submission, EngineError> {
        if let Some(active) = &self.active_run {
            return Err(EngineError::RunAlreadyActive {
                run_id: active.run_id,
            });
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EngineError::EmptyPrompt);
        }

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        self.active_run = Some(ActiveRun {
            run_id,
            streamed_sources: HashSet::new(),
        });

        let request = self.session.build_request(prompt);
        let user_turn = Turn::user(new_turn_id(), prompt, timestamp_now());
        let events = vec![EngineEvent::TurnFrozen {
            turn: user_turn.clone(),
        }];
        self.record_frozen(user_turn);

        info!(run_id, resume = ?request.resume, "run submitted");
        Ok(Submission {
            run_id,
            request,
            events,
        })
    }

    /// Handles the end of a run's byte stream.
    ///
    /// For the active run every open turn is frozen as partial and the run ends
    /// without a result. For an interrupted run this only stops late-frame handling.
    pub fn finish_transport(&mut self, run_id: RunId, end: TransportEnd) -> Vec<EngineEvent> {
        let mut out = Vec::new();

        if self.active_run_id() != Some(run_id) {
            if self.interrupted_runs.remove(&run_id) {
                debug!(run_id, ?end, "interrupted run finished draining");
            } else {
                debug!(run_id, ?end, "transport ended for an inactive run");
            }
            return out;
        }

        let (reason, outcome, notice) = match end {
            TransportEnd::Closed => (
                "stream closed before message_stop".to_string(),
                RunOutcome::StreamClosed,
                "stream ended before a result".to_string(),
            ),
            TransportEnd::Failed(message) => (
                format!("stream failed: {message}"),
                RunOutcome::StreamFailed {
                    message: message.clone(),
                },
                message,
            ),
        };
        warn!(run_id, %notice, "run ended without a result");

        self.freeze_open_turns(TurnCompletion::Partial { reason }, &mut out);
        out.push(EngineEvent::TransportNotice { message: notice });
        self.end_active_run(outcome, &mut out);
        out
    }

    /// Explicit "new session": clears the session id, spend and held records.
    pub fn reset(&mut self) -> Result<Vec<EngineEvent>, EngineError> {
        if let Some(active) = &self.active_run {
            return Err(EngineError::RunAlreadyActive {
                run_id: active.run_id,
            });
        }

        self.session.reset();
        self.cost.reset();
        self.builders.clear();
        self.frozen_calls.clear();
        self.interrupted_runs.clear();
        let dropped = self.outbox.drop_unkeyed();
        if dropped > 0 {
            debug!(dropped, "dropped records that never received a session id");
        }
        self.outbox.set_active_session(None);

        info!("session reset");
        Ok(vec![EngineEvent::SessionReset])
    }

    /// Adopts a stored session and hands its replayed turns to the sink.
    ///
    /// Only valid before any session or run exists; nothing is re-persisted.
    pub fn restore(&mut self, session_id: &str, turns: Vec<Turn>) -> Vec<EngineEvent> {
        if self.session.session_id().is_some() || self.active_run.is_some() {
            warn!(session_id, "restore skipped; engine already has a session or run");
            return Vec::new();
        }

        let mut out = Vec::new();
        if self.session.observe(session_id) == Observation::Adopted {
            out.push(EngineEvent::SessionStarted {
                session_id: session_id.to_owned(),
            });
        }

        info!(session_id, turns = turns.len(), "restoring session from store");
        for mut turn in turns {
            turn.from_replay = true;
            self.frozen_calls
                .extend(turn.tool_calls.iter().map(|call| call.id.clone()));
            out.push(EngineEvent::TurnFrozen { turn });
        }
        out
    }

    /// Writes a newly observed session id and releases held records.
    pub(crate) fn observe_session_id(&mut self, session_id: &str, out: &mut Vec<EngineEvent>) {
        if self.session.observe(session_id) != Observation::Adopted {
            return;
        }

        self.outbox.set_active_session(Some(session_id));
        self.outbox.release_unkeyed(session_id);
        out.push(EngineEvent::SessionStarted {
            session_id: session_id.to_owned(),
        });
    }

    pub(crate) fn freeze_open_turns(&mut self, completion: TurnCompletion, out: &mut Vec<EngineEvent>) {
        let mut frozen = Vec::new();
        for builder in self.builders.values_mut() {
            if let Some(turn) = builder.freeze(completion.clone(), out) {
                frozen.push(turn);
            }
        }
        for turn in frozen {
            self.record_frozen(turn);
        }
    }

    pub(crate) fn record_frozen(&mut self, turn: Turn) {
        self.frozen_calls
            .extend(turn.tool_calls.iter().map(|call| call.id.clone()));
        self.outbox.persist_turn(self.session.session_id(), turn);
    }

    pub(crate) fn end_active_run(&mut self, outcome: RunOutcome, out: &mut Vec<EngineEvent>) {
        let Some(active) = self.active_run.take() else {
            return;
        };
        self.builders.clear();
        debug!(run_id = active.run_id, ?outcome, "run ended");
        out.push(EngineEvent::RunEnded {
            run_id: active.run_id,
            outcome,
        });
    }
}
