use stream_protocol::{Frame, SystemFrame};
use tracing::{debug, info};
use turn_model::{RunId, TurnCompletion};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{EngineEvent, RunOutcome};

impl Engine {
    /// Locally closes the active run as interrupted.
    ///
    /// Open turns freeze as `Interrupted` and input is available again at once;
    /// the caller signals the upstream separately. The interrupted run's reader
    /// keeps draining, and its late frames never reopen or mutate those turns.
    pub fn request_interrupt(&mut self) -> Result<(RunId, Vec<EngineEvent>), EngineError> {
        let run_id = self.active_run_id().ok_or(EngineError::NoActiveRun)?;
        let mut out = Vec::new();

        self.freeze_open_turns(TurnCompletion::Interrupted, &mut out);
        self.interrupted_runs.insert(run_id);
        self.end_active_run(RunOutcome::Interrupted, &mut out);

        info!(run_id, "run interrupted");
        Ok((run_id, out))
    }

    /// Handles a frame from a run that is no longer active.
    pub(crate) fn apply_stale(&mut self, run_id: RunId, frame: Frame, out: &mut Vec<EngineEvent>) {
        if !self.interrupted_runs.contains(&run_id) {
            debug!(run_id, kind = frame.kind(), "discarding frame from an inactive run");
            return;
        }

        match frame {
            Frame::Result(result) => {
                if let Some(session_id) = result.session_id.as_deref() {
                    self.observe_session_id(session_id, out);
                }
                let cost = self.record_cost(result.total_cost_usd, out);
                debug!(run_id, cost, "late result after interrupt; turns left untouched");
            }
            Frame::System(SystemFrame::Init {
                session_id: Some(session_id),
                ..
            }) => self.observe_session_id(&session_id, out),
            other => debug!(run_id, kind = other.kind(), "discarding frame from interrupted run"),
        }
    }
}
