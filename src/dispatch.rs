//! Frame classification and routing.
//!
//! Dispatch is total: every [`Frame`] and [`StreamEvent`] variant has an arm,
//! and values the wire sent that this client does not know are logged no-ops.
//! No handler returns an error; failure is routed into turn and call data.

use stream_protocol::{
    AssistantFrame, BlockDelta, BlockStart, Frame, ResultFrame, StreamEvent, StreamEventFrame,
    SystemFrame, ToolResultFrame,
};
use tracing::{debug, warn};
use turn_model::{
    RunId, ToolCall, ToolOutput, ToolResultRecord, Turn, TurnCompletion, TurnSource,
};

use crate::engine::Engine;
use crate::events::{EngineEvent, RunOutcome, RunSummary};
use crate::turn_builder::{new_turn_id, timestamp_now, TurnBuilder};

impl Engine {
    /// Applies one decoded frame from the reader of `run_id`.
    ///
    /// Frames from any run other than the active one are stale: they are
    /// discarded, except that an interrupted run's session id and cost still count.
    pub fn apply(&mut self, run_id: RunId, frame: Frame) -> Vec<EngineEvent> {
        let mut out = Vec::new();

        if self.active_run_id() != Some(run_id) {
            self.apply_stale(run_id, frame, &mut out);
            return out;
        }

        match frame {
            Frame::StreamEvent(frame) => self.on_stream_event(frame, &mut out),
            Frame::Assistant(frame) => self.on_assistant(frame, &mut out),
            Frame::ToolResult(frame) => self.on_tool_result(frame, &mut out),
            Frame::Result(frame) => self.on_result(frame, &mut out),
            Frame::System(frame) => self.on_system(frame, &mut out),
            Frame::Error { content } => {
                warn!(run_id, error = %content, "upstream reported an error");
                out.push(EngineEvent::UpstreamError { message: content });
            }
            Frame::User { .. } => debug!(run_id, "ignoring echoed user message"),
            Frame::Done => debug!(run_id, "end-of-stream sentinel"),
            Frame::Unknown { kind } => debug!(run_id, kind = %kind, "ignoring unknown frame type"),
        }

        out
    }

    fn on_stream_event(&mut self, frame: StreamEventFrame, out: &mut Vec<EngineEvent>) {
        if let Some(session_id) = frame.session_id.as_deref() {
            self.observe_session_id(session_id, out);
        }

        let source = TurnSource::from_parent_tool_use_id(frame.parent_tool_use_id.as_deref());
        if let Some(active) = self.active_run.as_mut() {
            active.streamed_sources.insert(source.clone());
        }

        let builder = self
            .builders
            .entry(source.clone())
            .or_insert_with(|| TurnBuilder::new(source));

        let frozen = match frame.event {
            StreamEvent::MessageStart { model, message_id } => {
                builder.note_message_start(model, message_id);
                None
            }
            StreamEvent::ContentBlockStart { block_index, block } => {
                match block {
                    // Text and thinking turns open on their first delta.
                    BlockStart::Text | BlockStart::Thinking => {}
                    BlockStart::ToolUse { tool_id, tool_name } => {
                        builder.start_tool(block_index, &tool_id, &tool_name, out);
                    }
                    BlockStart::Other { block_type } => {
                        debug!(block_index, block_type = %block_type, "ignoring unknown block type");
                    }
                }
                None
            }
            StreamEvent::ContentBlockDelta { block_index, delta } => {
                match delta {
                    BlockDelta::Text(text) => builder.append_text(&text, out),
                    BlockDelta::Thinking(text) => builder.append_thinking(&text, out),
                    BlockDelta::InputJson(fragment) => {
                        builder.push_tool_input(block_index, &fragment, out);
                    }
                    BlockDelta::Other { delta_type } => {
                        debug!(block_index, delta_type = %delta_type, "ignoring unknown delta type");
                    }
                }
                None
            }
            StreamEvent::ContentBlockStop { block_index } => {
                builder.stop_block(block_index, out);
                None
            }
            StreamEvent::MessageDelta { stop_reason, .. } => {
                builder.note_stop_reason(stop_reason);
                None
            }
            StreamEvent::MessageStop => builder.freeze(TurnCompletion::Complete, out),
            StreamEvent::Unknown { event_type } => {
                debug!(event_type = %event_type, "ignoring unknown stream event");
                None
            }
        };

        if let Some(turn) = frozen {
            self.record_frozen(turn);
        }
    }

    /// A whole assistant message. Only materialized for sources that did not
    /// stream this run; otherwise it repeats content already built from deltas.
    fn on_assistant(&mut self, frame: AssistantFrame, out: &mut Vec<EngineEvent>) {
        let source = TurnSource::from_parent_tool_use_id(frame.parent_tool_use_id.as_deref());
        let streamed = self
            .active_run
            .as_ref()
            .is_some_and(|active| active.streamed_sources.contains(&source));
        if streamed {
            debug!(%source, "ignoring full assistant message already built from stream events");
            return;
        }

        if frame.content.is_empty() && frame.tool_uses.is_empty() && frame.thinking.is_empty() {
            debug!(%source, "ignoring empty assistant message");
            return;
        }

        let mut turn = Turn::assistant(new_turn_id(), source, timestamp_now());
        turn.text = frame.content;
        turn.thinking = frame.thinking.join("\n");
        for tool_use in frame.tool_uses {
            turn.upsert_tool_call(ToolCall::complete(tool_use.id, tool_use.name, tool_use.input));
        }
        turn.completion = TurnCompletion::Complete;

        out.push(EngineEvent::TurnFrozen { turn: turn.clone() });
        self.record_frozen(turn);
    }

    fn on_tool_result(&mut self, frame: ToolResultFrame, out: &mut Vec<EngineEvent>) {
        for entry in frame.results {
            let output = ToolOutput {
                content: entry.content,
                is_error: entry.is_error,
            };

            let applied = self
                .builders
                .values_mut()
                .any(|builder| builder.apply_tool_output(&entry.tool_use_id, output.clone(), out));
            if applied {
                continue;
            }

            if self.frozen_calls.contains(&entry.tool_use_id) {
                let record = ToolResultRecord {
                    tool_use_id: entry.tool_use_id.clone(),
                    content: output.content.clone(),
                    is_error: output.is_error,
                    timestamp: timestamp_now(),
                };
                self.outbox
                    .persist_tool_result(self.session.session_id(), record);
            } else {
                debug!(tool_use_id = %entry.tool_use_id, "tool result for an unknown call");
            }

            out.push(EngineEvent::ToolResult {
                tool_use_id: entry.tool_use_id,
                output,
            });
        }
    }

    fn on_result(&mut self, frame: ResultFrame, out: &mut Vec<EngineEvent>) {
        if let Some(session_id) = frame.session_id.as_deref() {
            self.observe_session_id(session_id, out);
        }

        self.freeze_open_turns(
            TurnCompletion::Partial {
                reason: "result arrived before message_stop".to_string(),
            },
            out,
        );

        let cost = self.record_cost(frame.total_cost_usd, out);
        let summary = RunSummary::from_frame(frame, cost);
        self.end_active_run(RunOutcome::Completed(summary), out);
    }

    fn on_system(&mut self, frame: SystemFrame, out: &mut Vec<EngineEvent>) {
        match frame {
            SystemFrame::Init { session_id, model } => {
                debug!(model = ?model, "upstream session initialized");
                if let Some(session_id) = session_id.as_deref() {
                    self.observe_session_id(session_id, out);
                }
            }
            SystemFrame::Retry(notice) => {
                debug!(attempt = ?notice.attempt, max_retries = ?notice.max_retries, "upstream retry");
                out.push(EngineEvent::RetryNotice(notice));
            }
            SystemFrame::Other { subtype } => debug!(subtype = %subtype, "ignoring system message"),
        }
    }

    pub(crate) fn record_cost(&mut self, total_cost_usd: Option<f64>, out: &mut Vec<EngineEvent>) -> f64 {
        let cost = self.cost.record(total_cost_usd);
        out.push(EngineEvent::CostUpdated {
            last_query_usd: cost,
            cumulative_usd: self.cost.cumulative_usd(),
        });
        cost
    }
}
