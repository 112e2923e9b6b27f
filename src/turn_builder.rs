//! Accumulates one source's streamed content into its currently open turn.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};
use turn_model::{ToolCall, ToolOutput, Turn, TurnCompletion, TurnSource};
use uuid::Uuid;

use crate::assembler::ToolCallAssembler;
use crate::events::EngineEvent;

const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

pub(crate) fn new_turn_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn timestamp_now() -> String {
    match OffsetDateTime::now_utc().format(&Rfc3339) {
        Ok(timestamp) => timestamp,
        Err(error) => {
            warn!(%error, "failed to format current time");
            EPOCH_RFC3339.to_string()
        }
    }
}

/// Message-level facts that arrive before any visible content.
#[derive(Debug, Default)]
struct MessageMeta {
    model: Option<String>,
    message_id: Option<String>,
    stop_reason: Option<String>,
}

/// Open-turn state for one [`TurnSource`].
///
/// The turn opens lazily on the first text, thinking or tool-use content, so
/// a `message_start` that precedes content by a long gap never produces an
/// empty turn.
#[derive(Debug)]
pub struct TurnBuilder {
    source: TurnSource,
    turn: Option<Turn>,
    assembler: ToolCallAssembler,
    meta: MessageMeta,
}

impl TurnBuilder {
    #[must_use]
    pub fn new(source: TurnSource) -> Self {
        Self {
            source,
            turn: None,
            assembler: ToolCallAssembler::new(),
            meta: MessageMeta::default(),
        }
    }

    #[must_use]
    pub fn open_turn(&self) -> Option<&Turn> {
        self.turn.as_ref()
    }

    pub fn note_message_start(&mut self, model: Option<String>, message_id: Option<String>) {
        if self.turn.is_some() {
            debug!(source = %self.source, "message_start while a turn is open");
        }
        self.meta.model = model;
        self.meta.message_id = message_id;
    }

    pub fn note_stop_reason(&mut self, stop_reason: Option<String>) {
        if stop_reason.is_some() {
            self.meta.stop_reason = stop_reason;
        }
    }

    pub fn append_text(&mut self, text: &str, out: &mut Vec<EngineEvent>) {
        if text.is_empty() {
            return;
        }
        let turn = self.ensure_open(out);
        turn.text.push_str(text);
        let event = EngineEvent::TextDelta {
            turn_id: turn.id.clone(),
            source: turn.source.clone(),
            text: text.to_owned(),
        };
        out.push(event);
    }

    pub fn append_thinking(&mut self, text: &str, out: &mut Vec<EngineEvent>) {
        if text.is_empty() {
            return;
        }
        let turn = self.ensure_open(out);
        turn.thinking.push_str(text);
        let event = EngineEvent::ThinkingDelta {
            turn_id: turn.id.clone(),
            source: turn.source.clone(),
            text: text.to_owned(),
        };
        out.push(event);
    }

    pub fn start_tool(
        &mut self,
        block_index: usize,
        tool_id: &str,
        tool_name: &str,
        out: &mut Vec<EngineEvent>,
    ) {
        self.ensure_open(out);
        let (call, replaced) = self.assembler.start(block_index, tool_id, tool_name);
        if let Some(replaced) = replaced {
            self.update_call(replaced, out);
        }
        self.update_call(call, out);
    }

    pub fn push_tool_input(
        &mut self,
        block_index: usize,
        fragment: &str,
        out: &mut Vec<EngineEvent>,
    ) {
        if let Some(call) = self.assembler.push(block_index, fragment) {
            self.update_call(call, out);
        }
    }

    pub fn stop_block(&mut self, block_index: usize, out: &mut Vec<EngineEvent>) {
        if let Some(call) = self.assembler.stop(block_index) {
            self.update_call(call, out);
        }
    }

    /// Applies a tool result to a call in the open turn. Returns false when no such call exists.
    pub fn apply_tool_output(
        &mut self,
        tool_use_id: &str,
        output: ToolOutput,
        out: &mut Vec<EngineEvent>,
    ) -> bool {
        let Some(turn) = self.turn.as_mut() else {
            return false;
        };
        let Some(call) = turn.tool_call_mut(tool_use_id) else {
            return false;
        };
        call.apply_output(output);
        let call = call.clone();
        let event = EngineEvent::ToolCallUpdated {
            turn_id: turn.id.clone(),
            source: turn.source.clone(),
            call,
        };
        out.push(event);
        true
    }

    /// Closes the open turn, retiring any tool blocks that never stopped.
    ///
    /// Returns `None` when no content ever arrived for the current message.
    pub fn freeze(&mut self, completion: TurnCompletion, out: &mut Vec<EngineEvent>) -> Option<Turn> {
        for call in self.assembler.retire_all() {
            self.update_call(call, out);
        }

        let meta = std::mem::take(&mut self.meta);
        let mut turn = self.turn.take()?;
        turn.completion = completion;
        turn.stop_reason = meta.stop_reason;
        debug!(
            turn_id = %turn.id,
            source = %turn.source,
            message_id = ?meta.message_id,
            model = ?meta.model,
            completion = ?turn.completion,
            "turn frozen"
        );
        out.push(EngineEvent::TurnFrozen { turn: turn.clone() });
        Some(turn)
    }

    fn ensure_open(&mut self, out: &mut Vec<EngineEvent>) -> &mut Turn {
        let source = &self.source;
        self.turn.get_or_insert_with(|| {
            let turn = Turn::assistant(new_turn_id(), source.clone(), timestamp_now());
            out.push(EngineEvent::TurnOpened {
                turn_id: turn.id.clone(),
                source: turn.source.clone(),
            });
            turn
        })
    }

    /// Folds an assembler snapshot into the open turn.
    ///
    /// A result that arrived before the block stopped keeps its terminal status.
    fn update_call(&mut self, snapshot: ToolCall, out: &mut Vec<EngineEvent>) {
        let turn = self.ensure_open(out);
        let call = match turn.tool_call_mut(&snapshot.id) {
            Some(existing) if existing.result.is_some() => {
                existing.input = snapshot.input;
                existing.diagnostic = snapshot.diagnostic;
                existing.clone()
            }
            Some(existing) => {
                *existing = snapshot.clone();
                snapshot
            }
            None => {
                turn.tool_calls.push(snapshot.clone());
                snapshot
            }
        };
        out.push(EngineEvent::ToolCallUpdated {
            turn_id: turn.id.clone(),
            source: turn.source.clone(),
            call,
        });
    }
}
