//! Incremental assembly of tool-call arguments from `input_json_delta` fragments.
//!
//! Fragments for one block are concatenated and the whole buffer is re-parsed
//! after every delta. A failed parse is the expected state while arguments are
//! still streaming; the first successful parse (and every one after it) yields
//! an updated [`ToolCall`] so the sink can show arguments as they populate.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};
use turn_model::{empty_input, ToolCall, ToolCallDiagnostic, ToolCallStatus};

#[derive(Debug)]
struct Accumulator {
    tool_id: String,
    tool_name: String,
    partial_json: String,
    input: Option<Value>,
}

impl Accumulator {
    fn snapshot(&self, block_index: usize, status: ToolCallStatus) -> ToolCall {
        let mut call = ToolCall::starting(&self.tool_id, &self.tool_name, block_index);
        call.status = status;
        if let Some(input) = &self.input {
            call.input = input.clone();
        }
        call
    }

    fn finalize(self, block_index: usize) -> ToolCall {
        if self.partial_json.trim().is_empty() {
            return self.snapshot(block_index, ToolCallStatus::Complete);
        }

        match serde_json::from_str::<Value>(&self.partial_json) {
            Ok(input) => {
                let mut call = self.snapshot(block_index, ToolCallStatus::Complete);
                call.input = input;
                call
            }
            Err(error) => {
                warn!(
                    block_index,
                    tool_id = %self.tool_id,
                    %error,
                    "tool input never formed a complete JSON document"
                );
                let mut call = self.snapshot(block_index, ToolCallStatus::Complete);
                call.input = empty_input();
                call.diagnostic = Some(ToolCallDiagnostic::IncompleteInput {
                    partial_json: self.partial_json,
                });
                call
            }
        }
    }
}

/// Per-turn map from `block_index` to the argument buffer of an open tool block.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    open: BTreeMap<usize, Accumulator>,
}

impl ToolCallAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Opens an accumulator and returns the call in its `starting` state.
    ///
    /// A block index that is already open is finalized first and returned as
    /// the second element.
    pub fn start(
        &mut self,
        block_index: usize,
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> (ToolCall, Option<ToolCall>) {
        let replaced = self.stop(block_index);
        if replaced.is_some() {
            warn!(block_index, "tool block restarted before it was stopped");
        }

        let accumulator = Accumulator {
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            partial_json: String::new(),
            input: None,
        };
        let call = accumulator.snapshot(block_index, ToolCallStatus::Starting);
        self.open.insert(block_index, accumulator);
        (call, replaced)
    }

    /// Appends a fragment and re-parses the buffer.
    ///
    /// Returns the call with its structured input whenever the buffer parses.
    pub fn push(&mut self, block_index: usize, fragment: &str) -> Option<ToolCall> {
        let Some(accumulator) = self.open.get_mut(&block_index) else {
            debug!(block_index, "input delta for a block with no open tool call");
            return None;
        };

        accumulator.partial_json.push_str(fragment);
        match serde_json::from_str::<Value>(&accumulator.partial_json) {
            Ok(input) => {
                accumulator.input = Some(input);
                Some(accumulator.snapshot(block_index, ToolCallStatus::Running))
            }
            Err(_) => None,
        }
    }

    /// Retires the accumulator for a block, whether or not its JSON completed.
    pub fn stop(&mut self, block_index: usize) -> Option<ToolCall> {
        self.open
            .remove(&block_index)
            .map(|accumulator| accumulator.finalize(block_index))
    }

    /// Retires every accumulator still open, in block order.
    pub fn retire_all(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|(block_index, accumulator)| accumulator.finalize(block_index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use turn_model::{ToolCallDiagnostic, ToolCallStatus};

    use super::ToolCallAssembler;

    #[test]
    fn arguments_become_visible_before_block_stop() {
        let mut assembler = ToolCallAssembler::new();
        let (starting, replaced) = assembler.start(1, "toolu_1", "Grep");
        assert!(replaced.is_none());
        assert_eq!(starting.status, ToolCallStatus::Starting);
        assert_eq!(starting.input, json!({}));

        assert!(assembler.push(1, r#"{"pat"#).is_none());
        let running = assembler
            .push(1, r#"tern":"foo"}"#)
            .expect("complete JSON should surface");
        assert_eq!(running.status, ToolCallStatus::Running);
        assert_eq!(running.input, json!({"pattern": "foo"}));

        let done = assembler.stop(1).expect("open block should stop");
        assert_eq!(done.status, ToolCallStatus::Complete);
        assert_eq!(done.input, json!({"pattern": "foo"}));
        assert!(!done.is_degraded());
        assert_eq!(assembler.open_count(), 0);
    }

    #[test]
    fn incomplete_arguments_degrade_on_stop() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(0, "toolu_1", "Read");
        assembler.push(0, r#"{"file_path": "/tmp/a"#);

        let degraded = assembler.stop(0).expect("open block should stop");
        assert_eq!(degraded.input, json!({}));
        assert_eq!(
            degraded.diagnostic,
            Some(ToolCallDiagnostic::IncompleteInput {
                partial_json: r#"{"file_path": "/tmp/a"#.to_string()
            })
        );
    }

    #[test]
    fn tool_without_arguments_completes_cleanly() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(2, "toolu_2", "TodoRead");
        let done = assembler.stop(2).expect("open block should stop");
        assert_eq!(done.input, json!({}));
        assert!(!done.is_degraded());
    }

    #[test]
    fn blocks_accumulate_independently() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(1, "a", "Grep");
        assembler.start(2, "b", "Glob");
        assembler.push(1, r#"{"pattern":"#);
        assembler.push(2, r#"{"glob":"*.rs"}"#);
        let first = assembler.push(1, r#""x"}"#).expect("block 1 completes");

        assert_eq!(first.id, "a");
        assert_eq!(first.input, json!({"pattern": "x"}));

        let retired = assembler.retire_all();
        assert_eq!(retired.len(), 2);
        assert_eq!(retired[1].input, json!({"glob": "*.rs"}));
    }

    #[test]
    fn delta_without_start_is_ignored() {
        let mut assembler = ToolCallAssembler::new();
        assert!(assembler.push(5, "{}").is_none());
        assert!(assembler.stop(5).is_none());
    }

    #[test]
    fn restarting_an_open_block_finalizes_the_previous_call() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(0, "old", "Grep");
        let (_, replaced) = assembler.start(0, "new", "Grep");
        assert_eq!(replaced.map(|call| call.id), Some("old".to_string()));
    }
}
