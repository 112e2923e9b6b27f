use agent_terminal::{
    apply_persist_op, Engine, EngineError, EngineEvent, PersistOp, RunOutcome, SessionSettings,
    TransportEnd,
};
use serde_json::{json, Value};
use stream_protocol::{Frame, FrameReader};
use turn_model::{
    RunId, ToolCallDiagnostic, ToolCallStatus, Turn, TurnCompletion, TurnSource,
};
use turn_store::{replay, MemoryTurnStore, TurnStore};

fn frame(value: Value) -> Frame {
    Frame::decode(&value).expect("test frame should decode")
}

fn apply_all(engine: &mut Engine, run_id: RunId, frames: Vec<Value>) -> Vec<EngineEvent> {
    frames
        .into_iter()
        .flat_map(|value| engine.apply(run_id, frame(value)))
        .collect()
}

fn text_delta(text: &str) -> Value {
    json!({
        "type": "stream_event",
        "event_type": "content_block_delta",
        "block_index": 0,
        "delta_type": "text_delta",
        "text": text,
    })
}

fn subagent_text_delta(parent: &str, text: &str) -> Value {
    json!({
        "type": "stream_event",
        "event_type": "content_block_delta",
        "block_index": 0,
        "delta_type": "text_delta",
        "text": text,
        "parent_tool_use_id": parent,
    })
}

fn message_stop() -> Value {
    json!({"type": "stream_event", "event_type": "message_stop"})
}

fn init(session_id: &str) -> Value {
    json!({"type": "system", "subtype": "init", "session_id": session_id})
}

fn result(session_id: &str, cost: f64) -> Value {
    json!({
        "type": "result",
        "subtype": "success",
        "session_id": session_id,
        "total_cost_usd": cost,
        "num_turns": 1,
    })
}

fn frozen_turns(events: &[EngineEvent]) -> Vec<Turn> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::TurnFrozen { turn } => Some(turn.clone()),
            _ => None,
        })
        .collect()
}

fn run_outcome(events: &[EngineEvent]) -> Option<RunOutcome> {
    events.iter().find_map(|event| match event {
        EngineEvent::RunEnded { outcome, .. } => Some(outcome.clone()),
        _ => None,
    })
}

fn persisted(engine: &mut Engine, store: &dyn TurnStore) {
    for op in engine.drain_persistence() {
        apply_persist_op(store, op);
    }
}

#[test]
fn text_response_streams_then_freezes_and_records_cost() {
    let mut engine = Engine::new(SessionSettings::default());
    let submission = engine.submit("  hi  ").expect("first submit succeeds");
    assert_eq!(submission.request.prompt, "hi");
    assert_eq!(submission.request.resume, None);
    assert_eq!(frozen_turns(&submission.events)[0].text, "hi");

    let events = apply_all(
        &mut engine,
        submission.run_id,
        vec![
            init("sess-1"),
            text_delta("Hel"),
            text_delta("lo"),
            message_stop(),
            result("sess-1", 0.01),
        ],
    );

    assert!(events.contains(&EngineEvent::SessionStarted {
        session_id: "sess-1".to_string()
    }));
    let opened = events
        .iter()
        .filter(|event| matches!(event, EngineEvent::TurnOpened { .. }))
        .count();
    assert_eq!(opened, 1);

    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::TextDelta { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Hel", "lo"]);

    let frozen = frozen_turns(&events);
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].text, "Hello");
    assert_eq!(frozen[0].completion, TurnCompletion::Complete);
    assert_eq!(frozen[0].source, TurnSource::Main);

    let Some(RunOutcome::Completed(summary)) = run_outcome(&events) else {
        panic!("run should complete with a summary");
    };
    assert_eq!(summary.cost_usd, 0.01);
    assert_eq!(summary.subtype.as_deref(), Some("success"));
    assert!(!engine.is_run_active());
    assert_eq!(engine.cost().last_query_usd(), Some(0.01));

    let next = engine.submit("again").expect("second submit succeeds");
    assert_eq!(next.request.resume.as_deref(), Some("sess-1"));
    assert_ne!(next.run_id, submission.run_id);
}

#[test]
fn block_lifecycle_frames_build_one_assistant_turn() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("greet").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            json!({"type": "stream_event", "event_type": "message_start", "message_id": "msg_1"}),
            json!({
                "type": "stream_event",
                "event_type": "content_block_start",
                "block_index": 0,
                "block_type": "text",
            }),
            text_delta("Hello, "),
            text_delta("world"),
            json!({"type": "stream_event", "event_type": "content_block_stop", "block_index": 0}),
            json!({"type": "stream_event", "event_type": "message_delta", "stop_reason": "end_turn"}),
            message_stop(),
            json!({"type": "result", "total_cost_usd": 0.002}),
        ],
    );

    let frozen = frozen_turns(&events);
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].text, "Hello, world");
    assert_eq!(frozen[0].stop_reason.as_deref(), Some("end_turn"));
    assert_eq!(engine.cost().cumulative_usd(), 0.002);
}

#[test]
fn streamed_tool_arguments_assemble_and_receive_their_result() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("find foo").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            init("sess-1"),
            json!({
                "type": "stream_event",
                "event_type": "content_block_start",
                "block_index": 1,
                "block_type": "tool_use",
                "tool_id": "t1",
                "tool_name": "Grep",
            }),
            json!({
                "type": "stream_event",
                "event_type": "content_block_delta",
                "block_index": 1,
                "delta_type": "input_json_delta",
                "partial_json": "{\"pat",
            }),
            json!({
                "type": "stream_event",
                "event_type": "content_block_delta",
                "block_index": 1,
                "delta_type": "input_json_delta",
                "partial_json": "tern\":\"foo\"}",
            }),
            json!({"type": "stream_event", "event_type": "content_block_stop", "block_index": 1}),
            json!({
                "type": "tool_result",
                "results": [{"tool_use_id": "t1", "content": "src/lib.rs:1", "is_error": false}],
            }),
        ],
    );

    let statuses: Vec<ToolCallStatus> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::ToolCallUpdated { call, .. } => Some(call.status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses.first(), Some(&ToolCallStatus::Starting));
    assert!(statuses.contains(&ToolCallStatus::Running));

    let inputs: Vec<Value> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::ToolCallUpdated { call, .. } => Some(call.input.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(inputs.first(), Some(&json!({})));
    assert!(inputs.contains(&json!({"pattern": "foo"})));

    let open = engine
        .open_turn(&TurnSource::Main)
        .expect("turn stays open until message_stop");
    let call = open.tool_call("t1").expect("call is attached to the turn");
    assert_eq!(call.input, json!({"pattern": "foo"}));
    assert_eq!(call.status, ToolCallStatus::Complete);
    assert_eq!(
        call.result.as_ref().and_then(|output| output.content.as_deref()),
        Some("src/lib.rs:1")
    );

    let events = apply_all(&mut engine, run_id, vec![message_stop()]);
    let frozen = frozen_turns(&events);
    assert_eq!(frozen[0].tool_calls.len(), 1);
    assert!(frozen[0].tool_calls[0].result.is_some());
}

#[test]
fn truncated_tool_arguments_degrade_to_an_empty_object() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("go").expect("submit").run_id;

    apply_all(
        &mut engine,
        run_id,
        vec![
            json!({
                "type": "stream_event",
                "event_type": "content_block_start",
                "block_index": 0,
                "block_type": "tool_use",
                "tool_id": "t1",
                "tool_name": "Bash",
            }),
            json!({
                "type": "stream_event",
                "event_type": "content_block_delta",
                "block_index": 0,
                "delta_type": "input_json_delta",
                "partial_json": "{\"command\":",
            }),
            json!({"type": "stream_event", "event_type": "content_block_stop", "block_index": 0}),
        ],
    );

    let call = engine
        .open_turn(&TurnSource::Main)
        .and_then(|turn| turn.tool_call("t1"))
        .expect("call exists");
    assert_eq!(call.status, ToolCallStatus::Complete);
    assert_eq!(call.input, json!({}));
    assert_eq!(
        call.diagnostic,
        Some(ToolCallDiagnostic::IncompleteInput {
            partial_json: "{\"command\":".to_string()
        })
    );
    assert!(call.is_degraded());
}

#[test]
fn interrupt_freezes_open_turns_and_ignores_late_content() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("write a novel").expect("submit").run_id;
    apply_all(&mut engine, run_id, vec![init("sess-1"), text_delta("Once upon")]);

    let (interrupted, events) = engine.request_interrupt().expect("run is active");
    assert_eq!(interrupted, run_id);
    let frozen = frozen_turns(&events);
    assert_eq!(frozen.len(), 1);
    assert!(frozen[0].is_interrupted());
    assert_eq!(frozen[0].text, "Once upon");
    assert_eq!(run_outcome(&events), Some(RunOutcome::Interrupted));
    assert!(!engine.is_run_active());

    let late = apply_all(&mut engine, run_id, vec![text_delta(" a time"), message_stop()]);
    assert!(late.is_empty());

    let late_result = apply_all(&mut engine, run_id, vec![result("sess-1", 0.02)]);
    assert_eq!(
        late_result,
        vec![EngineEvent::CostUpdated {
            last_query_usd: 0.02,
            cumulative_usd: 0.02,
        }]
    );

    let next = engine.submit("shorter please").expect("input is available at once");
    assert_eq!(next.request.resume.as_deref(), Some("sess-1"));
    assert!(engine.finish_transport(run_id, TransportEnd::Closed).is_empty());
    assert!(apply_all(&mut engine, run_id, vec![result("sess-1", 0.5)]).is_empty());
}

#[test]
fn interrupt_and_submit_are_guarded() {
    let mut engine = Engine::new(SessionSettings::default());
    assert_eq!(engine.request_interrupt().err(), Some(EngineError::NoActiveRun));
    assert_eq!(engine.submit("   ").err(), Some(EngineError::EmptyPrompt));

    let run_id = engine.submit("one").expect("submit").run_id;
    assert_eq!(
        engine.submit("two").err(),
        Some(EngineError::RunAlreadyActive { run_id })
    );
    assert_eq!(engine.reset().err(), Some(EngineError::RunAlreadyActive { run_id }));
}

#[test]
fn session_id_is_never_replaced_mid_session() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;
    let events = apply_all(&mut engine, run_id, vec![init("sess-1"), result("sess-2", 0.0)]);

    let started = events
        .iter()
        .filter(|event| matches!(event, EngineEvent::SessionStarted { .. }))
        .count();
    assert_eq!(started, 1);
    assert_eq!(engine.session().session_id(), Some("sess-1"));
}

#[test]
fn subagent_turns_do_not_disturb_the_main_turn() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("delegate").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            text_delta("main "),
            subagent_text_delta("task-1", "sub "),
            text_delta("text"),
            subagent_text_delta("task-1", "work"),
            json!({
                "type": "stream_event",
                "event_type": "message_stop",
                "parent_tool_use_id": "task-1",
            }),
        ],
    );

    let frozen = frozen_turns(&events);
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].source, TurnSource::Subagent("task-1".to_string()));
    assert_eq!(frozen[0].text, "sub work");

    let main = engine.open_turn(&TurnSource::Main).expect("main turn still open");
    assert_eq!(main.text, "main text");
    assert!(!main.is_frozen());
}

#[test]
fn stream_closing_early_freezes_partial_turns() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;
    apply_all(&mut engine, run_id, vec![text_delta("half")]);

    let events = engine.finish_transport(run_id, TransportEnd::Failed("connection reset".into()));
    let frozen = frozen_turns(&events);
    assert!(matches!(frozen[0].completion, TurnCompletion::Partial { .. }));
    assert!(events.contains(&EngineEvent::TransportNotice {
        message: "connection reset".to_string()
    }));
    assert_eq!(
        run_outcome(&events),
        Some(RunOutcome::StreamFailed {
            message: "connection reset".to_string()
        })
    );
    assert!(!engine.is_run_active());
}

#[test]
fn full_assistant_message_materializes_only_without_stream_events() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![json!({
            "type": "assistant",
            "content": "Looking.",
            "tool_uses": [{"id": "t9", "name": "Read", "input": {"path": "a.rs"}}],
        })],
    );
    let frozen = frozen_turns(&events);
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].text, "Looking.");
    assert_eq!(frozen[0].tool_calls[0].input, json!({"path": "a.rs"}));

    let late_output = apply_all(
        &mut engine,
        run_id,
        vec![json!({"type": "tool_result", "results": [{"tool_use_id": "t9", "content": "fn main() {}"}]})],
    );
    assert!(matches!(
        late_output.as_slice(),
        [EngineEvent::ToolResult { tool_use_id, .. }] if tool_use_id == "t9"
    ));

    let mut streamed = Engine::new(SessionSettings::default());
    let run_id = streamed.submit("hi").expect("submit").run_id;
    let events = apply_all(
        &mut streamed,
        run_id,
        vec![
            text_delta("Looking."),
            message_stop(),
            json!({"type": "assistant", "content": "Looking."}),
        ],
    );
    assert_eq!(frozen_turns(&events).len(), 1);
}

#[test]
fn records_before_the_session_id_are_persisted_once_it_arrives() {
    let store = MemoryTurnStore::new();
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;
    apply_all(&mut engine, run_id, vec![text_delta("early"), message_stop()]);
    persisted(&mut engine, &store);
    assert!(store.session_ids().is_empty());

    apply_all(&mut engine, run_id, vec![result("sess-1", 0.01)]);
    persisted(&mut engine, &store);

    let turns = store.get_all("sess-1").expect("memory store reads");
    let texts: Vec<&str> = turns.iter().map(|turn| turn.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "early"]);
    assert_eq!(
        store.active_session().expect("memory store reads"),
        Some("sess-1".to_string())
    );
}

#[test]
fn persisted_session_replays_into_a_fresh_engine() {
    let store = MemoryTurnStore::new();
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("list files").expect("submit").run_id;
    apply_all(
        &mut engine,
        run_id,
        vec![
            init("sess-1"),
            json!({
                "type": "stream_event",
                "event_type": "content_block_start",
                "block_index": 0,
                "block_type": "tool_use",
                "tool_id": "t1",
                "tool_name": "Glob",
            }),
            json!({
                "type": "stream_event",
                "event_type": "content_block_delta",
                "block_index": 0,
                "delta_type": "input_json_delta",
                "partial_json": "{\"pattern\":\"*.rs\"}",
            }),
            json!({"type": "stream_event", "event_type": "content_block_stop", "block_index": 0}),
            message_stop(),
            json!({"type": "tool_result", "results": [{"tool_use_id": "t1", "content": "lib.rs"}]}),
            result("sess-1", 0.03),
        ],
    );
    persisted(&mut engine, &store);

    let turns = replay(&store, "sess-1").expect("replay succeeds");
    assert_eq!(turns.len(), 2);
    assert!(turns.iter().all(|turn| turn.from_replay));
    let call = turns[1].tool_call("t1").expect("call survives replay");
    assert_eq!(
        call.result.as_ref().and_then(|output| output.content.as_deref()),
        Some("lib.rs")
    );

    let mut restored = Engine::new(SessionSettings::default());
    let events = restored.restore("sess-1", turns);
    assert_eq!(
        events.first(),
        Some(&EngineEvent::SessionStarted {
            session_id: "sess-1".to_string()
        })
    );
    assert_eq!(frozen_turns(&events).len(), 2);
    assert!(restored.drain_persistence().is_empty());
    let next = restored.submit("continue").expect("submit");
    assert_eq!(next.request.resume.as_deref(), Some("sess-1"));
}

#[test]
fn reset_clears_session_and_spend() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;
    apply_all(&mut engine, run_id, vec![init("sess-1"), result("sess-1", 0.2)]);
    engine.drain_persistence();

    let events = engine.reset().expect("no run is active");
    assert_eq!(events, vec![EngineEvent::SessionReset]);
    assert_eq!(engine.session().session_id(), None);
    assert_eq!(engine.cost().cumulative_usd(), 0.0);
    assert!(engine
        .drain_persistence()
        .iter()
        .any(|op| matches!(op, PersistOp::SetActiveSession(None))));

    let next = engine.submit("fresh").expect("submit");
    assert_eq!(next.request.resume, None);
}

#[test]
fn malformed_records_between_valid_ones_do_not_break_the_turn() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;

    let mut reader = FrameReader::default();
    let payload = concat!(
        "data: {\"type\":\"stream_event\",\"event_type\":\"content_block_delta\",\"delta_type\":\"text_delta\",\"text\":\"a\"}\n\n",
        "data: {not json\n\n",
        "data: {\"type\":\"stream_event\",\"event_type\":\"content_block_delta\",\"delta_type\":\"text_delta\",\"text\":\"b\"}\n\n",
        "data: {\"type\":\"stream_event\",\"event_type\":\"message_stop\"}\n\n",
    );
    let events: Vec<EngineEvent> = reader
        .feed(payload.as_bytes())
        .into_iter()
        .flat_map(|frame| engine.apply(run_id, frame))
        .collect();

    assert_eq!(reader.malformed_count(), 1);
    assert_eq!(frozen_turns(&events)[0].text, "ab");
}

fn tool_block_start(index: usize, id: &str, name: &str) -> Value {
    json!({
        "type": "stream_event",
        "event_type": "content_block_start",
        "block_index": index,
        "block_type": "tool_use",
        "tool_id": id,
        "tool_name": name,
    })
}

fn tool_input(index: usize, partial: &str) -> Value {
    json!({
        "type": "stream_event",
        "event_type": "content_block_delta",
        "block_index": index,
        "delta_type": "input_json_delta",
        "partial_json": partial,
    })
}

fn block_stop(index: usize) -> Value {
    json!({"type": "stream_event", "event_type": "content_block_stop", "block_index": index})
}

fn failed_tool_result(id: &str, content: &str) -> Value {
    json!({
        "type": "tool_result",
        "results": [{"tool_use_id": id, "content": content, "is_error": true}],
    })
}

#[test]
fn failed_tool_result_marks_the_open_call_as_error() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("run it").expect("submit").run_id;

    apply_all(
        &mut engine,
        run_id,
        vec![
            tool_block_start(0, "t1", "Bash"),
            tool_input(0, "{\"command\":\"false\"}"),
            block_stop(0),
            failed_tool_result("t1", "exit 1"),
        ],
    );

    let turn = engine.open_turn(&TurnSource::Main).expect("turn still open");
    let call = turn.tool_call("t1").expect("call recorded");
    assert_eq!(call.status, ToolCallStatus::Error);
    assert_eq!(call.input, json!({"command": "false"}));
    let output = call.result.as_ref().expect("result attached");
    assert!(output.is_error);
    assert_eq!(output.content.as_deref(), Some("exit 1"));
}

#[test]
fn tool_result_before_block_stop_keeps_its_error() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("run it").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            tool_block_start(0, "t1", "Bash"),
            tool_input(0, "{\"c\":1}"),
            failed_tool_result("t1", "boom"),
            block_stop(0),
        ],
    );

    let last_update = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::ToolCallUpdated { call, .. } => Some(call.clone()),
            _ => None,
        })
        .last()
        .expect("tool call updates");
    assert_eq!(last_update.status, ToolCallStatus::Error);
    assert_eq!(last_update.input, json!({"c": 1}));

    let turn = engine.open_turn(&TurnSource::Main).expect("turn still open");
    let call = turn.tool_call("t1").expect("call recorded");
    assert_eq!(call.status, ToolCallStatus::Error);
    assert_eq!(call.input, json!({"c": 1}));
    assert_eq!(
        call.result.as_ref().and_then(|output| output.content.as_deref()),
        Some("boom")
    );

    let frozen = frozen_turns(&apply_all(&mut engine, run_id, vec![message_stop()]));
    assert_eq!(frozen[0].tool_calls[0].status, ToolCallStatus::Error);
}

#[test]
fn tool_result_for_an_unstopped_block_survives_the_freeze() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("run it").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            tool_block_start(0, "t1", "Bash"),
            tool_input(0, "{\"c\":1}"),
            failed_tool_result("t1", "boom"),
            message_stop(),
        ],
    );

    let frozen = frozen_turns(&events);
    let call = &frozen[0].tool_calls[0];
    assert_eq!(call.status, ToolCallStatus::Error);
    assert!(call.result.is_some());
}

#[test]
fn retry_notice_is_surfaced_without_ending_the_run() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![json!({
            "type": "system",
            "subtype": "retry",
            "attempt": 2,
            "max_retries": 5,
            "delay": 1.5,
            "error": "overloaded",
        })],
    );

    assert_eq!(events.len(), 1);
    let EngineEvent::RetryNotice(notice) = &events[0] else {
        panic!("expected a retry notice, got {events:?}");
    };
    assert_eq!(notice.attempt, Some(2));
    assert_eq!(notice.error.as_deref(), Some("overloaded"));
    assert_eq!(engine.active_run_id(), Some(run_id));
    assert!(engine.open_turn(&TurnSource::Main).is_none());
}

#[test]
fn upstream_error_frame_is_reported_and_the_run_stays_active() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            text_delta("partial"),
            json!({"type": "error", "content": "rate limited"}),
        ],
    );

    assert!(events.contains(&EngineEvent::UpstreamError {
        message: "rate limited".to_string()
    }));
    assert!(run_outcome(&events).is_none());
    assert!(engine.is_run_active());
    assert_eq!(
        engine.open_turn(&TurnSource::Main).map(|turn| turn.text.as_str()),
        Some("partial")
    );
}

#[test]
fn unknown_frame_kinds_and_event_types_change_nothing() {
    let mut engine = Engine::new(SessionSettings::default());
    let run_id = engine.submit("hi").expect("submit").run_id;
    apply_all(&mut engine, run_id, vec![text_delta("kept")]);
    let before = engine.open_turn(&TurnSource::Main).cloned();

    let events = apply_all(
        &mut engine,
        run_id,
        vec![
            json!({"type": "telemetry", "payload": {"x": 1}}),
            json!({"type": "stream_event", "event_type": "ping"}),
        ],
    );

    assert!(events.is_empty());
    assert_eq!(engine.open_turn(&TurnSource::Main).cloned(), before);
    assert_eq!(engine.active_run_id(), Some(run_id));
}
