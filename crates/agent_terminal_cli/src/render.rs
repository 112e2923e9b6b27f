//! Plain-text sink for engine events.
//!
//! Assistant text goes to `out` as it streams; notices, cost and errors go to `diag`.

use std::collections::HashSet;
use std::io::{self, Write};

use agent_terminal::{EngineEvent, RunOutcome};
use turn_model::{Role, ToolCall, ToolCallStatus, ToolOutput, Turn, TurnCompletion};

const SUMMARY_WIDTH: usize = 120;

#[derive(Debug, Default)]
pub struct Renderer {
    mid_line: bool,
    streamed_turns: HashSet<String>,
    announced_calls: HashSet<String>,
    reported_results: HashSet<String>,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(
        &mut self,
        event: &EngineEvent,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> io::Result<()> {
        match event {
            EngineEvent::TurnOpened { turn_id, source } => {
                self.streamed_turns.insert(turn_id.clone());
                if !source.is_main() {
                    self.break_line(out)?;
                    writeln!(out, "[{source}]")?;
                }
            }
            EngineEvent::TextDelta { text, .. } => {
                write!(out, "{text}")?;
                self.mid_line = !text.ends_with('\n');
            }
            EngineEvent::ThinkingDelta { text, .. } => write!(diag, "{text}")?,
            EngineEvent::ToolCallUpdated { call, .. } => self.render_call(call, out)?,
            EngineEvent::TurnFrozen { turn } => self.render_frozen(turn, out)?,
            EngineEvent::ToolResult {
                tool_use_id,
                output,
            } => {
                if self.reported_results.insert(tool_use_id.clone()) {
                    self.break_line(out)?;
                    writeln!(out, "  {} {}", result_label(output), summarize(output))?;
                }
            }
            EngineEvent::SessionStarted { session_id } => writeln!(diag, "session {session_id}")?,
            EngineEvent::SessionReset => writeln!(diag, "started a new session")?,
            EngineEvent::CostUpdated {
                last_query_usd,
                cumulative_usd,
            } => writeln!(diag, "{}", format_cost(Some(*last_query_usd), *cumulative_usd))?,
            EngineEvent::RetryNotice(notice) => {
                let attempt = notice
                    .attempt
                    .map_or_else(|| "?".to_string(), |value| value.to_string());
                let max = notice
                    .max_retries
                    .map_or_else(|| "?".to_string(), |value| value.to_string());
                let reason = notice.error.as_deref().unwrap_or("transient error");
                writeln!(diag, "upstream retrying ({attempt}/{max}): {reason}")?;
            }
            EngineEvent::UpstreamError { message } => writeln!(diag, "error: {message}")?,
            EngineEvent::TransportNotice { message } => writeln!(diag, "warning: {message}")?,
            EngineEvent::RunEnded { outcome, .. } => {
                self.break_line(out)?;
                match outcome {
                    RunOutcome::Completed(summary) if summary.is_error => {
                        let detail = summary
                            .result
                            .as_deref()
                            .or(summary.subtype.as_deref())
                            .unwrap_or("unknown");
                        writeln!(diag, "run ended with an error: {detail}")?;
                    }
                    RunOutcome::Completed(_) => {}
                    RunOutcome::Interrupted => writeln!(diag, "interrupted")?,
                    RunOutcome::StreamClosed => writeln!(diag, "stream closed before a result")?,
                    RunOutcome::StreamFailed { message } => {
                        writeln!(diag, "stream failed: {message}")?;
                    }
                }
            }
        }
        out.flush()?;
        diag.flush()
    }

    fn render_call(&mut self, call: &ToolCall, out: &mut dyn Write) -> io::Result<()> {
        if matches!(call.status, ToolCallStatus::Starting | ToolCallStatus::Running) {
            return Ok(());
        }
        if self.announced_calls.insert(call.id.clone()) {
            self.break_line(out)?;
            let note = if call.is_degraded() {
                " (incomplete arguments)"
            } else {
                ""
            };
            writeln!(out, "-> {}({}){note}", call.name, call.input)?;
        }
        if let Some(output) = &call.result {
            if self.reported_results.insert(call.id.clone()) {
                writeln!(out, "  {} {}", result_label(output), summarize(output))?;
            }
        }
        Ok(())
    }

    fn render_frozen(&mut self, turn: &Turn, out: &mut dyn Write) -> io::Result<()> {
        if turn.from_replay || !self.streamed_turns.contains(&turn.id) {
            match turn.role {
                Role::User if !turn.from_replay => {}
                Role::User => {
                    self.break_line(out)?;
                    writeln!(out, "> {}", turn.text)?;
                }
                Role::Assistant => {
                    self.break_line(out)?;
                    if !turn.text.is_empty() {
                        writeln!(out, "{}", turn.text)?;
                    }
                    for call in &turn.tool_calls {
                        self.render_call(call, out)?;
                    }
                }
            }
        }
        self.streamed_turns.remove(&turn.id);

        match &turn.completion {
            TurnCompletion::Interrupted => {
                self.break_line(out)?;
                writeln!(out, "[interrupted]")?;
            }
            TurnCompletion::Partial { reason } => {
                self.break_line(out)?;
                writeln!(out, "[incomplete: {reason}]")?;
            }
            TurnCompletion::Streaming | TurnCompletion::Complete => {}
        }
        Ok(())
    }

    fn break_line(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

/// `cost: $0.0100 (session $0.0300)`, or just the session total when no query has run.
pub fn format_cost(last_query_usd: Option<f64>, cumulative_usd: f64) -> String {
    match last_query_usd {
        Some(last) => format!("cost: ${last:.4} (session ${cumulative_usd:.4})"),
        None => format!("session cost: ${cumulative_usd:.4}"),
    }
}

fn result_label(output: &ToolOutput) -> &'static str {
    if output.is_error {
        "error:"
    } else {
        "result:"
    }
}

fn summarize(output: &ToolOutput) -> String {
    let first = output
        .content
        .as_deref()
        .and_then(|content| content.lines().find(|line| !line.trim().is_empty()))
        .unwrap_or("(no output)");
    if first.chars().count() > SUMMARY_WIDTH {
        let cut: String = first.chars().take(SUMMARY_WIDTH).collect();
        format!("{cut}...")
    } else {
        first.to_string()
    }
}
