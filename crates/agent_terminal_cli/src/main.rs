use std::io;
use std::sync::Arc;

use agent_terminal::{
    logging, Engine, EngineError, EngineEvent, StreamController, TerminalConfig,
};
use agent_terminal_cli::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use agent_terminal_cli::render::{format_cost, Renderer};
use agent_terminal_cli::shutdown::{settle_sink, SINK_GRACE};
use anyhow::Context;
use stream_protocol::StreamApiClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use turn_store::JsonlTurnStore;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = TerminalConfig::from_env().context("failed to load configuration")?;
    let store = Arc::new(JsonlTurnStore::new(config.store_dir.clone()));
    let client =
        StreamApiClient::new(config.api_config()).context("failed to build upstream client")?;

    let (controller, events) = StreamController::new(
        Engine::new(config.session_settings()),
        Arc::new(client),
        store,
    );
    let sink = tokio::spawn(render_events(events));

    match controller.restore_active_session() {
        Ok(Some(session_id)) => eprintln!("resumed session {session_id}"),
        Ok(None) => {}
        Err(error) => warn!(%error, "could not restore the previous session"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if handle_line(&controller, &line).await == Flow::Quit {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                match controller.interrupt().await {
                    Ok(_) => {}
                    Err(EngineError::NoActiveRun) => break,
                    Err(error) => eprintln!("{error}"),
                }
            }
        }
    }

    if controller.is_run_active() {
        if let Err(error) = controller.interrupt().await {
            warn!(%error, "could not interrupt the running query on exit");
        }
    }
    controller.flush_persistence().await;
    drop(controller);
    settle_sink(sink, SINK_GRACE).await;
    Ok(())
}

async fn handle_line(controller: &StreamController, line: &str) -> Flow {
    if line.trim().is_empty() {
        return Flow::Continue;
    }

    let Some(command) = parse_slash_command(line) else {
        if let Err(error) = controller.submit(line) {
            eprintln!("{error}");
        }
        return Flow::Continue;
    };

    match command {
        SlashCommand::Help => eprintln!("{HELP_TEXT}"),
        SlashCommand::New => {
            if let Err(error) = controller.reset() {
                eprintln!("{error}");
            }
        }
        SlashCommand::Cost => {
            let line = controller.with_engine(|engine| {
                format_cost(engine.cost().last_query_usd(), engine.cost().cumulative_usd())
            });
            eprintln!("{line}");
        }
        SlashCommand::Session => {
            let session = controller.with_engine(|engine| {
                engine.session().session_id().map(ToOwned::to_owned)
            });
            match session {
                Some(session_id) => eprintln!("session {session_id}"),
                None => eprintln!("no session yet"),
            }
        }
        SlashCommand::Cancel => {
            if let Err(error) = controller.interrupt().await {
                eprintln!("{error}");
            }
        }
        SlashCommand::Quit => return Flow::Quit,
        SlashCommand::Unknown(command) => eprintln!("unknown command {command}; try /help"),
    }
    Flow::Continue
}

async fn render_events(mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    let mut renderer = Renderer::new();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    while let Some(event) = events.recv().await {
        if let Err(error) = renderer.render(&event, &mut stdout, &mut stderr) {
            warn!(%error, "failed to write to the terminal");
        }
    }
}
