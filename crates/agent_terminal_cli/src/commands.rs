#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    /// Forget the current session and start fresh on the next prompt.
    New,
    Cost,
    Session,
    Cancel,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
/new      start a new session
/cost     show spend for the last query and this session
/session  show the active session id
/cancel   interrupt the running query (also Ctrl-C)
/quit     exit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/new" | "/clear" => SlashCommand::New,
        "/cost" => SlashCommand::Cost,
        "/session" => SlashCommand::Session,
        "/cancel" => SlashCommand::Cancel,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
