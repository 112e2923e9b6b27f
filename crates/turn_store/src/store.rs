use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use turn_model::{ToolResultRecord, Turn};

use crate::error::TurnStoreError;
use crate::paths::{session_file_name, ACTIVE_SESSION_FILE};
use crate::schema::{JsonLine, JsonLineRef, SessionHeader, SessionLog, SCHEMA_VERSION};

/// Durable, append-only store of frozen turns keyed by upstream session id.
///
/// Keys are used exactly as received from the protocol; implementations never
/// invent a session id.
pub trait TurnStore: Send + Sync {
    fn put(&self, session_id: &str, turn: &Turn) -> Result<(), TurnStoreError>;

    fn put_tool_result(
        &self,
        session_id: &str,
        record: &ToolResultRecord,
    ) -> Result<(), TurnStoreError>;

    /// Every record for the session, or an empty log if nothing was stored.
    fn load(&self, session_id: &str) -> Result<SessionLog, TurnStoreError>;

    fn clear(&self, session_id: &str) -> Result<(), TurnStoreError>;

    fn active_session(&self) -> Result<Option<String>, TurnStoreError>;

    fn set_active_session(&self, session_id: Option<&str>) -> Result<(), TurnStoreError>;

    /// Stored turns in write order, exactly as persisted.
    fn get_all(&self, session_id: &str) -> Result<Vec<Turn>, TurnStoreError> {
        Ok(self.load(session_id)?.turns)
    }
}

/// One JSONL file per session under a root directory.
#[derive(Debug, Clone)]
pub struct JsonlTurnStore {
    root: PathBuf,
}

impl JsonlTurnStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.root.join(session_file_name(session_id))
    }

    fn append(&self, session_id: &str, line: JsonLineRef<'_>) -> Result<(), TurnStoreError> {
        if session_id.is_empty() {
            return Err(TurnStoreError::EmptySessionId);
        }

        let path = self.session_path(session_id);
        let mut file = match OpenOptions::new().append(true).open(&path) {
            Ok(file) => {
                verify_header(&path, session_id)?;
                file
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                self.create_session_file(&path, session_id)?
            }
            Err(source) => {
                return Err(TurnStoreError::io(
                    "could not open for append",
                    &path,
                    source,
                ))
            }
        };

        write_line(&mut file, &path, &line)
    }

    fn create_session_file(&self, path: &Path, session_id: &str) -> Result<File, TurnStoreError> {
        fs::create_dir_all(&self.root)
            .map_err(|source| TurnStoreError::io("could not create store directory", &self.root, source))?;

        let header = SessionHeader::v1(session_id, now_rfc3339()?);
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)
            .map_err(|source| TurnStoreError::io("could not create session file", path, source))?;
        write_line(&mut file, path, &JsonLineRef::Session(&header))?;
        debug!(session_id, path = %path.display(), "created session log");
        Ok(file)
    }

    fn active_pointer_path(&self) -> PathBuf {
        self.root.join(ACTIVE_SESSION_FILE)
    }
}

impl TurnStore for JsonlTurnStore {
    fn put(&self, session_id: &str, turn: &Turn) -> Result<(), TurnStoreError> {
        self.append(session_id, JsonLineRef::Turn { turn })
    }

    fn put_tool_result(
        &self,
        session_id: &str,
        record: &ToolResultRecord,
    ) -> Result<(), TurnStoreError> {
        self.append(session_id, JsonLineRef::ToolResult { result: record })
    }

    fn load(&self, session_id: &str) -> Result<SessionLog, TurnStoreError> {
        let path = self.session_path(session_id);
        match File::open(&path) {
            Ok(file) => read_session_log(&path, session_id, file),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(SessionLog::default()),
            Err(source) => Err(TurnStoreError::io("could not open session file", &path, source)),
        }
    }

    fn clear(&self, session_id: &str) -> Result<(), TurnStoreError> {
        let path = self.session_path(session_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TurnStoreError::io("could not remove session file", &path, source)),
        }
    }

    fn active_session(&self) -> Result<Option<String>, TurnStoreError> {
        let path = self.active_pointer_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let session_id = contents.trim();
                Ok((!session_id.is_empty()).then(|| session_id.to_owned()))
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TurnStoreError::io("could not read active session pointer", &path, source)),
        }
    }

    fn set_active_session(&self, session_id: Option<&str>) -> Result<(), TurnStoreError> {
        let path = self.active_pointer_path();
        match session_id {
            Some(session_id) => {
                fs::create_dir_all(&self.root).map_err(|source| {
                    TurnStoreError::io("could not create store directory", &self.root, source)
                })?;
                fs::write(&path, session_id)
                    .map_err(|source| TurnStoreError::io("could not write active session pointer", &path, source))
            }
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => Err(TurnStoreError::io("could not clear active session pointer", &path, source)),
            },
        }
    }
}

/// Current UTC time in the format every stored timestamp uses.
pub fn now_rfc3339() -> Result<String, TurnStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(TurnStoreError::Clock)
}

fn write_line(file: &mut File, path: &Path, line: &JsonLineRef<'_>) -> Result<(), TurnStoreError> {
    let mut encoded =
        serde_json::to_string(line).map_err(|source| TurnStoreError::encode(path, source))?;
    encoded.push('\n');
    file.write_all(encoded.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|source| TurnStoreError::io("could not append to", path, source))
}

fn verify_header(path: &Path, session_id: &str) -> Result<(), TurnStoreError> {
    let file = File::open(path)
        .map_err(|source| TurnStoreError::io("could not open session file", path, source))?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|source| TurnStoreError::read_line(path, 1, source))?;
    let header = parse_header(path, 1, first.trim_end())?;
    check_session_id(path, session_id, &header)
}

fn read_session_log(path: &Path, session_id: &str, file: File) -> Result<SessionLog, TurnStoreError> {
    let mut log = SessionLog::default();
    let mut seen_turn_ids = HashSet::new();
    let mut header_seen = false;

    for (line_index, line_result) in BufReader::new(file).lines().enumerate() {
        let line_number = line_index + 1;
        let line = line_result.map_err(|source| TurnStoreError::read_line(path, line_number, source))?;

        if line_number == 1 {
            let header = parse_header(path, line_number, &line)?;
            check_session_id(path, session_id, &header)?;
            header_seen = true;
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        match parse_json_line(path, line_number, &line)? {
            JsonLine::Session(_) => {
                return Err(TurnStoreError::RepeatedHeader {
                    path: path.to_path_buf(),
                    line: line_number,
                });
            }
            JsonLine::Turn { turn } => {
                validate_rfc3339(path, line_number, "timestamp", &turn.timestamp)?;
                if !seen_turn_ids.insert(turn.id.clone()) {
                    return Err(TurnStoreError::DuplicateTurnId {
                        path: path.to_path_buf(),
                        line: line_number,
                        id: turn.id,
                    });
                }
                log.turns.push(turn);
            }
            JsonLine::ToolResult { result } => {
                validate_rfc3339(path, line_number, "timestamp", &result.timestamp)?;
                log.tool_results.push(result);
            }
        }
    }

    if !header_seen {
        return Err(TurnStoreError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    Ok(log)
}

fn parse_header(path: &Path, line_number: usize, line: &str) -> Result<SessionHeader, TurnStoreError> {
    if line.trim().is_empty() {
        return Err(TurnStoreError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let header = match parse_json_line(path, line_number, line)? {
        JsonLine::Session(header) => header,
        JsonLine::Turn { .. } | JsonLine::ToolResult { .. } => {
            return Err(TurnStoreError::NotAHeader {
                path: path.to_path_buf(),
                line: line_number,
            });
        }
    };

    if header.version != SCHEMA_VERSION {
        return Err(TurnStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }
    validate_rfc3339(path, line_number, "created_at", &header.created_at)?;

    Ok(header)
}

fn check_session_id(path: &Path, expected: &str, header: &SessionHeader) -> Result<(), TurnStoreError> {
    if header.session_id != expected {
        return Err(TurnStoreError::SessionIdMismatch {
            path: path.to_path_buf(),
            expected: expected.to_owned(),
            found: header.session_id.clone(),
        });
    }
    Ok(())
}

fn parse_json_line(path: &Path, line_number: usize, line: &str) -> Result<JsonLine, TurnStoreError> {
    serde_json::from_str::<JsonLine>(line)
        .map_err(|source| TurnStoreError::malformed(path, line_number, source))
}

fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), TurnStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(TurnStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
