use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing a session log. Every file error names its path,
/// and every per-record error its 1-based line.
#[derive(Debug, Error)]
pub enum TurnStoreError {
    #[error("session id must not be empty")]
    EmptySessionId,

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: read failed: {source}")]
    ReadLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: not a valid session record: {source}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode a record for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // Header validation.
    #[error("{path} has no session header")]
    MissingHeader { path: PathBuf },

    #[error("{path}:{line}: expected the session header")]
    NotAHeader { path: PathBuf, line: usize },

    #[error("{path}:{line}: session header repeated")]
    RepeatedHeader { path: PathBuf, line: usize },

    #[error("{path}:{line}: log version {found} is not supported")]
    UnsupportedVersion {
        path: PathBuf,
        line: usize,
        found: u32,
    },

    #[error("{path} holds session '{found}' but '{expected}' was requested")]
    SessionIdMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    // Record validation.
    #[error("{path}:{line}: turn '{id}' was already recorded")]
    DuplicateTurnId {
        path: PathBuf,
        line: usize,
        id: String,
    },

    #[error("{path}:{line}: {field} is not an RFC 3339 timestamp: {value}")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("system clock could not be formatted: {0}")]
    Clock(#[source] time::error::Format),
}

impl TurnStoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read_line(path: impl Into<PathBuf>, line: usize, source: std::io::Error) -> Self {
        Self::ReadLine {
            path: path.into(),
            line,
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, line: usize, source: serde_json::Error) -> Self {
        Self::MalformedRecord {
            path: path.into(),
            line,
            source,
        }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Encode {
            path: path.into(),
            source,
        }
    }
}
