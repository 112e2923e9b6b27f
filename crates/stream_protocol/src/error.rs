use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum StreamApiError {
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    Cancelled,
    Unknown(String),
}

/// Error body shapes returned by the origin proxy.
///
/// The proxy answers either `{"error": "text"}` or `{"error": {"message": "text"}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub error: Option<Value>,
    pub message: Option<String>,
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        let from_error = match self.error.as_ref() {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Object(fields)) => fields
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            _ => None,
        };
        from_error
            .or_else(|| self.message.clone())
            .filter(|message| !message.trim().is_empty())
    }
}

impl StreamApiError {
    /// True when the request was abandoned because of a local interrupt.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for StreamApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(value) => write!(f, "invalid header: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StreamApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StreamApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for StreamApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extracts a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message() {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
