use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::endpoint::{DEFAULT_BASE_URL, DEFAULT_INTERRUPT_PATH, DEFAULT_QUERY_PATH};

/// Transport configuration for the upstream query and interrupt endpoints.
#[derive(Debug, Clone)]
pub struct StreamApiConfig {
    /// Origin that proxies the agent runtime.
    pub base_url: String,
    /// Path of the streaming query endpoint, relative to `base_url`.
    pub query_path: String,
    /// Path of the cancellation endpoint, relative to `base_url`.
    pub interrupt_path: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Bound on establishing the TCP connection. Established streams are never timed out.
    pub connect_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for StreamApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            query_path: DEFAULT_QUERY_PATH.to_string(),
            interrupt_path: DEFAULT_INTERRUPT_PATH.to_string(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            connect_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl StreamApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_query_path(mut self, path: impl Into<String>) -> Self {
        self.query_path = path.into();
        self
    }

    pub fn with_interrupt_path(mut self, path: impl Into<String>) -> Self {
        self.interrupt_path = path.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
