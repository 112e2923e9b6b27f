use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Maximum retry attempts after an initial connect attempt.
pub const MAX_RETRIES: u32 = 3;
/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1000;

fn retryable_error_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(
            r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?(refused|reset)",
        )
        .expect("retry regex must compile")
    })
}

/// Backoff policy for establishing the stream. Established streams are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff delay for a zero-based retry attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30);
        self.base_delay.saturating_mul(2u32.saturating_pow(exponent))
    }
}

/// Status and error-text policy for transient connect failures.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504) || retryable_error_regex().is_match(error_text)
}
