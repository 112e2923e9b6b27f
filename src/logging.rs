//! Diagnostic logging setup. Logs go to stderr; stdout belongs to the sink.

use std::env;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "AGENT_TERMINAL_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter directive from `AGENT_TERMINAL_LOG`, then `RUST_LOG`, then `warn`.
#[must_use]
pub fn filter_directive() -> String {
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Installs the global subscriber. Returns false if one was already set.
pub fn init() -> bool {
    let filter = EnvFilter::try_new(filter_directive())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    use super::{filter_directive, LOG_ENV};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn directive_prefers_terminal_variable() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, Some("agent_terminal=debug"));
        let _g2 = set_env_guard("RUST_LOG", Some("info"));
        assert_eq!(filter_directive(), "agent_terminal=debug");
    }

    #[test]
    fn directive_falls_back_to_rust_log_then_warn() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, Some(" "));
        let _g2 = set_env_guard("RUST_LOG", Some("info"));
        assert_eq!(filter_directive(), "info");

        let _g3 = set_env_guard("RUST_LOG", None);
        assert_eq!(filter_directive(), "warn");
    }
}
