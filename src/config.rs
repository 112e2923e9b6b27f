//! Terminal configuration: defaults, an optional JSON file, then environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stream_protocol::endpoint::{DEFAULT_BASE_URL, DEFAULT_INTERRUPT_PATH, DEFAULT_QUERY_PATH};
use stream_protocol::StreamApiConfig;
use thiserror::Error;

use crate::session::SessionSettings;

pub const CONFIG_PATH_ENV: &str = "AGENT_TERMINAL_CONFIG_PATH";
pub const BASE_URL_ENV: &str = "AGENT_TERMINAL_BASE_URL";
pub const MODEL_ENV: &str = "AGENT_TERMINAL_MODEL";
pub const MAX_TURNS_ENV: &str = "AGENT_TERMINAL_MAX_TURNS";
pub const MAX_BUDGET_ENV: &str = "AGENT_TERMINAL_MAX_BUDGET_USD";
pub const ENABLE_THINKING_ENV: &str = "AGENT_TERMINAL_ENABLE_THINKING";
pub const STORE_DIR_ENV: &str = "AGENT_TERMINAL_STORE_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalConfig {
    pub base_url: String,
    pub query_path: String,
    pub interrupt_path: String,
    pub model: String,
    pub max_turns: u32,
    pub max_budget_usd: f64,
    pub enable_thinking: bool,
    pub store_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    query_path: Option<String>,
    interrupt_path: Option<String>,
    model: Option<String>,
    max_turns: Option<u32>,
    max_budget_usd: Option<f64>,
    enable_thinking: Option<bool>,
    store_dir: Option<PathBuf>,
}

impl TerminalConfig {
    #[must_use]
    pub fn defaults(cwd: &Path) -> Self {
        let settings = SessionSettings::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            query_path: DEFAULT_QUERY_PATH.to_string(),
            interrupt_path: DEFAULT_INTERRUPT_PATH.to_string(),
            model: settings.model,
            max_turns: settings.max_turns,
            max_budget_usd: settings.max_budget_usd,
            enable_thinking: settings.enable_thinking,
            store_dir: turn_store::store_root(cwd),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = env::current_dir().map_err(ConfigError::CurrentDir)?;
        Self::load(&cwd)
    }

    /// Defaults rooted at `cwd`, overlaid by the config file and then the environment.
    pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::defaults(cwd);

        if let Some(path) = env_string_opt(CONFIG_PATH_ENV) {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(query_path) = file.query_path {
            self.query_path = query_path;
        }
        if let Some(interrupt_path) = file.interrupt_path {
            self.interrupt_path = interrupt_path;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(max_turns) = file.max_turns {
            self.max_turns = max_turns;
        }
        if let Some(max_budget_usd) = file.max_budget_usd {
            self.max_budget_usd = max_budget_usd;
        }
        if let Some(enable_thinking) = file.enable_thinking {
            self.enable_thinking = enable_thinking;
        }
        if let Some(store_dir) = file.store_dir {
            self.store_dir = store_dir;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(base_url) = env_string_opt(BASE_URL_ENV) {
            self.base_url = base_url;
        }
        if let Some(model) = env_string_opt(MODEL_ENV) {
            self.model = model;
        }
        if let Some(value) = env_string_opt(MAX_TURNS_ENV) {
            self.max_turns = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: MAX_TURNS_ENV,
                    value,
                })?;
        }
        if let Some(value) = env_string_opt(MAX_BUDGET_ENV) {
            self.max_budget_usd = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: MAX_BUDGET_ENV,
                    value,
                })?;
        }
        if let Some(value) = env_string_opt(ENABLE_THINKING_ENV) {
            self.enable_thinking = matches!(value.trim(), "1" | "true" | "TRUE" | "yes" | "YES");
        }
        if let Some(store_dir) = env_string_opt(STORE_DIR_ENV) {
            self.store_dir = PathBuf::from(store_dir);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid("max_turns must be positive".to_string()));
        }
        if !self.max_budget_usd.is_finite() || self.max_budget_usd <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_budget_usd must be a positive amount, got {}",
                self.max_budget_usd
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            model: self.model.clone(),
            max_turns: self.max_turns,
            max_budget_usd: self.max_budget_usd,
            enable_thinking: self.enable_thinking,
        }
    }

    #[must_use]
    pub fn api_config(&self) -> StreamApiConfig {
        StreamApiConfig::new(&self.base_url)
            .with_query_path(&self.query_path)
            .with_interrupt_path(&self.interrupt_path)
            .with_user_agent(concat!("agent_terminal/", env!("CARGO_PKG_VERSION")))
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
