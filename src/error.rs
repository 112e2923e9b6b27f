use thiserror::Error;
use turn_model::RunId;

/// Caller-visible misuse of the engine API. Frame handling never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("run {run_id} is still streaming; interrupt it or wait for it to finish")]
    RunAlreadyActive { run_id: RunId },

    #[error("no run is active")]
    NoActiveRun,

    #[error("prompt is empty")]
    EmptyPrompt,
}
