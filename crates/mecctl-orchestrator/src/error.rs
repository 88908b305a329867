use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
