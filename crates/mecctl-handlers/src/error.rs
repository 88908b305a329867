use thiserror::Error;

/// Error taxonomy for inbound message handling (§7). Unknown-entity and store
/// failures are handled (logged, dropped) inside the orchestrator, which owns the
/// store; this crate only ever sees a parse failure or a dead dispatcher.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed payload on {topic}: {source}")]
    MalformedPayload { topic: String, #[source] source: serde_json::Error },
    #[error("dispatcher unavailable")]
    OrchestratorShutDown,
}

impl From<mecctl_orchestrator::OrchestratorError> for HandlerError {
    fn from(_: mecctl_orchestrator::OrchestratorError) -> Self {
        HandlerError::OrchestratorShutDown
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;
