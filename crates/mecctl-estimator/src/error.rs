use thiserror::Error;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("fewer than 2 RSSI samples for ({user}, {bs})")]
    InsufficientSamples { user: String, bs: String },
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
