//! Error taxonomy shared by every mecctl crate (spec §7).

use thiserror::Error;

/// Errors raised while parsing or validating a message-bus payload.
///
/// Every variant here corresponds to one branch of the §7 error taxonomy that is
/// handled by logging and dropping the message — none of them should ever propagate
/// as a process-fatal error.
#[derive(Debug, Error)]
pub enum MecError {
    #[error("malformed payload on topic {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },

    #[error("unknown {kind} referenced: {id}")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("stale acknowledgement for user {user}: in-memory state already cleared")]
    StaleAcknowledgement { user: String },
}

pub type Result<T> = std::result::Result<T, MecError>;
