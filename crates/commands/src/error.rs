use thiserror::Error;

use reify_core::InteractionId;

/// Illegal lifecycle transition on a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandStateError {
    #[error("command {0} has already completed")]
    AlreadyCompleted(InteractionId),
}

/// Descriptor (de)serialization failure.
#[derive(Debug, Error)]
pub enum DtoError {
    #[error("malformed command descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported command descriptor version {found} (expected major {expected})")]
    UnsupportedVersion { found: String, expected: String },
}
