use async_trait::async_trait;
use types::{ExecutionBlockHash, ExecutionPayload};

/// The execution engine's verdict on a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadStatus {
    Valid {
        latest_valid_hash: Option<ExecutionBlockHash>,
    },
    Invalid {
        latest_valid_hash: Option<ExecutionBlockHash>,
        validation_error: Option<String>,
    },
    /// The engine is still syncing and cannot verify the payload yet.
    Syncing,
    /// The payload is well-formed but its ancestry has not been verified.
    Accepted,
    /// The engine responded with an error.
    ElError { message: String },
    /// The engine could not be reached.
    Unavailable,
}

/// The (remote) execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    async fn notify_new_payload(&self, payload: &ExecutionPayload) -> PayloadStatus;
}
