use tether_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
}

/// Failure reported by the outbound send capability. The text is recorded
/// on the outbox entry as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SendError(pub String);

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
