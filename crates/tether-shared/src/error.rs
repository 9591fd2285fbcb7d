use thiserror::Error;

use crate::status::State;

/// Returned when a status transition is not in the allowed table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: State,
    pub to: State,
}
