//! Error types for wordbook-core.

use thiserror::Error;

/// Result type alias using ReviewError.
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Errors raised by the spaced-repetition state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("cannot {action} entry {id} with review count {count}")]
    InvalidTransition {
        action: &'static str,
        id: String,
        count: i32,
    },

    #[error("review ladder must start at 0 and be strictly increasing")]
    InvalidLadder,
}
