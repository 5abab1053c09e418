//! Shared error type for the event model itself (adapter/core/store errors
//! live closer to their own crates and wrap this one where relevant).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed event payload: {0}")]
    MalformedEvent(String),

    #[error("event sequence went backwards for session {session_id}: saw {got}, expected >= {expected}")]
    SequenceRegression {
        session_id: String,
        got: u64,
        expected: u64,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
