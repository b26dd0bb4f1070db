//! Error types

use thiserror::Error;

use crate::store::StoreError;

/// Failure of a relay use case
#[derive(Debug, Error)]
pub enum RelayError {
    /// The referenced thread does not exist
    #[error("Thread not found: {0}")]
    NotFound(String),

    /// The referenced thread no longer accepts messages
    #[error("Thread is finalized: {0}")]
    Conflict(String),

    /// Request input is malformed or empty
    #[error("{0}")]
    Validation(String),

    /// The generation source failed before or during the run
    #[error("Generation failed: {0}")]
    UpstreamGeneration(#[from] GenerationError),

    /// The conversation store failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ThreadNotFound(id) | StoreError::MessageNotFound(id) => Self::NotFound(id),
            StoreError::ThreadArchived(id) => Self::Conflict(id),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Failure of a generation source
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The request could not be sent
    #[error("request failed: {0}")]
    Request(String),

    /// The upstream service rejected the request
    #[error("upstream returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The token stream broke mid-way
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// A chunk could not be decoded
    #[error("malformed chunk: {0}")]
    Decode(String),

    /// The run was abandoned before the source finished
    #[error("generation cancelled")]
    Cancelled,
}

/// Failure to write a frame to one subscriber's transport
///
/// Always contained to that subscriber.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving side is gone
    #[error("subscriber transport closed")]
    Closed,

    /// The write failed
    #[error("subscriber transport error: {0}")]
    Transport(String),
}
