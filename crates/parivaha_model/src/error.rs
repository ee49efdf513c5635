//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while encoding or decoding model types.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Persisted snapshot bytes are unreadable.
    #[error("snapshot corruption: {message}")]
    SnapshotCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Snapshot could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

impl ModelError {
    /// Creates a snapshot corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::SnapshotCorruption {
            message: message.into(),
        }
    }
}
