//! Error types for the Notion adapter.

use parivaha_model::RecordId;
use parivaha_sync_engine::AdapterError;
use thiserror::Error;

/// Result type for Notion operations.
pub type NotionResult<T> = Result<T, NotionError>;

/// Errors that can occur talking to Notion.
#[derive(Debug, Clone, Error)]
pub enum NotionError {
    /// The API answered with an error status.
    #[error("Notion API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Notion error code, e.g. `rate_limited`.
        code: String,
        /// Error message.
        message: String,
    },

    /// The request did not complete.
    #[error("transport error: {0}")]
    Transport(String),

    /// Page, block or database does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A field could not be encoded as its property.
    #[error("property {property}: {message}")]
    Property {
        /// Property name.
        property: String,
        /// What went wrong.
        message: String,
    },
}

impl NotionError {
    /// Creates a property error.
    pub fn property(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Property {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Returns true for rate limiting, server errors and transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotionError::Api { status, .. } => *status == 429 || *status >= 500,
            NotionError::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<NotionError> for AdapterError {
    fn from(err: NotionError) -> Self {
        match err {
            NotionError::NotFound(id) => AdapterError::NotFound(RecordId::new(id)),
            NotionError::Property { .. } => AdapterError::Invalid(err.to_string()),
            NotionError::Api { status: 400, .. } => AdapterError::Invalid(err.to_string()),
            _ if err.is_retryable() => AdapterError::transient(err.to_string()),
            _ => AdapterError::fatal(err.to_string()),
        }
    }
}
