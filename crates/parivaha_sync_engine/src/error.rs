//! Error types for the sync engine.

use crate::adapter::AdapterError;
use crate::mapping::MappingError;
use parivaha_model::{ModelError, PairKey};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A record could not be mapped to the other side.
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Adapter read or write failed.
    #[error("adapter I/O error: {0}")]
    AdapterIo(#[from] AdapterError),

    /// A conflict could not be resolved automatically.
    #[error("unresolvable conflict for {key}: {reason}")]
    ConflictUnresolvable {
        /// Affected pair.
        key: PairKey,
        /// Why no winner could be chosen.
        reason: String,
    },

    /// The persisted snapshot is unreadable.
    #[error("snapshot corruption: {0}")]
    SnapshotCorruption(String),

    /// Another pass holds the single-writer lock.
    #[error("a sync pass is already in progress")]
    PassInProgress,

    /// The pass was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No pair contains the given record.
    #[error("record is not paired: {0}")]
    NotPaired(String),

    /// Snapshot store I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::AdapterIo(e) => e.is_retryable(),
            SyncError::PassInProgress => true,
            _ => false,
        }
    }
}

impl From<ModelError> for SyncError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::SnapshotCorruption { message } => SyncError::SnapshotCorruption(message),
            other => SyncError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::from(AdapterError::transient("timeout")).is_retryable());
        assert!(!SyncError::from(AdapterError::fatal("forbidden")).is_retryable());
        assert!(SyncError::PassInProgress.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::SnapshotCorruption("bad".into()).is_retryable());
    }

    #[test]
    fn model_corruption_maps_to_snapshot_corruption() {
        let err: SyncError = ModelError::corruption("checksum mismatch").into();
        assert!(matches!(err, SyncError::SnapshotCorruption(ref m) if m == "checksum mismatch"));
    }

    #[test]
    fn error_display() {
        let err = SyncError::ConflictUnresolvable {
            key: PairKey::new("n1", "a.md"),
            reason: "missing timestamps".into(),
        };
        assert!(err.to_string().contains("n1 <-> a.md"));
        assert!(err.to_string().contains("missing timestamps"));
    }
}
