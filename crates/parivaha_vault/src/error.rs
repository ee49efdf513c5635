//! Error types for the vault adapter.

use parivaha_sync_engine::AdapterError;
use std::io;
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur reading or writing a vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Front matter could not be parsed or rendered.
    #[error("front matter error: {0}")]
    FrontMatter(String),

    /// Note path escapes the vault or is not a markdown file.
    #[error("invalid note path: {0}")]
    InvalidPath(String),

    /// Vault root is missing or not a directory.
    #[error("vault not found: {0}")]
    NotFound(String),

    /// Directory traversal failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl VaultError {
    /// Returns true if the operation may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        let kind = match self {
            VaultError::Io(e) => e.kind(),
            VaultError::Walk(e) => match e.io_error() {
                Some(e) => e.kind(),
                None => return false,
            },
            _ => return false,
        };
        matches!(
            kind,
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        )
    }
}

impl From<VaultError> for AdapterError {
    fn from(err: VaultError) -> Self {
        match &err {
            VaultError::FrontMatter(_) | VaultError::InvalidPath(_) => {
                AdapterError::Invalid(err.to_string())
            }
            _ if err.is_retryable() => AdapterError::transient(err.to_string()),
            _ => AdapterError::fatal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_io_is_transient() {
        let err = VaultError::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr"));
        assert!(err.is_retryable());
        assert!(AdapterError::from(err).is_retryable());
    }

    #[test]
    fn permission_denied_is_fatal() {
        let err = VaultError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "ro"));
        let adapter: AdapterError = err.into();
        assert!(!adapter.is_retryable());
        assert!(matches!(adapter, AdapterError::Io { .. }));
    }

    #[test]
    fn bad_front_matter_is_invalid() {
        let err: AdapterError = VaultError::FrontMatter("tab in indent".into()).into();
        assert!(matches!(err, AdapterError::Invalid(msg) if msg.contains("tab in indent")));
    }
}
