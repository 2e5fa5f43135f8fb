//! Error types for synchronization operations.

/// Failures surfaced by the sync engine and its collaborators.
///
/// Every variant carries owned text so a single failure of a coalesced
/// operation (shared read or shared upload) can be cloned to all waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Malformed input, e.g. a file reference without a path. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested entity does not exist in the store.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Network or store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Uploading an inline payload failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
