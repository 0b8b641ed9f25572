use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cloud backend unavailable")]
    CloudUnavailable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation '{operation}' held the write lock past the ceiling and was aborted")]
    LockTimeout { operation: String },

    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("Bulk overwrite failed ({reason}); previous state was restored from backup '{backup_key}'")]
    OverwriteRolledBack { backup_key: String, reason: String },

    #[error(
        "Bulk overwrite failed and automatic restore from backup '{backup_key}' also failed: \
         {reason}. The backup record is intact; restore it manually"
    )]
    RestoreFailed { backup_key: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// True for the one condition the engine cannot recover from on its
    /// own: a failed bulk overwrite whose automatic rollback also failed.
    /// Callers must surface these loudly, including the backup key.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::RestoreFailed { .. })
    }
}
