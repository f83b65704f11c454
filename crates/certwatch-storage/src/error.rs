/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use certwatch_storage::error::StorageError;
///
/// let err = StorageError::InvalidValue {
///     column: "last_notified_severity",
///     value: "critical".to_string(),
/// };
/// assert!(err.to_string().contains("last_notified_severity"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (the `facts_json` column).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Creating the data directory failed.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A column held a value that does not map back onto the model.
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidValue { column: &'static str, value: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
