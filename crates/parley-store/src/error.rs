use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored timestamp is outside the representable range.
    #[error("Invalid timestamp: {0} us")]
    InvalidTimestamp(i64),

    /// A mutex guarding the connection or subscriber table was poisoned.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// A blocking database task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// The live subscription was cancelled or its store went away.
    #[error("Live subscription closed")]
    SubscriptionClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
