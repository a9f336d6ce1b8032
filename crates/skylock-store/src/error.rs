use thiserror::Error;

/// Failures of the lease store itself.
///
/// Every variant means "the store could not answer", never "someone else holds
/// the lease"; contention is reported through the outcome enums instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error (busy timeout, I/O, constraint).
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection could not be used (poisoned mutex, cancelled worker).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The requested hold does not fit the lease table's millisecond range.
    #[error("Hold of {secs}s exceeds the lease ceiling")]
    HoldOutOfRange { secs: u64 },

    /// The configured table name is not a plain SQL identifier.
    #[error("Invalid lease table name: {0:?}")]
    InvalidTable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
