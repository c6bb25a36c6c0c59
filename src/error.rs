//! Error kinds returned by every public operation.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to a [`crate::Database`] or
/// [`crate::Transaction`].
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying storage failed a positioned read, write or size query.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file tail does not carry a valid footer (bad signature, or a
    /// `transaction_size` that overruns the footer offset).
    #[error("database file is corrupted: {0}")]
    Corrupted(&'static str),

    /// The operation requires a non-empty database or transaction.
    #[error("database or transaction is empty")]
    Empty,

    /// The key was not present, or a cursor has moved past either end.
    #[error("key not found")]
    NotFound,

    /// The arena's (or write buffer's) configured byte budget was exceeded.
    #[error("out of memory: budget exceeded")]
    OutOfMemory,

    /// An operation other than `begin` was called on a transaction that has
    /// not been started (or has already been committed/rolled back).
    #[error("transaction not started")]
    NotStarted,

    /// `commit` detected that the file was changed by another transaction
    /// since `begin` (file size changed, or `transaction_id` did not advance
    /// by exactly one).
    #[error("database modified by another transaction since begin")]
    Modified,

    /// Reserved for a future host-provided locking layer. Never constructed
    /// by this crate today.
    #[error("database is locked")]
    Locked,
}
