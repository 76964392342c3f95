//! Error types for RustLite.

use std::fmt;

/// The main error type for RustLite operations.
///
/// Every fallible operation across the workspace funnels into one of these
/// variants; `rustlite-wal` and `rustlite-storage` convert their local
/// errors into this type at the crate boundary rather than defining their
/// own taxonomy.
#[derive(Debug)]
pub enum Error {
    /// A lock was poisoned (internal error)
    LockPoisoned,

    /// I/O error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serialization(String),

    /// Caller passed a nonsensical argument: nil transaction, nil WAL,
    /// empty/oversized identifier, oversized payload.
    Argument(String),

    /// An operation was attempted in a state that forbids it: transaction
    /// not active, manager already closed, GC already/not running.
    State(String),

    /// Two transactions conflict: overlapping write sets, or a shadow page
    /// already owned by another transaction.
    Conflict(String),

    /// A WAL append or sync failed. The caller must treat the transaction
    /// as aborted; no version has been committed.
    Durability(String),

    /// On-disk data failed a magic/version/CRC/length check.
    Corruption(String),

    /// A cache file's `tx_id` does not match what the caller expected.
    Staleness {
        /// tx_id the caller expected to find.
        expected: u64,
        /// tx_id actually stored in the file.
        found: u64,
    },

    /// The requested item does not exist (version chain, shadow, snapshot).
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LockPoisoned => write!(f, "lock poisoned"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Error::Argument(msg) => write!(f, "invalid argument: {msg}"),
            Error::State(msg) => write!(f, "invalid state: {msg}"),
            Error::Conflict(msg) => write!(f, "conflict: {msg}"),
            Error::Durability(msg) => write!(f, "durability failure: {msg}"),
            Error::Corruption(msg) => write!(f, "corrupt data: {msg}"),
            Error::Staleness { expected, found } => {
                write!(f, "stale data: expected tx_id {expected}, found {found}")
            }
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::LockPoisoned
    }
}

/// A specialized `Result` type for RustLite operations.
pub type Result<T> = std::result::Result<T, Error>;
