//! Error types for the TLog data model
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//! Parsing errors for SCO names live next to the types in `types.rs`.

use crate::tlog::TLogId;
use thiserror::Error;

/// Errors decoding a 32-byte entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// Bit pattern matches none of the entry variants
    #[error("Invalid entry: {reason}")]
    InvalidEntry {
        /// What was wrong with the bytes
        reason: String,
    },

    /// Buffer is not exactly one entry long
    #[error("Invalid entry length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Entry size
        expected: usize,
        /// Bytes provided
        actual: usize,
    },
}

/// Errors mutating a `TLogs` sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TLogsError {
    /// The prefix the caller expected no longer matches the sequence
    #[error("TLog sequence changed concurrently: expected {expected:?}")]
    StalePrefix {
        /// Ids the caller expected to be replaced
        expected: Vec<TLogId>,
    },

    /// A replacement must contain at least one TLog
    #[error("Refusing to replace TLogs with an empty set")]
    EmptyReplacement,

    /// Marking this TLog written would leave an unwritten one before it
    #[error("TLog {id} cannot be marked written: predecessor {predecessor} is not written")]
    UnwrittenPredecessor {
        /// TLog being marked
        id: TLogId,
        /// Earlier TLog still unwritten
        predecessor: TLogId,
    },

    /// The cork TLog was expected on the backend but is not
    #[error("Cork TLog {0} is not on the backend")]
    CorkNotOnBackend(TLogId),
}
