//! Error types for TLog I/O
//!
//! `BackendError` is what an object store reports; `TLogError` is what the
//! readers, writer and validators report, wrapping backend and entry
//! decoding failures with the file and offset they happened at.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use voltlog_core::{EntryError, Sco};

/// Errors reported by a `Backend`.
///
/// Every variant carries the object name and namespace so a failure can be
/// traced back to the object it concerned.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Object does not exist
    #[error("Object {name} not found in namespace {namespace}")]
    ObjectNotFound {
        /// Object name
        name: String,
        /// Namespace
        namespace: String,
    },

    /// Object already exists and overwriting was not allowed
    #[error("Object {name} already exists in namespace {namespace}")]
    ObjectExists {
        /// Object name
        name: String,
        /// Namespace
        namespace: String,
    },

    /// Uploaded data does not match the checksum the caller supplied
    #[error("Checksum mismatch for {name} in namespace {namespace}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Object name
        name: String,
        /// Namespace
        namespace: String,
        /// Checksum supplied by the caller
        expected: u32,
        /// Checksum of the data
        actual: u32,
    },

    /// I/O failure talking to the store
    #[error("I/O error on {name} in namespace {namespace}: {source}")]
    Io {
        /// Object name
        name: String,
        /// Namespace
        namespace: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Errors reading, writing or validating TLogs.
#[derive(Debug, Error)]
pub enum TLogError {
    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entry could not be decoded
    #[error("Invalid entry in {} at byte offset {offset}: {source}", path.display())]
    InvalidEntry {
        /// File holding the entry
        path: PathBuf,
        /// Byte offset of the entry
        offset: u64,
        /// Decoding failure
        #[source]
        source: EntryError,
    },

    /// A file that is being resumed does not hold whole entries
    #[error("File {} is {size} bytes, not a multiple of the entry size", path.display())]
    MisalignedFile {
        /// File being resumed
        path: PathBuf,
        /// Its size in bytes
        size: u64,
    },

    /// Address out of range or null location on append
    #[error("Invalid location entry: {reason}")]
    InvalidLocationEntry {
        /// What was wrong
        reason: String,
    },

    /// The TLog CRC entry disagrees with the checksum of the preceding entries
    #[error("TLog has wrong CRC: entry says {expected:#010x}, computed {actual:#010x}")]
    TLogWrongCrc {
        /// Checksum stored in the entry
        expected: u32,
        /// Checksum computed while reading
        actual: u32,
    },

    /// A new SCO started before the previous one was closed with a SCO CRC
    #[error("New SCO {next} started without SCO CRC for {previous}")]
    ScoSwitchWithoutScoCrc {
        /// SCO that was not closed
        previous: Sco,
        /// SCO that started
        next: Sco,
    },

    /// A SCO CRC entry appeared before any location entry
    #[error("SCO CRC without active SCO")]
    ScoCrcWithoutActiveSco,

    /// Backend operation failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Append after close
    #[error("TLog writer for {} is closed", path.display())]
    WriterClosed {
        /// File of the closed writer
        path: PathBuf,
    },

    /// The background reader generator failed
    #[error("Reader generator failed: {0}")]
    Generator(String),
}

impl BackendError {
    /// Name of the object the error concerns.
    pub fn object_name(&self) -> &str {
        match self {
            BackendError::ObjectNotFound { name, .. }
            | BackendError::ObjectExists { name, .. }
            | BackendError::ChecksumMismatch { name, .. }
            | BackendError::Io { name, .. } => name,
        }
    }

    /// Namespace of the object the error concerns.
    pub fn namespace(&self) -> &str {
        match self {
            BackendError::ObjectNotFound { namespace, .. }
            | BackendError::ObjectExists { namespace, .. }
            | BackendError::ChecksumMismatch { namespace, .. }
            | BackendError::Io { namespace, .. } => namespace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_context() {
        let err = BackendError::ObjectNotFound {
            name: "tlog_x".to_string(),
            namespace: "vol1".to_string(),
        };
        assert_eq!(err.object_name(), "tlog_x");
        assert_eq!(err.namespace(), "vol1");
        let msg = err.to_string();
        assert!(msg.contains("tlog_x"));
        assert!(msg.contains("vol1"));
    }

    #[test]
    fn test_wrong_crc_display() {
        let err = TLogError::TLogWrongCrc {
            expected: 1,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x00000001"));
        assert!(msg.contains("0x00000002"));
    }

    #[test]
    fn test_backend_error_converts() {
        let err: TLogError = BackendError::ObjectExists {
            name: "a".to_string(),
            namespace: "b".to_string(),
        }
        .into();
        assert!(matches!(err, TLogError::Backend(BackendError::ObjectExists { .. })));
    }
}
