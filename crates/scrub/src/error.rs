//! Scrub job errors.

use crate::config::ScrubberConfigError;
use std::io;
use thiserror::Error;
use voltlog_core::{Sco, TLogsError};
use voltlog_durability::{BackendError, TLogError};

/// Errors during a scrub job.
///
/// Anything other than `Config` aborts the job; the job's intermediate
/// files stay in the scratch directory for inspection.
#[derive(Debug, Error)]
pub enum ScrubError {
    /// Reading or writing a TLog failed
    #[error("TLog error: {0}")]
    TLog(#[from] TLogError),

    /// Backend operation failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entry references a SCO the usage table does not know about
    #[error("Unknown SCO {0} in usage table")]
    UnknownSco(Sco),

    /// No free version left for a new SCO name
    #[error("Could not create a new SCO name for {0}")]
    ScoNameExhausted(Sco),

    /// An upload target already exists on the backend
    #[error("Object {0} unexpectedly exists on the backend")]
    AlreadyOnBackend(String),

    /// Usage table and TLog contents disagree
    #[error("Inconsistent scrub state: {0}")]
    Inconsistent(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ScrubberConfigError),

    /// Scrub result could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Applying the result to a TLog sequence failed
    #[error("TLog sequence error: {0}")]
    TLogs(#[from] TLogsError),
}

/// Result type alias for scrub operations
pub type Result<T> = std::result::Result<T, ScrubError>;
