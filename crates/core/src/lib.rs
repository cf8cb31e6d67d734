//! Core types for volume transaction logs
//!
//! This crate defines the data model shared by the readers, writers and the
//! scrubbing pipeline:
//! - Sco / ClusterLocation / Weed: where cluster data lives
//! - Entry: the 32-byte TLog entry codec
//! - CheckSum: running CRC32 over TLogs and SCOs
//! - TLog / TLogs: a volume's ordered write history
//! - Error: EntryError, TLogsError, ParseError

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod entry;
pub mod error;
pub mod tlog;
pub mod types;

pub use checksum::CheckSum;
pub use entry::{Entry, EntryType, LocationEntry, ENTRY_SIZE, SCO_CRC_DISCRIMINANT, TLOG_CRC_DISCRIMINANT};
pub use error::{EntryError, TLogsError};
pub use tlog::{TLog, TLogId, TLogs, TLOG_NAME_PREFIX};
pub use types::{
    ClusterAddress, ClusterLocation, ClusterLocationAndHash, ParseError, Sco, ScoCloneId,
    ScoNumber, ScoOffset, ScoVersion, Weed, CLUSTER_LOCATION_STRING_LEN, MAX_CLUSTER_ADDRESS,
    SCO_NAME_LEN, WEED_SIZE,
};
