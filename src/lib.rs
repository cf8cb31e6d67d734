//! voltlog - transaction logs and offline scrubbing for block-storage volumes
//!
//! A volume records every cluster write as an entry in a TLog, mapping the
//! cluster's address to its location in a SCO (an append-only data
//! container on an object store). Over time most entries are superseded;
//! scrubbing rewrites a run of TLogs so they only hold live mappings and
//! compacts sparsely used SCOs.
//!
//! # Quick Start
//!
//! ```ignore
//! use voltlog::{LocalBackend, ScoAccessData, Scrubber, ScrubberConfig};
//!
//! let backend = LocalBackend::new("/srv/store", "volume-1")?;
//! let scrubber = Scrubber::new(ScrubberConfig::new("/tmp/scrub"), Box::new(backend))?;
//! let result = scrubber.run(&tlog_ids, &ScoAccessData::new())?;
//! ```
//!
//! # Architecture
//!
//! - `voltlog_core`: entry codec, SCO and TLog types
//! - `voltlog_durability`: backend, readers, writer, validators
//! - `voltlog_scrub`: the scrub pipeline and job

pub use voltlog_core;
pub use voltlog_durability;
pub use voltlog_scrub;

pub use voltlog_core::{
    CheckSum, ClusterAddress, ClusterLocation, ClusterLocationAndHash, Entry, LocationEntry, Sco,
    TLog, TLogId, TLogs, Weed,
};
pub use voltlog_durability::{
    Backend, BackwardReader, CombinedReader, FilePool, ForwardReader, LocalBackend, TLogConfig,
    TLogError, TLogReader, TLogWriter,
};
pub use voltlog_scrub::{ScoAccessData, ScrubError, ScrubResult, Scrubber, ScrubberConfig};
