//! Offline TLog scrubbing for voltlog
//!
//! A volume's TLogs keep every write ever made, and its SCOs keep the data
//! of overwritten clusters. Scrubbing drops superseded TLog entries and
//! compacts sparsely used SCOs into new ones:
//!
//! - Splitter: partitions TLog entries by address region and builds the
//!   SCO usage table
//! - PartScrubber: keeps only the latest write per address in a region
//! - Merger: merges region sub-logs back into SCO order
//! - Pool: keeps or relocates each SCO's live clusters and uploads new SCOs
//! - Cutters: split the results into uploaded TLogs
//! - Scrubber: runs the pipeline and publishes the `ScrubResult`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access_data;
pub mod config;
pub mod cutter;
pub mod error;
pub mod merger;
pub mod part_scrubber;
pub mod pool;
pub mod scrubber;
pub mod scrubbing_data;
pub mod splitter;

pub use access_data::ScoAccessData;
pub use config::{ScrubberConfig, ScrubberConfigError, MAX_REGION_SIZE_EXPONENT};
pub use cutter::{RelocationCutter, TLogCutter};
pub use error::ScrubError;
pub use merger::{MergeOutput, Merger};
pub use part_scrubber::{scrubbed_region_tlog_name, PartScrubStats, PartScrubber};
pub use pool::{
    make_new_sco_name, Pool, PoolOutput, MAX_SCO_NAME_PROBES, NONREWRITTEN_TLOG, RELOCATIONS_TLOG,
    REWRITTEN_TLOG,
};
pub use scrubber::{
    is_scrubbing_result_name, ScrubResult, Scrubber, COMPLETELY_SCRUBBED_TLOG,
    METADATA_SCRUBBED_TLOG, SCRUBBING_RESULT_PREFIX, SCRUB_RESULT_VERSION,
};
pub use scrubbing_data::{RegionCursor, ScoState, ScrubbingScoData, ScrubbingScoTable};
pub use splitter::{region_tlog_name, SplitOutput, Splitter};
