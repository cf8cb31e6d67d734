//! Per-region metadata scrubbing
//!
//! A region's sub-log is read newest entry first. The first entry seen
//! for an address is its latest write and is kept; every later (that is,
//! older) entry for the same address is superseded and dropped. Kept
//! entries are written to a new sub-log in the order they are read, so
//! reading that sub-log backwards yields them oldest first again.
//!
//! Every dropped entry takes one use away from its SCO's usage row, which
//! leaves each row counting the live clusters of its SCO.

use crate::error::{Result, ScrubError};
use crate::scrubbing_data::{RegionCursor, ScrubbingScoTable};
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use voltlog_core::ClusterAddress;
use voltlog_durability::{BackwardReader, FilePool, TLogConfig, TLogReader, TLogWriter};

/// Name of the scrubbed sub-log for `region`.
pub fn scrubbed_region_tlog_name(region: u64) -> String {
    format!("scrubbed_tlog_for_region_{}", region)
}

/// One bit per address of a region.
struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    fn new(bits: u64) -> Self {
        Bitset {
            words: vec![0; ((bits + 63) / 64) as usize],
        }
    }

    /// Set `bit`, returning whether it was already set.
    fn test_and_set(&mut self, bit: u64) -> bool {
        let word = &mut self.words[(bit / 64) as usize];
        let mask = 1u64 << (bit % 64);
        let was_set = *word & mask != 0;
        *word |= mask;
        was_set
    }
}

/// Drops superseded entries from one region's sub-log.
pub struct PartScrubber<'a> {
    pool: &'a FilePool,
    region: u64,
    region_size_exponent: u8,
    config: &'a TLogConfig,
}

/// Counts of a region scrub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartScrubStats {
    /// Entries kept
    pub kept: u64,
    /// Superseded entries dropped
    pub dropped: u64,
}

impl<'a> PartScrubber<'a> {
    /// Scrubber for `region`.
    pub fn new(
        pool: &'a FilePool,
        region: u64,
        region_size_exponent: u8,
        config: &'a TLogConfig,
    ) -> Self {
        PartScrubber {
            pool,
            region,
            region_size_exponent,
            config,
        }
    }

    /// First address of the region.
    pub fn base(&self) -> ClusterAddress {
        self.region << self.region_size_exponent
    }

    /// Addresses in the region.
    pub fn extent(&self) -> u64 {
        1u64 << self.region_size_exponent
    }

    /// Scrub the sub-log at `input`, updating usage rows in `table`.
    ///
    /// Returns the path of the scrubbed sub-log.
    pub fn scrub(&self, input: &Path, table: &mut ScrubbingScoTable) -> Result<(PathBuf, PartScrubStats)> {
        let mut reader = BackwardReader::open(input)?.with_buffer_entries(self.config.read_buffer_entries);
        let output = self.pool.new_file(&scrubbed_region_tlog_name(self.region))?;
        let mut writer = TLogWriter::with_config(&output, self.config)?;

        let base = self.base();
        let extent = self.extent();
        let mut seen = Bitset::new(extent);
        let mut cursor = RegionCursor::new(table);
        let mut stats = PartScrubStats::default();

        while let Some(entry) = reader.next_location()? {
            let offset = entry.address.wrapping_sub(base);
            if entry.address < base || offset >= extent {
                error!(
                    target: "voltlog::scrub",
                    region = self.region,
                    address = entry.address,
                    "address outside of region"
                );
                return Err(ScrubError::Inconsistent(format!(
                    "address {:#x} not in region {}",
                    entry.address, self.region
                )));
            }

            let sco = entry.location().sco();
            let index = cursor.seek(table, &sco)?;

            if seen.test_and_set(offset) {
                let row = table.row_mut(index);
                row.usage_count = row.usage_count.checked_sub(1).ok_or_else(|| {
                    error!(target: "voltlog::scrub", sco = %sco, "usage count underflow");
                    ScrubError::Inconsistent(format!("usage count of {} below zero", sco))
                })?;
                stats.dropped += 1;
            } else {
                writer.append_location(entry.address, entry.location_and_hash)?;
                stats.kept += 1;
            }
        }
        writer.close()?;

        debug!(
            target: "voltlog::scrub",
            region = self.region,
            kept = stats.kept,
            dropped = stats.dropped,
            "scrubbed region"
        );
        Ok((output, stats))
    }
}
