//! Region splitter
//!
//! First stage of a scrub job. The input TLogs are read once, oldest entry
//! first, and every location entry is appended to the sub-log of its
//! address region (`address >> region_size_exponent`). Sub-logs are
//! created on first use, so only regions that were actually written get
//! one. At the same time the SCO usage table is built.

use crate::error::Result;
use crate::scrubbing_data::ScrubbingScoTable;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};
use voltlog_durability::{FilePool, TLogConfig, TLogReader, TLogWriter};

/// Region sub-logs and usage table produced by the splitter.
#[derive(Debug)]
pub struct SplitOutput {
    /// Sub-log path per region index, in region order
    pub regions: BTreeMap<u64, PathBuf>,
    /// Usage rows, oldest SCO first
    pub table: ScrubbingScoTable,
}

/// Name of the sub-log for `region`.
pub fn region_tlog_name(region: u64) -> String {
    format!("tlog_for_region_{}", region)
}

/// Splits a TLog stream into per-region sub-logs.
pub struct Splitter<'a> {
    pool: &'a FilePool,
    region_size_exponent: u8,
    config: &'a TLogConfig,
}

impl<'a> Splitter<'a> {
    /// Splitter writing sub-logs into `pool`.
    pub fn new(pool: &'a FilePool, region_size_exponent: u8, config: &'a TLogConfig) -> Self {
        Splitter {
            pool,
            region_size_exponent,
            config,
        }
    }

    /// Split every remaining entry of `reader`.
    ///
    /// Only location entries are carried over; CRC and sync entries have no
    /// meaning once entries are regrouped by region. Every sub-log is
    /// closed before returning, also when splitting fails half way.
    pub fn split<R: TLogReader + ?Sized>(&self, reader: &mut R) -> Result<SplitOutput> {
        info!(
            target: "voltlog::scrub",
            region_size_exponent = self.region_size_exponent,
            "splitting TLogs into regions"
        );

        let mut writers: BTreeMap<u64, TLogWriter> = BTreeMap::new();
        let mut table = ScrubbingScoTable::new();
        let mut entries = 0u64;

        let result = self.split_into(reader, &mut writers, &mut table, &mut entries);

        // close what was opened, keeping the first error
        let mut regions = BTreeMap::new();
        let mut close_result = Ok(());
        for (region, mut writer) in writers {
            if let Err(e) = writer.close() {
                if close_result.is_ok() {
                    close_result = Err(e);
                }
            }
            regions.insert(region, writer.path().to_path_buf());
        }
        result?;
        close_result?;

        info!(
            target: "voltlog::scrub",
            entries,
            regions = regions.len(),
            scos = table.len(),
            "split TLogs"
        );
        Ok(SplitOutput { regions, table })
    }

    fn split_into<R: TLogReader + ?Sized>(
        &self,
        reader: &mut R,
        writers: &mut BTreeMap<u64, TLogWriter>,
        table: &mut ScrubbingScoTable,
        entries: &mut u64,
    ) -> Result<()> {
        while let Some(entry) = reader.next_location()? {
            let region = entry.address >> self.region_size_exponent;
            let writer = match writers.entry(region) {
                std::collections::btree_map::Entry::Occupied(o) => o.into_mut(),
                std::collections::btree_map::Entry::Vacant(v) => {
                    let path = self.pool.new_file(&region_tlog_name(region))?;
                    debug!(target: "voltlog::scrub", region, path = %path.display(), "new region sub-log");
                    v.insert(TLogWriter::with_config(&path, self.config)?)
                }
            };
            writer.append_location(entry.address, entry.location_and_hash)?;
            table.record(entry.location().sco());
            *entries += 1;
        }
        Ok(())
    }
}
