//! K-way TLog merger
//!
//! Merges location entries from several readers into one TLog ordered by
//! cluster location (SCO number, then offset). Each input must itself be
//! in that order; region sub-logs read oldest entry first are, because a
//! volume fills SCOs in increasing number and offset.
//!
//! ```text
//!   reader 0 ──┐
//!   reader 1 ──┼──► min-heap of heads ──► TLogWriter
//!   reader 2 ──┘     (location, reader)
//! ```

use crate::error::Result;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;
use tracing::{debug, info};
use voltlog_core::{ClusterLocation, LocationEntry};
use voltlog_durability::{
    BackwardReader, BoxedReader, ForwardReader, TLogConfig, TLogReader, TLogWriter,
};

/// What a merge wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutput {
    /// Checksum of the output file, closing TLog CRC included
    pub checksum: u32,
    /// Location of the last entry written; null if nothing was
    pub last_location: ClusterLocation,
    /// Location entries written
    pub entries: u64,
}

/// Merges the location entries of several readers.
#[derive(Default)]
pub struct Merger {
    readers: Vec<BoxedReader>,
}

impl Merger {
    /// Merger without inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merger over `paths`, each read newest entry first.
    pub fn backward<P: AsRef<Path>>(paths: &[P], config: &TLogConfig) -> Result<Self> {
        let mut merger = Merger::new();
        for path in paths {
            let reader = BackwardReader::open(path.as_ref())?
                .with_buffer_entries(config.read_buffer_entries);
            merger.add_reader(Box::new(reader));
        }
        Ok(merger)
    }

    /// Merger over `paths`, each read oldest entry first.
    pub fn forward<P: AsRef<Path>>(paths: &[P], config: &TLogConfig) -> Result<Self> {
        let mut merger = Merger::new();
        for path in paths {
            let reader = ForwardReader::open(path.as_ref())?
                .with_buffer_entries(config.read_buffer_entries);
            merger.add_reader(Box::new(reader));
        }
        Ok(merger)
    }

    /// Add an input.
    pub fn add_reader(&mut self, reader: BoxedReader) {
        self.readers.push(reader);
    }

    /// Number of inputs
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Whether there are no inputs
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Merge all inputs into a new TLog at `output` and close it.
    pub fn merge(mut self, output: &Path, config: &TLogConfig) -> Result<MergeOutput> {
        info!(
            target: "voltlog::scrub",
            inputs = self.readers.len(),
            output = %output.display(),
            "merging TLogs"
        );

        let mut writer = TLogWriter::with_config(output, config)?;
        let mut heads: Vec<Option<LocationEntry>> = Vec::with_capacity(self.readers.len());
        let mut heap = BinaryHeap::with_capacity(self.readers.len());

        for (index, reader) in self.readers.iter_mut().enumerate() {
            let head = reader.next_location()?;
            if let Some(entry) = &head {
                heap.push(Reverse((entry.location(), index)));
            }
            heads.push(head);
        }

        let mut entries = 0u64;
        while let Some(Reverse((_, index))) = heap.pop() {
            if let Some(entry) = heads[index].take() {
                writer.append_location(entry.address, entry.location_and_hash)?;
                entries += 1;
            }
            let next = self.readers[index].next_location()?;
            if let Some(entry) = &next {
                heap.push(Reverse((entry.location(), index)));
            } else {
                debug!(target: "voltlog::scrub", input = index, "merge input exhausted");
            }
            heads[index] = next;
        }

        let last_location = writer.last_cluster_location();
        let checksum = writer.close()?;

        info!(
            target: "voltlog::scrub",
            entries,
            last_location = %last_location,
            "merged TLogs"
        );
        Ok(MergeOutput {
            checksum,
            last_location,
            entries,
        })
    }
}
