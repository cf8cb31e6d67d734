//! TLog readers
//!
//! All readers hand out entries one at a time through `TLogReader`:
//! - `ForwardReader`: oldest entry first, keeps a running checksum
//! - `BackwardReader`: newest entry first
//! - `CombinedReader`: one continuous sequence over several TLogs, with
//!   the per-TLog readers supplied by a generator (optionally prefetched on
//!   a background thread)
//!
//! A reader opens a TLog from a local directory, fetching it from the
//! backend into a temporary file first when it is not present locally.

mod backward;
mod combined;
mod file;
mod forward;
mod generator;

pub use backward::BackwardReader;
pub use combined::CombinedReader;
pub use forward::ForwardReader;
pub use generator::{
    BoxedReader, DelayedGenerator, Direction, PrefetchGenerator, ReaderResult, ThreadedGenerator,
    TLogReaderGenerator,
};

use crate::error::TLogError;
use crate::processor::EntryProcessor;
use std::collections::HashMap;
use voltlog_core::{Entry, LocationEntry, Sco};

/// Sequential access to TLog entries.
pub trait TLogReader: Send {
    /// Next entry of any kind, `None` once exhausted.
    fn next_any(&mut self) -> Result<Option<Entry>, TLogError>;

    /// Next location entry, skipping CRC and sync entries.
    fn next_location(&mut self) -> Result<Option<LocationEntry>, TLogError> {
        while let Some(entry) = self.next_any()? {
            if let Entry::Location(loc) = entry {
                return Ok(Some(loc));
            }
        }
        Ok(None)
    }

    /// SCOs referenced by the remaining entries, in order of appearance.
    ///
    /// Consecutive runs of the same SCO are reported once.
    fn sco_names(&mut self) -> Result<Vec<Sco>, TLogError> {
        let mut names: Vec<Sco> = Vec::new();
        while let Some(loc) = self.next_location()? {
            let sco = loc.location().sco();
            if names.last() != Some(&sco) {
                names.push(sco);
            }
        }
        Ok(names)
    }

    /// SCO CRC recorded for each SCO in the remaining entries.
    ///
    /// A SCO CRC entry belongs to the SCO of the location entry before it.
    fn sco_checksums(&mut self) -> Result<HashMap<Sco, u32>, TLogError> {
        let mut checksums = HashMap::new();
        let mut current: Option<Sco> = None;
        while let Some(entry) = self.next_any()? {
            match entry {
                Entry::Location(loc) => current = Some(loc.location().sco()),
                Entry::ScoCrc(crc) => {
                    if let Some(sco) = current {
                        checksums.insert(sco, crc);
                    }
                }
                Entry::TLogCrc(_) | Entry::Sync => {}
            }
        }
        Ok(checksums)
    }

    /// Feed every remaining entry to `processor`.
    fn for_each(&mut self, processor: &mut dyn EntryProcessor) -> Result<(), TLogError> {
        while let Some(entry) = self.next_any()? {
            processor.process_entry(&entry)?;
        }
        Ok(())
    }
}

impl<R: TLogReader + ?Sized> TLogReader for Box<R> {
    fn next_any(&mut self) -> Result<Option<Entry>, TLogError> {
        (**self).next_any()
    }
}
