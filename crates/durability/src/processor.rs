//! Entry processors and TLog validators.
//!
//! `EntryProcessor` is the sink readers feed entries into (see
//! `TLogReader::for_each`). Processors that only care about some entry
//! kinds implement `EntryVisitor` instead and forward through `dispatch`.
//!
//! Validators:
//! - `ScoCrcValidator`: every SCO is closed by a SCO CRC before the next
//!   SCO starts, and no SCO CRC appears without a SCO
//! - `TLogCrcValidator`: every TLog CRC entry matches the checksum of the
//!   entries before it
//!
//! `CombinedProcessor` runs two processors over one pass.

use crate::error::TLogError;
use crate::reader::TLogReader;
use tracing::error;
use voltlog_core::{CheckSum, ClusterLocation, Entry, LocationEntry};

/// Consumer of a sequence of entries.
pub trait EntryProcessor {
    /// Handle one entry.
    fn process_entry(&mut self, entry: &Entry) -> Result<(), TLogError>;
}

/// Per-kind entry hooks; every hook defaults to doing nothing.
pub trait EntryVisitor {
    /// A location entry.
    fn on_location(&mut self, _entry: &LocationEntry) -> Result<(), TLogError> {
        Ok(())
    }

    /// A TLog CRC entry.
    fn on_tlog_crc(&mut self, _crc: u32) -> Result<(), TLogError> {
        Ok(())
    }

    /// A SCO CRC entry.
    fn on_sco_crc(&mut self, _crc: u32) -> Result<(), TLogError> {
        Ok(())
    }

    /// A sync marker.
    fn on_sync(&mut self) -> Result<(), TLogError> {
        Ok(())
    }
}

/// Call the hook of `visitor` matching the kind of `entry`.
pub fn dispatch<V: EntryVisitor + ?Sized>(visitor: &mut V, entry: &Entry) -> Result<(), TLogError> {
    match entry {
        Entry::Location(loc) => visitor.on_location(loc),
        Entry::TLogCrc(crc) => visitor.on_tlog_crc(*crc),
        Entry::ScoCrc(crc) => visitor.on_sco_crc(*crc),
        Entry::Sync => visitor.on_sync(),
    }
}

impl<F> EntryProcessor for F
where
    F: FnMut(&Entry) -> Result<(), TLogError>,
{
    fn process_entry(&mut self, entry: &Entry) -> Result<(), TLogError> {
        self(entry)
    }
}

/// Remembers the location of the last location entry.
#[derive(Debug, Default)]
pub struct ClusterLocationTracker {
    current: ClusterLocation,
}

impl ClusterLocationTracker {
    /// Tracker that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last location seen; null if none.
    pub fn cluster_location(&self) -> ClusterLocation {
        self.current
    }
}

impl EntryVisitor for ClusterLocationTracker {
    fn on_location(&mut self, entry: &LocationEntry) -> Result<(), TLogError> {
        self.current = entry.location();
        Ok(())
    }
}

impl EntryProcessor for ClusterLocationTracker {
    fn process_entry(&mut self, entry: &Entry) -> Result<(), TLogError> {
        dispatch(self, entry)
    }
}

/// Checks that SCOs are closed with a SCO CRC before the next one starts.
#[derive(Debug)]
pub struct ScoCrcValidator {
    tracker: ClusterLocationTracker,
    seen_sco_crc: bool,
}

impl ScoCrcValidator {
    /// Validator that has seen nothing yet.
    pub fn new() -> Self {
        ScoCrcValidator {
            tracker: ClusterLocationTracker::new(),
            seen_sco_crc: true,
        }
    }

    /// Last location seen; null if none.
    pub fn cluster_location(&self) -> ClusterLocation {
        self.tracker.cluster_location()
    }
}

impl Default for ScoCrcValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryVisitor for ScoCrcValidator {
    fn on_location(&mut self, entry: &LocationEntry) -> Result<(), TLogError> {
        let current = self.tracker.cluster_location();
        let next = entry.location();
        if !current.is_null() && current.sco() != next.sco() && !self.seen_sco_crc {
            error!(
                previous = %current.sco(),
                next = %next.sco(),
                "new SCO started without SCO CRC for the previous one"
            );
            return Err(TLogError::ScoSwitchWithoutScoCrc {
                previous: current.sco(),
                next: next.sco(),
            });
        }
        self.seen_sco_crc = false;
        self.tracker.on_location(entry)
    }

    fn on_sco_crc(&mut self, _crc: u32) -> Result<(), TLogError> {
        if self.tracker.cluster_location().is_null() {
            error!("SCO CRC without active SCO");
            return Err(TLogError::ScoCrcWithoutActiveSco);
        }
        self.seen_sco_crc = true;
        Ok(())
    }
}

impl EntryProcessor for ScoCrcValidator {
    fn process_entry(&mut self, entry: &Entry) -> Result<(), TLogError> {
        dispatch(self, entry)
    }
}

/// Checks TLog CRC entries against the checksum of the entries before them.
///
/// The checksum restarts after each TLog CRC entry, so a concatenation of
/// TLogs validates as well as a single one.
#[derive(Debug, Default)]
pub struct TLogCrcValidator {
    checksum: CheckSum,
    entries: u64,
    last_was_tlog_crc: bool,
}

impl TLogCrcValidator {
    /// Validator that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries processed.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Whether the last entry processed was a TLog CRC.
    pub fn last_was_tlog_crc(&self) -> bool {
        self.last_was_tlog_crc
    }
}

impl EntryVisitor for TLogCrcValidator {
    fn on_tlog_crc(&mut self, crc: u32) -> Result<(), TLogError> {
        let actual = self.checksum.value();
        if crc != actual {
            error!(expected = crc, actual, "computed TLog checksum does not match TLog CRC entry");
            return Err(TLogError::TLogWrongCrc {
                expected: crc,
                actual,
            });
        }
        Ok(())
    }
}

impl EntryProcessor for TLogCrcValidator {
    fn process_entry(&mut self, entry: &Entry) -> Result<(), TLogError> {
        dispatch(self, entry)?;
        self.entries += 1;
        self.last_was_tlog_crc = matches!(entry, Entry::TLogCrc(_));
        if self.last_was_tlog_crc {
            self.checksum.reset();
        } else {
            self.checksum.update(&entry.encode());
        }
        Ok(())
    }
}

/// Feeds each entry to two processors in turn.
pub struct CombinedProcessor<'a, A: ?Sized, B: ?Sized> {
    first: &'a mut A,
    second: &'a mut B,
}

impl<'a, A, B> CombinedProcessor<'a, A, B>
where
    A: EntryProcessor + ?Sized,
    B: EntryProcessor + ?Sized,
{
    /// Combine two processors.
    pub fn new(first: &'a mut A, second: &'a mut B) -> Self {
        CombinedProcessor { first, second }
    }
}

impl<A, B> EntryProcessor for CombinedProcessor<'_, A, B>
where
    A: EntryProcessor + ?Sized,
    B: EntryProcessor + ?Sized,
{
    fn process_entry(&mut self, entry: &Entry) -> Result<(), TLogError> {
        self.first.process_entry(entry)?;
        self.second.process_entry(entry)
    }
}

/// Outcome of `verify_tlog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TLogVerification {
    /// Entries read
    pub entries: u64,
    /// Whether the last entry was a TLog CRC
    pub closed: bool,
}

/// Run both validators over everything `reader` has left.
pub fn verify_tlog<R: TLogReader + ?Sized>(reader: &mut R) -> Result<TLogVerification, TLogError> {
    let mut sco = ScoCrcValidator::new();
    let mut tlog = TLogCrcValidator::new();
    {
        let mut both = CombinedProcessor::new(&mut sco, &mut tlog);
        reader.for_each(&mut both)?;
    }
    Ok(TLogVerification {
        entries: tlog.entries(),
        closed: tlog.last_was_tlog_crc(),
    })
}
