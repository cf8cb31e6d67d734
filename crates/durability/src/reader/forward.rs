//! Reading a TLog oldest entry first.

use super::file::TLogFile;
use super::TLogReader;
use crate::backend::Backend;
use crate::config::TLogConfig;
use crate::error::TLogError;
use std::path::Path;
use voltlog_core::{CheckSum, Entry, ENTRY_SIZE};

/// Forward reader with a read-ahead buffer.
///
/// Every entry handed out is fed into a running checksum, so after reading
/// up to a TLog CRC entry the caller can compare the two.
pub struct ForwardReader {
    file: TLogFile,
    buffer: Vec<u8>,
    capacity: usize,
    // entries in `buffer` and position of the next one
    filled: usize,
    pos: usize,
    // index in the file of the first entry in `buffer`
    buffer_start: u64,
    checksum: CheckSum,
    entries_read: u64,
}

impl ForwardReader {
    /// Open a local TLog file.
    pub fn open(path: &Path) -> Result<Self, TLogError> {
        Ok(Self::from_file(TLogFile::open(path)?, &TLogConfig::default()))
    }

    /// Open `dir/name`, fetching it from `backend` if needed.
    pub fn open_in(
        dir: &Path,
        name: &str,
        backend: &dyn Backend,
        config: &TLogConfig,
    ) -> Result<Self, TLogError> {
        Ok(Self::from_file(TLogFile::open_in(dir, name, backend)?, config))
    }

    fn from_file(file: TLogFile, config: &TLogConfig) -> Self {
        let capacity = config.read_buffer_entries.max(1);
        ForwardReader {
            file,
            buffer: Vec::new(),
            capacity,
            filled: 0,
            pos: 0,
            buffer_start: 0,
            checksum: CheckSum::new(),
            entries_read: 0,
        }
    }

    /// Change the read-ahead buffer size (builder pattern).
    pub fn with_buffer_entries(mut self, entries: usize) -> Self {
        self.capacity = entries.max(1);
        self
    }

    /// Checksum over every entry read so far.
    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    /// Number of entries read so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Path of the file being read.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn refill(&mut self) -> Result<bool, TLogError> {
        let next = self.buffer_start + self.filled as u64;
        let remaining = self.file.entries() - next;
        if remaining == 0 {
            return Ok(false);
        }
        let count = remaining.min(self.capacity as u64) as usize;
        self.buffer.resize(count * ENTRY_SIZE, 0);
        self.file.read_at(next, &mut self.buffer)?;
        self.buffer_start = next;
        self.filled = count;
        self.pos = 0;
        Ok(true)
    }
}

impl TLogReader for ForwardReader {
    fn next_any(&mut self) -> Result<Option<Entry>, TLogError> {
        if self.pos == self.filled && !self.refill()? {
            return Ok(None);
        }
        let bytes = &self.buffer[self.pos * ENTRY_SIZE..(self.pos + 1) * ENTRY_SIZE];
        let entry = self.file.decode(self.buffer_start + self.pos as u64, bytes)?;
        self.checksum.update(bytes);
        self.pos += 1;
        self.entries_read += 1;
        Ok(Some(entry))
    }
}
