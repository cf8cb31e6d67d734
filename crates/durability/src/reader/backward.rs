//! Reading a TLog newest entry first.

use super::file::TLogFile;
use super::TLogReader;
use crate::backend::Backend;
use crate::config::TLogConfig;
use crate::error::TLogError;
use std::path::Path;
use voltlog_core::{Entry, ENTRY_SIZE};

/// Backward reader with a read-behind buffer.
///
/// Each refill reads the block of entries just before the ones already
/// handed out, so the file is never loaded as a whole.
pub struct BackwardReader {
    file: TLogFile,
    buffer: Vec<u8>,
    capacity: usize,
    // index in the file of the first entry in `buffer`
    buffer_start: u64,
    // entries of `buffer` not yet handed out (handed out from the back)
    remaining: usize,
}

impl BackwardReader {
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
        let buffer_start = file.entries();
        BackwardReader {
            file,
            buffer: Vec::new(),
            capacity: config.read_buffer_entries.max(1),
            buffer_start,
            remaining: 0,
        }
    }

    /// Change the read-behind buffer size (builder pattern).
    pub fn with_buffer_entries(mut self, entries: usize) -> Self {
        self.capacity = entries.max(1);
        self
    }

    /// Path of the file being read.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn refill(&mut self) -> Result<bool, TLogError> {
        if self.buffer_start == 0 {
            return Ok(false);
        }
        let count = self.buffer_start.min(self.capacity as u64) as usize;
        let start = self.buffer_start - count as u64;
        self.buffer.resize(count * ENTRY_SIZE, 0);
        self.file.read_at(start, &mut self.buffer)?;
        self.buffer_start = start;
        self.remaining = count;
        Ok(true)
    }
}

impl TLogReader for BackwardReader {
    fn next_any(&mut self) -> Result<Option<Entry>, TLogError> {
        if self.remaining == 0 && !self.refill()? {
            return Ok(None);
        }
        self.remaining -= 1;
        let idx = self.remaining;
        let bytes = &self.buffer[idx * ENTRY_SIZE..(idx + 1) * ENTRY_SIZE];
        let entry = self.file.decode(self.buffer_start + idx as u64, bytes)?;
        Ok(Some(entry))
    }
}
