//! Buffered TLog writer.
//!
//! Entries are buffered in memory and written to the file when the buffer
//! fills, on `flush`/`sync`, on a sync marker and on `close`. Every entry
//! appended also feeds a running checksum; `close` seals the TLog with a
//! TLog CRC entry carrying the checksum of everything before it.
//!
//! A writer created on an existing, non-empty file resumes it: the
//! checksum is recomputed over the existing entries and the last cluster
//! location is recovered by reading the file backwards.

use crate::config::TLogConfig;
use crate::error::TLogError;
use crate::reader::{BackwardReader, TLogReader};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use voltlog_core::{
    CheckSum, ClusterAddress, ClusterLocation, ClusterLocationAndHash, Entry, ENTRY_SIZE,
    MAX_CLUSTER_ADDRESS,
};

/// Append-only writer for one TLog file.
pub struct TLogWriter {
    /// File handle, `None` once closed
    file: Option<File>,

    /// Path of the TLog
    path: PathBuf,

    /// Encoded entries not yet written to the file
    buffer: Vec<u8>,

    /// Buffer capacity in entries
    buffer_entries: usize,

    /// Checksum over every entry in the TLog, buffered ones included
    checksum: CheckSum,

    /// Entries in the TLog, buffered ones included
    entries_written: u64,

    /// Location of the last location entry in the TLog
    last_location: ClusterLocation,
}

impl TLogWriter {
    /// Create (or resume) the TLog at `path` with default buffering.
    pub fn create(path: &Path) -> Result<Self, TLogError> {
        Self::with_config(path, &TLogConfig::default())
    }

    /// Create (or resume) the TLog at `path`.
    pub fn with_config(path: &Path, config: &TLogConfig) -> Result<Self, TLogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let size = file.metadata()?.len();
        if size % ENTRY_SIZE as u64 != 0 {
            return Err(TLogError::MisalignedFile {
                path: path.to_path_buf(),
                size,
            });
        }

        let mut checksum = CheckSum::new();
        let mut last_location = ClusterLocation::null();
        if size > 0 {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                checksum.update(&buf[..n]);
            }
            if let Some(loc) = BackwardReader::open(path)?.next_location()? {
                last_location = loc.location();
            }
            debug!(
                path = %path.display(),
                entries = size / ENTRY_SIZE as u64,
                last_location = %last_location,
                "resuming TLog"
            );
        }

        let buffer_entries = config.write_buffer_entries.max(1);
        Ok(TLogWriter {
            file: Some(file),
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(buffer_entries * ENTRY_SIZE),
            buffer_entries,
            checksum,
            entries_written: size / ENTRY_SIZE as u64,
            last_location,
        })
    }

    /// Path of the TLog.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries in the TLog, including resumed and buffered ones.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Checksum over every entry appended so far.
    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    /// Location of the last location entry; null if there is none.
    pub fn last_cluster_location(&self) -> ClusterLocation {
        self.last_location
    }

    /// Append an address to location mapping.
    pub fn append_location(
        &mut self,
        address: ClusterAddress,
        location_and_hash: ClusterLocationAndHash,
    ) -> Result<(), TLogError> {
        if address > MAX_CLUSTER_ADDRESS {
            return Err(TLogError::InvalidLocationEntry {
                reason: format!("cluster address {:#x} out of range", address),
            });
        }
        if location_and_hash.location.is_null() {
            return Err(TLogError::InvalidLocationEntry {
                reason: format!("null location for cluster address {:#x}", address),
            });
        }
        self.append(&Entry::location(address, location_and_hash))?;
        self.last_location = location_and_hash.location;
        Ok(())
    }

    /// Append a SCO CRC entry closing the current SCO.
    pub fn append_sco_crc(&mut self, crc: u32) -> Result<(), TLogError> {
        self.append(&Entry::ScoCrc(crc))
    }

    /// Append a sync marker and flush.
    pub fn append_sync(&mut self) -> Result<(), TLogError> {
        self.append(&Entry::Sync)?;
        self.flush()
    }

    /// Write buffered entries to the file.
    pub fn flush(&mut self) -> Result<(), TLogError> {
        let file = self.file.as_mut().ok_or_else(|| TLogError::WriterClosed {
            path: self.path.clone(),
        })?;
        if !self.buffer.is_empty() {
            file.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> Result<(), TLogError> {
        self.flush()?;
        if let Some(file) = self.file.as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Seal the TLog with a TLog CRC entry and sync it.
    ///
    /// The entry carries the checksum of every entry before it. Returns the
    /// checksum of the whole file, TLog CRC entry included, which is what an
    /// upload of the file is verified against.
    pub fn close(&mut self) -> Result<u32, TLogError> {
        let crc = self.checksum.value();
        self.append(&Entry::TLogCrc(crc))?;
        self.sync()?;
        self.file = None;
        debug!(
            path = %self.path.display(),
            entries = self.entries_written,
            crc,
            "closed TLog"
        );
        Ok(self.checksum.value())
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn append(&mut self, entry: &Entry) -> Result<(), TLogError> {
        if self.file.is_none() {
            return Err(TLogError::WriterClosed {
                path: self.path.clone(),
            });
        }
        let bytes = entry.encode();
        self.buffer.extend_from_slice(&bytes);
        self.checksum.update(&bytes);
        self.entries_written += 1;
        if self.buffer.len() >= self.buffer_entries * ENTRY_SIZE {
            self.flush()?;
        }
        Ok(())
    }
}

impl Drop for TLogWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush TLog on drop");
            }
        }
    }
}
