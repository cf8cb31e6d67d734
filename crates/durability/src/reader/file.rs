//! Opening a single TLog file for reading.

use crate::backend::{Backend, InsistOnLatest};
use crate::error::TLogError;
use std::fs::{File, OpenOptions};
#[cfg(not(unix))]
use std::io::{Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};
use voltlog_core::{Entry, ENTRY_SIZE};

/// An open TLog holding a whole number of entries.
pub(crate) struct TLogFile {
    file: File,
    path: PathBuf,
    entries: u64,
    // fetched copy, deleted when the reader goes away
    _scratch: Option<NamedTempFile>,
}

impl TLogFile {
    /// Open a local TLog file.
    pub(crate) fn open(path: &Path) -> Result<Self, TLogError> {
        Self::open_file(path.to_path_buf(), None)
    }

    /// Open `dir/name`, fetching it from `backend` if it is not there.
    pub(crate) fn open_in(dir: &Path, name: &str, backend: &dyn Backend) -> Result<Self, TLogError> {
        let local = dir.join(name);
        if local.is_file() {
            return Self::open_file(local, None);
        }

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}.", name))
            .tempfile_in(dir)?;
        if let Err(e) = backend.read(scratch.path(), name, InsistOnLatest::No) {
            error!(
                name,
                namespace = backend.namespace(),
                error = %e,
                "failed to fetch TLog from backend"
            );
            return Err(e.into());
        }
        debug!(name, namespace = backend.namespace(), "fetched TLog from backend");
        Self::open_file(scratch.path().to_path_buf(), Some(scratch))
    }

    fn open_file(path: PathBuf, scratch: Option<NamedTempFile>) -> Result<Self, TLogError> {
        let size = std::fs::metadata(&path)?.len();
        let remainder = size % ENTRY_SIZE as u64;
        if remainder != 0 {
            let aligned = size - remainder;
            warn!(
                path = %path.display(),
                size,
                truncated_to = aligned,
                "TLog has trailing garbage, truncating"
            );
            OpenOptions::new().write(true).open(&path)?.set_len(aligned)?;
        }

        let file = File::open(&path)?;
        Ok(TLogFile {
            file,
            path,
            entries: size / ENTRY_SIZE as u64,
            _scratch: scratch,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries in the file.
    pub(crate) fn entries(&self) -> u64 {
        self.entries
    }

    /// Read `buf.len() / ENTRY_SIZE` entries starting at entry `index`.
    ///
    /// Positional: the outcome does not depend on earlier reads.
    pub(crate) fn read_at(&mut self, index: u64, buf: &mut [u8]) -> Result<(), TLogError> {
        let offset = index * ENTRY_SIZE as u64;
        #[cfg(unix)]
        {
            self.file.read_exact_at(buf, offset)?;
        }
        #[cfg(not(unix))]
        {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(buf)?;
        }
        Ok(())
    }

    /// Decode the entry held in `bytes`, which was read from entry `index`.
    pub(crate) fn decode(&self, index: u64, bytes: &[u8]) -> Result<Entry, TLogError> {
        Entry::decode_slice(bytes).map_err(|source| TLogError::InvalidEntry {
            path: self.path.clone(),
            offset: index * ENTRY_SIZE as u64,
            source,
        })
    }
}
