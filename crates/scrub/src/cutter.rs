//! TLog cutters
//!
//! A scrub job produces one long TLog (and one long relocations TLog). The
//! cutters split them into chunks of bounded size and upload every chunk
//! under a fresh TLog name.
//!
//! - `TLogCutter` never splits the entries of one SCO over two chunks.
//! - `RelocationCutter` never splits an (old, new) relocation pair.

use crate::error::{Result, ScrubError};
use std::path::Path;
use tracing::{debug, error, info};
use voltlog_core::{CheckSum, Entry, Sco, TLog, TLogId};
use voltlog_durability::{
    Backend, FilePool, ForwardReader, OverwriteObject, TLogConfig, TLogReader, TLogWriter,
};

/// Where a chunk may end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CutPolicy {
    /// Before the first entry of a new SCO
    ScoBoundary,
    /// Between relocation pairs
    PairBoundary,
}

/// Chunk being written.
struct Chunk {
    id: TLogId,
    writer: TLogWriter,
    locations: u64,
    last_sco: Option<Sco>,
}

struct Cut<'a> {
    backend: &'a dyn Backend,
    files: &'a FilePool,
    config: &'a TLogConfig,
    max_entries: u64,
    policy: CutPolicy,
}

impl<'a> Cut<'a> {
    fn open_chunk(&self) -> Result<Chunk> {
        let id = TLogId::new();
        let path = self.files.new_file(&id.name())?;
        Ok(Chunk {
            id,
            writer: TLogWriter::with_config(&path, self.config)?,
            locations: 0,
            last_sco: None,
        })
    }

    fn cut_here(&self, chunk: &Chunk, sco: &Sco) -> bool {
        if chunk.locations < self.max_entries {
            return false;
        }
        match self.policy {
            CutPolicy::ScoBoundary => chunk.last_sco.as_ref() != Some(sco),
            CutPolicy::PairBoundary => chunk.locations % 2 == 0,
        }
    }

    /// Close, upload and remove the chunk; returns the uploaded TLog.
    fn finish_chunk(&self, mut chunk: Chunk) -> Result<TLog> {
        let crc = chunk.writer.close()?;
        let path = chunk.writer.path().to_path_buf();
        let name = chunk.id.name();
        let size = std::fs::metadata(&path)?.len();

        if self.backend.exists(&name)? {
            error!(target: "voltlog::scrub", name = %name, "TLog chunk already on the backend");
            return Err(ScrubError::AlreadyOnBackend(name));
        }
        self.backend.write(
            &path,
            &name,
            OverwriteObject::Forbid,
            Some(&CheckSum::with_value(crc)),
        )?;
        self.files.remove(&name);

        debug!(
            target: "voltlog::scrub",
            name = %name,
            entries = chunk.locations,
            size,
            "uploaded TLog chunk"
        );
        let mut tlog = TLog::with_id(chunk.id);
        tlog.set_written_to_backend(true);
        tlog.set_backend_size(size);
        Ok(tlog)
    }

    fn run(&self, input: &Path) -> Result<Vec<TLog>> {
        let mut reader = ForwardReader::open(input)?.with_buffer_entries(self.config.read_buffer_entries);
        let mut out = Vec::new();
        let mut chunk = self.open_chunk()?;

        while let Some(entry) = reader.next_any()? {
            match entry {
                Entry::Location(loc) => {
                    let sco = loc.location().sco();
                    if self.cut_here(&chunk, &sco) {
                        let next = self.open_chunk()?;
                        out.push(self.finish_chunk(std::mem::replace(&mut chunk, next))?);
                    }
                    chunk.writer.append_location(loc.address, loc.location_and_hash)?;
                    chunk.locations += 1;
                    chunk.last_sco = Some(sco);
                }
                Entry::ScoCrc(crc) => chunk.writer.append_sco_crc(crc)?,
                // chunks get their own TLog CRC
                Entry::TLogCrc(_) | Entry::Sync => {}
            }
        }
        out.push(self.finish_chunk(chunk)?);
        Ok(out)
    }
}

/// Cuts a TLog into uploaded chunks at SCO boundaries.
pub struct TLogCutter<'a> {
    cut: Cut<'a>,
}

impl<'a> TLogCutter<'a> {
    /// Cutter starting a new chunk once one holds `max_entries` location
    /// entries and the next entry is in another SCO.
    pub fn new(
        backend: &'a dyn Backend,
        files: &'a FilePool,
        config: &'a TLogConfig,
        max_entries: u64,
    ) -> Self {
        TLogCutter {
            cut: Cut {
                backend,
                files,
                config,
                max_entries,
                policy: CutPolicy::ScoBoundary,
            },
        }
    }

    /// Cut and upload the TLog at `input`.
    ///
    /// Always produces at least one chunk, possibly empty.
    pub fn cut(&self, input: &Path) -> Result<Vec<TLog>> {
        info!(target: "voltlog::scrub", input = %input.display(), "cutting TLog");
        let tlogs = self.cut.run(input)?;
        info!(target: "voltlog::scrub", chunks = tlogs.len(), "cut TLog");
        Ok(tlogs)
    }
}

/// Cuts a relocations TLog into uploaded chunks between pairs.
pub struct RelocationCutter<'a> {
    cut: Cut<'a>,
}

impl<'a> RelocationCutter<'a> {
    /// Cutter starting a new chunk once one holds `max_entries` entries
    /// (rounded up to whole pairs).
    pub fn new(
        backend: &'a dyn Backend,
        files: &'a FilePool,
        config: &'a TLogConfig,
        max_entries: u64,
    ) -> Self {
        RelocationCutter {
            cut: Cut {
                backend,
                files,
                config,
                max_entries,
                policy: CutPolicy::PairBoundary,
            },
        }
    }

    /// Cut and upload the relocations TLog at `input`; returns the chunk
    /// names in order.
    pub fn cut(&self, input: &Path) -> Result<Vec<String>> {
        info!(target: "voltlog::scrub", input = %input.display(), "cutting relocations");
        let names: Vec<String> = self.cut.run(input)?.iter().map(|t| t.name()).collect();
        info!(target: "voltlog::scrub", chunks = names.len(), "cut relocations");
        Ok(names)
    }
}
