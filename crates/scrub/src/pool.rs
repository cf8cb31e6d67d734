//! SCO pool: data scrubbing
//!
//! Walks the merged, SCO-ordered TLog once and decides per SCO whether its
//! data stays where it is or gets copied into new, densely filled SCOs.
//!
//! # Algorithm
//!
//! 1. Move the pool cursor forward through the usage table to the entry's
//!    SCO. Rows skipped without ever being reached must have no live
//!    clusters and become `Scrubbed`.
//! 2. On reaching a row still `Unknown`: `NotScrubbed` if its usage is at
//!    least `minimum_used_entries`, `Scrubbed` otherwise.
//! 3. `NotScrubbed`: the entry goes to the nonrewritten TLog unchanged.
//! 4. `Scrubbed`/`Reused`: the cluster is copied from the old SCO (fetched
//!    from the backend, one cached at a time) into the current destination
//!    SCO. The new mapping goes to the rewritten TLog, the old and new
//!    mappings go to the relocations TLog as a pair.
//! 5. A full destination is uploaded under a fresh name derived from the
//!    oldest scrubbed SCO not reused yet (the reuse cursor), probing
//!    versions until one is free on the backend.
//!
//! The SCO of the newest live entry is never scrubbed: a volume replaying
//! its write cache after a restart must find that SCO in place.
//!
//! ```text
//!   merged TLog ──► Pool ──┬──► nonrewritten_tlog
//!                          ├──► rewritten_tlog
//!                          ├──► relocations_tlog  (old, new) pairs
//!                          └──► new SCOs ──► backend
//! ```

use crate::access_data::ScoAccessData;
use crate::config::ScrubberConfig;
use crate::error::{Result, ScrubError};
use crate::scrubbing_data::{ScoState, ScrubbingScoTable};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use voltlog_core::{CheckSum, ClusterLocation, LocationEntry, Sco};
use voltlog_durability::{
    Backend, FilePool, ForwardReader, InsistOnLatest, OverwriteObject, TLogConfig, TLogReader,
    TLogWriter,
};

/// Name of the TLog with entries left in place.
pub const NONREWRITTEN_TLOG: &str = "nonrewritten_tlog";
/// Name of the TLog with relocated entries.
pub const REWRITTEN_TLOG: &str = "rewritten_tlog";
/// Name of the TLog with (old, new) relocation pairs.
pub const RELOCATIONS_TLOG: &str = "relocations_tlog";

/// Versions probed for a new SCO name before giving up.
pub const MAX_SCO_NAME_PROBES: u32 = 255;

/// Find a name for a new SCO based on `base`.
///
/// Probes successive versions (wrapping after 255) and returns the first
/// one the backend does not have.
pub fn make_new_sco_name(backend: &dyn Backend, base: Sco) -> Result<Sco> {
    let mut version = base.version();
    for _ in 0..MAX_SCO_NAME_PROBES {
        version = version.wrapping_add(1);
        let candidate = base.with_version(version);
        if !backend.exists(&candidate.to_string())? {
            debug!(target: "voltlog::scrub", base = %base, sco = %candidate, "new SCO name");
            return Ok(candidate);
        }
    }
    error!(target: "voltlog::scrub", base = %base, "could not create a new SCO name");
    Err(ScrubError::ScoNameExhausted(base))
}

/// Results of the data scrub.
#[derive(Debug, Clone)]
pub struct PoolOutput {
    /// Entries left in place
    pub nonrewritten: PathBuf,
    /// Relocated entries with their new locations
    pub rewritten: PathBuf,
    /// (old, new) relocation pairs
    pub relocations: PathBuf,
    /// Checksum of the relocations TLog
    pub relocations_checksum: u32,
    /// Relocation pairs written
    pub relocation_count: u64,
    /// SCOs uploaded, in upload order
    pub new_scos: Vec<Sco>,
    /// SCOs whose live data was copied out
    pub scos_to_delete: Vec<Sco>,
    /// Average access frequency of the data in each new SCO
    pub access_data: Vec<(Sco, f32)>,
    /// Old SCOs fetched from the backend
    pub scos_read: u64,
    /// New SCOs written to the backend
    pub scos_written: u64,
}

/// Destination SCO being filled.
struct Destination {
    sco: Sco,
    path: PathBuf,
    file: File,
    checksum: CheckSum,
    clusters: u32,
    access_sum: f32,
}

/// Old SCO data is read from.
struct Source {
    sco: Sco,
    file: File,
}

/// Relocates live clusters out of sparsely used SCOs.
pub struct Pool<'a> {
    table: &'a mut ScrubbingScoTable,
    files: &'a FilePool,
    backend: &'a dyn Backend,
    access_data: &'a ScoAccessData,
    tlog_config: TLogConfig,
    cluster_size: u64,
    sco_size: u32,
    minimum_used_entries: u32,

    // pool cursor
    cursor: usize,
    arrived: bool,
    remaining: u32,
    // oldest row that may still be reused
    reuse_cursor: usize,

    source: Option<Source>,
    destination: Option<Destination>,
    buffer: Vec<u8>,

    new_scos: Vec<Sco>,
    new_access_data: Vec<(Sco, f32)>,
    scos_read: u64,
    scos_written: u64,
}

impl<'a> Pool<'a> {
    /// Pool over `table`, protecting `last_sco` from being scrubbed.
    ///
    /// Fails if the table holds a SCO newer than `last_sco`.
    pub fn new(
        table: &'a mut ScrubbingScoTable,
        files: &'a FilePool,
        backend: &'a dyn Backend,
        access_data: &'a ScoAccessData,
        config: &ScrubberConfig,
        last_sco: Sco,
    ) -> Result<Self> {
        if !last_sco.is_null() {
            for row in table.iter_mut() {
                if row.sco.number() > last_sco.number() {
                    error!(
                        target: "voltlog::scrub",
                        sco = %row.sco,
                        last = %last_sco,
                        "SCO newer than the last SCO"
                    );
                    return Err(ScrubError::Inconsistent(format!(
                        "{} is newer than the last SCO {}",
                        row.sco, last_sco
                    )));
                }
                if row.sco == last_sco {
                    row.state = ScoState::NotScrubbed;
                }
            }
        }

        Ok(Pool {
            table,
            files,
            backend,
            access_data,
            tlog_config: config.tlog.clone(),
            cluster_size: config.cluster_size(),
            sco_size: config.sco_size,
            minimum_used_entries: config.minimum_used_entries(),
            cursor: 0,
            arrived: false,
            remaining: 0,
            reuse_cursor: 0,
            source: None,
            destination: None,
            buffer: vec![0; config.cluster_size() as usize],
            new_scos: Vec::new(),
            new_access_data: Vec::new(),
            scos_read: 0,
            scos_written: 0,
        })
    }

    /// Scrub the merged TLog at `merged`.
    pub fn run(mut self, merged: &Path) -> Result<PoolOutput> {
        info!(
            target: "voltlog::scrub",
            scos = self.table.len(),
            minimum_used_entries = self.minimum_used_entries,
            "data scrub started"
        );

        let nonrewritten = self.files.new_file(NONREWRITTEN_TLOG)?;
        let rewritten = self.files.new_file(REWRITTEN_TLOG)?;
        let relocations = self.files.new_file(RELOCATIONS_TLOG)?;
        let mut nonrewritten_writer = TLogWriter::with_config(&nonrewritten, &self.tlog_config)?;
        let mut rewritten_writer = TLogWriter::with_config(&rewritten, &self.tlog_config)?;
        let mut relocations_writer = TLogWriter::with_config(&relocations, &self.tlog_config)?;

        let mut reader = ForwardReader::open(merged)?
            .with_buffer_entries(self.tlog_config.read_buffer_entries);

        while let Some(entry) = reader.next_location()? {
            let sco = entry.location().sco();
            let index = self.advance_to(&sco)?;
            match self.table.row(index).state {
                ScoState::NotScrubbed => {
                    nonrewritten_writer.append_location(entry.address, entry.location_and_hash)?;
                }
                ScoState::Scrubbed | ScoState::Reused => {
                    let new_location = self.relocate(&entry)?;
                    let relocated = entry.location_and_hash.relocated(new_location);
                    rewritten_writer.append_location(entry.address, relocated)?;
                    relocations_writer.append_location(entry.address, entry.location_and_hash)?;
                    relocations_writer.append_location(entry.address, relocated)?;
                }
                ScoState::Unknown => {
                    return Err(ScrubError::Inconsistent(format!(
                        "no decision for {}",
                        sco
                    )));
                }
            }
            self.remaining = self.remaining.checked_sub(1).ok_or_else(|| {
                error!(target: "voltlog::scrub", sco = %sco, "more entries than live clusters");
                ScrubError::Inconsistent(format!("more entries than live clusters in {}", sco))
            })?;
        }

        self.finish_rows()?;
        if let Some(destination) = self.destination.take() {
            self.upload(destination)?;
        }
        if let Some(source) = self.source.take() {
            drop(source.file);
            self.files.remove(&source.sco.to_string());
        }

        nonrewritten_writer.close()?;
        rewritten_writer.close()?;
        let relocation_count = relocations_writer.entries_written() / 2;
        let relocations_checksum = relocations_writer.close()?;

        let scos_to_delete: Vec<Sco> = self
            .table
            .iter()
            .filter(|r| matches!(r.state, ScoState::Scrubbed | ScoState::Reused))
            .map(|r| r.sco)
            .collect();

        info!(
            target: "voltlog::scrub",
            relocations = relocation_count,
            scos_read = self.scos_read,
            scos_written = self.scos_written,
            scos_to_delete = scos_to_delete.len(),
            "data scrub completed"
        );

        Ok(PoolOutput {
            nonrewritten,
            rewritten,
            relocations,
            relocations_checksum,
            relocation_count,
            new_scos: self.new_scos,
            scos_to_delete,
            access_data: self.new_access_data,
            scos_read: self.scos_read,
            scos_written: self.scos_written,
        })
    }

    /// Move the cursor to the row of `sco` and return its index.
    fn advance_to(&mut self, sco: &Sco) -> Result<usize> {
        loop {
            if self.cursor >= self.table.len() {
                error!(target: "voltlog::scrub", sco = %sco, "SCO not found in usage table");
                return Err(ScrubError::UnknownSco(*sco));
            }
            if self.table.row(self.cursor).sco == *sco {
                break;
            }
            self.leave_row()?;
            self.cursor += 1;
            self.arrived = false;
        }

        if !self.arrived {
            let minimum = self.minimum_used_entries;
            let row = self.table.row_mut(self.cursor);
            if row.usage_count == 0 {
                error!(target: "voltlog::scrub", sco = %sco, "entry for SCO without live clusters");
                return Err(ScrubError::Inconsistent(format!(
                    "entry for {} without live clusters",
                    sco
                )));
            }
            if row.state == ScoState::Unknown {
                row.state = if row.usage_count >= minimum {
                    ScoState::NotScrubbed
                } else {
                    ScoState::Scrubbed
                };
            }
            debug!(
                target: "voltlog::scrub",
                sco = %sco,
                usage = row.usage_count,
                size = row.size,
                state = %row.state,
                "reached SCO"
            );
            self.remaining = row.usage_count;
            self.arrived = true;
        }
        Ok(self.cursor)
    }

    fn leave_row(&mut self) -> Result<()> {
        let row = self.table.row_mut(self.cursor);
        if self.arrived {
            if self.remaining != 0 {
                error!(
                    target: "voltlog::scrub",
                    sco = %row.sco,
                    remaining = self.remaining,
                    "leaving SCO with unseen live clusters"
                );
                return Err(ScrubError::Inconsistent(format!(
                    "{} live clusters of {} not in the TLog",
                    self.remaining, row.sco
                )));
            }
        } else {
            if row.usage_count != 0 {
                error!(
                    target: "voltlog::scrub",
                    sco = %row.sco,
                    usage = row.usage_count,
                    "skipping SCO with live clusters"
                );
                return Err(ScrubError::Inconsistent(format!(
                    "{} has live clusters but no entries",
                    row.sco
                )));
            }
            if row.state == ScoState::Unknown {
                row.state = ScoState::Scrubbed;
            }
        }
        Ok(())
    }

    /// Settle the rows after the last entry.
    fn finish_rows(&mut self) -> Result<()> {
        if self.cursor >= self.table.len() {
            return Ok(());
        }
        self.leave_row()?;
        for index in self.cursor + 1..self.table.len() {
            self.cursor = index;
            self.arrived = false;
            self.leave_row()?;
        }
        Ok(())
    }

    /// Copy the cluster of `entry` into the destination; returns its new
    /// location.
    fn relocate(&mut self, entry: &LocationEntry) -> Result<ClusterLocation> {
        let location = entry.location();
        self.fetch_source(&location.sco())?;
        if let Some(source) = self.source.as_mut() {
            source
                .file
                .seek(SeekFrom::Start(location.offset() as u64 * self.cluster_size))?;
            source.file.read_exact(&mut self.buffer)?;
        }

        if self
            .destination
            .as_ref()
            .is_some_and(|d| d.clusters >= self.sco_size)
        {
            if let Some(full) = self.destination.take() {
                self.upload(full)?;
            }
        }
        if self.destination.is_none() {
            self.destination = Some(self.open_destination()?);
        }

        let frequency = self.access_data.get(&location.sco());
        let destination = self.destination.as_mut().ok_or_else(|| {
            ScrubError::Inconsistent("no destination SCO".to_string())
        })?;
        destination.file.write_all(&self.buffer)?;
        destination.checksum.update(&self.buffer);
        destination.access_sum += frequency;
        let new_location = ClusterLocation::new(destination.sco, destination.clusters as u16);
        destination.clusters += 1;
        Ok(new_location)
    }

    /// Make `sco` the cached source, fetching it from the backend.
    fn fetch_source(&mut self, sco: &Sco) -> Result<()> {
        if self.source.as_ref().is_some_and(|s| s.sco == *sco) {
            return Ok(());
        }
        if let Some(old) = self.source.take() {
            drop(old.file);
            self.files.remove(&old.sco.to_string());
        }

        let name = sco.to_string();
        let path = self.files.new_file(&name)?;
        self.backend.read(&path, &name, InsistOnLatest::No)?;
        self.scos_read += 1;
        debug!(target: "voltlog::scrub", sco = %sco, "fetched SCO");
        self.source = Some(Source {
            sco: *sco,
            file: File::open(&path)?,
        });
        Ok(())
    }

    fn open_destination(&mut self) -> Result<Destination> {
        while self.reuse_cursor < self.table.len()
            && self.table.row(self.reuse_cursor).state != ScoState::Scrubbed
        {
            self.reuse_cursor += 1;
        }
        if self.reuse_cursor >= self.table.len() || self.reuse_cursor > self.cursor {
            error!(target: "voltlog::scrub", "no scrubbed SCO left to reuse");
            return Err(ScrubError::Inconsistent(
                "no scrubbed SCO left to reuse".to_string(),
            ));
        }
        let row = self.table.row_mut(self.reuse_cursor);
        row.state = ScoState::Reused;
        let base = row.sco;

        let sco = make_new_sco_name(self.backend, base)?;
        let path = self.files.new_file(&sco.to_string())?;
        let file = File::create(&path)?;
        debug!(target: "voltlog::scrub", sco = %sco, reused = %base, "new destination SCO");
        Ok(Destination {
            sco,
            path,
            file,
            checksum: CheckSum::new(),
            clusters: 0,
            access_sum: 0.0,
        })
    }

    fn upload(&mut self, destination: Destination) -> Result<()> {
        let Destination {
            sco,
            path,
            file,
            checksum,
            clusters,
            access_sum,
        } = destination;
        file.sync_all()?;
        drop(file);

        let name = sco.to_string();
        if self.backend.exists(&name)? {
            error!(target: "voltlog::scrub", sco = %sco, "new SCO already on the backend");
            return Err(ScrubError::AlreadyOnBackend(name));
        }
        self.backend
            .write(&path, &name, OverwriteObject::Forbid, Some(&checksum))?;

        let frequency = if clusters > 0 {
            access_sum / clusters as f32
        } else {
            0.0
        };
        info!(
            target: "voltlog::scrub",
            sco = %sco,
            clusters,
            frequency,
            "uploaded new SCO"
        );
        self.new_scos.push(sco);
        self.new_access_data.push((sco, frequency));
        self.files.remove(&name);
        self.scos_written += 1;
        Ok(())
    }
}
