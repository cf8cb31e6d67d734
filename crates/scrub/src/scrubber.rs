//! Scrub job
//!
//! Runs the whole pipeline over a run of TLogs of one volume:
//!
//! ```text
//!  TLogs ─► Splitter ─► region sub-logs ─► PartScrubber (per region)
//!                                               │
//!              metadatascrubbed_tlog ◄─ Merger ◄┘
//!                       │
//!                       ▼
//!                     Pool ─► rewritten + nonrewritten ─► Merger
//!                       │                                   │
//!                       ▼                                   ▼
//!              relocations_tlog             completely_scrubbed_tlog
//!                       │                                   │
//!               RelocationCutter                        TLogCutter
//!                       └──────────► ScrubResult ◄──────────┘
//! ```
//!
//! The result lists what the volume has to do to adopt the scrub: which
//! TLogs replace which, which SCOs can go, and which relocations dependent
//! caches must apply. It is published on the backend as
//! `scrubbing_result<uuid>` for the volume owner to pick up.

use crate::access_data::ScoAccessData;
use crate::config::ScrubberConfig;
use crate::cutter::{RelocationCutter, TLogCutter};
use crate::error::{Result, ScrubError};
use crate::merger::Merger;
use crate::part_scrubber::PartScrubber;
use crate::pool::Pool;
use crate::splitter::{SplitOutput, Splitter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;
use voltlog_core::{Sco, TLog, TLogId, TLogs};
use voltlog_durability::{
    Backend, CombinedReader, FilePool, InsistOnLatest, ObjectMayNotExist, OverwriteObject,
};

/// Prefix of published scrub result names.
pub const SCRUBBING_RESULT_PREFIX: &str = "scrubbing_result";

/// Version of the serialized `ScrubResult`.
pub const SCRUB_RESULT_VERSION: u32 = 1;

/// Name of the merged TLog after metadata scrubbing.
pub const METADATA_SCRUBBED_TLOG: &str = "metadatascrubbed_tlog";

/// Name of the merged TLog after data scrubbing.
pub const COMPLETELY_SCRUBBED_TLOG: &str = "completely_scrubbed_tlog";

/// Whether `name` is the name of a published scrub result.
pub fn is_scrubbing_result_name(name: &str) -> bool {
    name.strip_prefix(SCRUBBING_RESULT_PREFIX)
        .map(|rest| Uuid::parse_str(rest).is_ok())
        .unwrap_or(false)
}

/// Outcome of a scrub job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrubResult {
    /// Serialization version
    pub version: u32,
    /// TLogs that were scrubbed, oldest first
    pub tlog_names_in: Vec<TLogId>,
    /// TLogs replacing them, all on the backend
    pub tlogs_out: Vec<TLog>,
    /// Relocation TLogs, in order
    pub relocations: Vec<String>,
    /// Relocation pairs in `relocations`
    pub relocation_count: u64,
    /// SCOs no longer referenced once the result is applied
    pub scos_to_delete: Vec<Sco>,
    /// Access frequency of each new SCO
    pub prefetch: Vec<(Sco, f32)>,
    /// SCOs written by the job
    pub new_scos: Vec<Sco>,
}

impl ScrubResult {
    /// Download and parse the published result `name`.
    ///
    /// `scratch_dir` holds the downloaded copy while it is parsed.
    pub fn fetch(backend: &dyn Backend, name: &str, scratch_dir: &Path) -> Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix(name)
            .tempfile_in(scratch_dir)?;
        backend.read(tmp.path(), name, InsistOnLatest::Yes)?;
        let result: ScrubResult = serde_json::from_reader(BufReader::new(File::open(tmp.path())?))?;
        Ok(result)
    }

    /// Adopt the result: swap the scrubbed TLogs in `tlogs` for the new
    /// ones, then delete the SCOs and TLogs no longer referenced.
    ///
    /// Fails without changing anything if `tlogs` is no longer exactly the
    /// sequence of scrubbed TLogs.
    pub fn apply(&self, tlogs: &mut TLogs, backend: &dyn Backend) -> Result<()> {
        tlogs.replace(&self.tlog_names_in, self.tlogs_out.clone())?;
        info!(
            target: "voltlog::scrub",
            replaced = self.tlog_names_in.len(),
            by = self.tlogs_out.len(),
            "applied scrub result"
        );

        for sco in &self.scos_to_delete {
            backend.remove(&sco.to_string(), ObjectMayNotExist::Yes)?;
        }
        for id in &self.tlog_names_in {
            backend.remove(&id.name(), ObjectMayNotExist::Yes)?;
        }
        Ok(())
    }
}

/// Offline scrubber for the TLogs of one volume.
pub struct Scrubber {
    config: ScrubberConfig,
    backend: Box<dyn Backend>,
}

impl Scrubber {
    /// Scrubber working on `backend`'s namespace.
    pub fn new(config: ScrubberConfig, backend: Box<dyn Backend>) -> Result<Self> {
        config.validate()?;
        Ok(Scrubber { config, backend })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ScrubberConfig {
        &self.config
    }

    /// Scrub the TLogs `tlog_ids` (oldest first).
    ///
    /// New SCOs and TLogs are uploaded; nothing on the backend is removed
    /// or overwritten. Intermediate files are left in the scratch
    /// directory for the caller to clean up.
    pub fn run(&self, tlog_ids: &[TLogId], access_data: &ScoAccessData) -> Result<ScrubResult> {
        if tlog_ids.is_empty() {
            error!(target: "voltlog::scrub", "no TLogs to scrub");
            return Err(ScrubError::Inconsistent("no TLogs to scrub".to_string()));
        }

        let config = &self.config;
        let tlog_config = &config.tlog;
        let backend = self.backend.as_ref();
        let files = FilePool::new(&config.scratch_dir)?;

        info!(
            target: "voltlog::scrub",
            namespace = backend.namespace(),
            tlogs = tlog_ids.len(),
            "scrub started"
        );
        let start_time = Instant::now();

        let SplitOutput { regions, mut table } = self.split(&files, tlog_ids)?;
        if config.verbose {
            info!(target: "voltlog::scrub", "SCO table after splitting:\n{}", table);
        }

        let mut scrubbed = Vec::with_capacity(regions.len());
        for (region, path) in &regions {
            let part = PartScrubber::new(&files, *region, config.region_size_exponent, tlog_config);
            let (output, _) = part.scrub(path, &mut table)?;
            files.remove(&crate::splitter::region_tlog_name(*region));
            scrubbed.push(output);
        }
        if config.verbose {
            info!(target: "voltlog::scrub", "SCO table after metadata scrub:\n{}", table);
        }

        let metadata_scrubbed = files.new_file(METADATA_SCRUBBED_TLOG)?;
        let merged = Merger::backward(&scrubbed, tlog_config)?.merge(&metadata_scrubbed, tlog_config)?;
        for region in regions.keys() {
            files.remove(&crate::part_scrubber::scrubbed_region_tlog_name(*region));
        }
        let metadata_scrub_ms = start_time.elapsed().as_millis() as u64;

        let data_start = Instant::now();
        let pool = Pool::new(
            &mut table,
            &files,
            backend,
            access_data,
            config,
            merged.last_location.sco(),
        )?
        .run(&metadata_scrubbed)?;
        if config.verbose {
            info!(target: "voltlog::scrub", "SCO table after data scrub:\n{}", table);
        }
        let data_scrub_ms = data_start.elapsed().as_millis() as u64;

        let completely_scrubbed = files.new_file(COMPLETELY_SCRUBBED_TLOG)?;
        Merger::forward(&[&pool.rewritten, &pool.nonrewritten], tlog_config)?
            .merge(&completely_scrubbed, tlog_config)?;

        let tlogs_out = TLogCutter::new(backend, &files, tlog_config, config.max_tlog_entries)
            .cut(&completely_scrubbed)?;

        let relocations = if pool.relocation_count > 0 {
            RelocationCutter::new(backend, &files, tlog_config, config.max_relocation_entries)
                .cut(&pool.relocations)?
        } else {
            Vec::new()
        };

        info!(
            target: "voltlog::scrub",
            tlogs_in = tlog_ids.len(),
            tlogs_out = tlogs_out.len(),
            scos_read = pool.scos_read,
            scos_written = pool.scos_written,
            metadata_scrub_ms,
            data_scrub_ms,
            "scrub completed"
        );

        Ok(ScrubResult {
            version: SCRUB_RESULT_VERSION,
            tlog_names_in: tlog_ids.to_vec(),
            tlogs_out,
            relocations,
            relocation_count: pool.relocation_count,
            scos_to_delete: pool.scos_to_delete,
            prefetch: pool.access_data,
            new_scos: pool.new_scos,
        })
    }

    /// Upload `result` under a fresh `scrubbing_result<uuid>` name and
    /// return the name.
    pub fn publish(&self, result: &ScrubResult) -> Result<String> {
        let files = FilePool::new(&self.config.scratch_dir)?;
        let name = format!("{}{}", SCRUBBING_RESULT_PREFIX, Uuid::new_v4());
        debug_assert!(is_scrubbing_result_name(&name));

        let path = files.new_file(&name)?;
        {
            let mut writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer(&mut writer, result)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        if self.backend.exists(&name)? {
            error!(target: "voltlog::scrub", name = %name, "scrub result already on the backend");
            return Err(ScrubError::AlreadyOnBackend(name));
        }
        self.backend
            .write(&path, &name, OverwriteObject::Forbid, None)?;
        files.remove(&name);

        info!(target: "voltlog::scrub", name = %name, "published scrub result");
        Ok(name)
    }

    /// `run` followed by `publish`; returns the published name.
    pub fn run_and_publish(&self, tlog_ids: &[TLogId], access_data: &ScoAccessData) -> Result<String> {
        let result = self.run(tlog_ids, access_data)?;
        self.publish(&result)
    }

    fn split(&self, files: &FilePool, tlog_ids: &[TLogId]) -> Result<SplitOutput> {
        let names: Vec<String> = tlog_ids.iter().map(|id| id.name()).collect();
        let splitter = Splitter::new(files, self.config.region_size_exponent, &self.config.tlog);
        if self.config.prefetch {
            let mut reader = CombinedReader::forward_prefetched(
                files.directory(),
                names,
                self.backend.clone_backend(),
                self.config.tlog.clone(),
            )?;
            splitter.split(&mut reader)
        } else {
            let mut reader = CombinedReader::forward(
                files.directory(),
                names,
                self.backend.clone_backend(),
                self.config.tlog.clone(),
            );
            splitter.split(&mut reader)
        }
    }
}
