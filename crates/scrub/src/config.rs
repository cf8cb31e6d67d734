//! Scrubber configuration.
//!
//! This module provides configuration for a scrub job.

use std::path::PathBuf;
use voltlog_core::MAX_CLUSTER_ADDRESS;
use voltlog_durability::TLogConfig;

/// Largest region size exponent: one region covering the whole address space.
pub const MAX_REGION_SIZE_EXPONENT: u8 = 64 - MAX_CLUSTER_ADDRESS.leading_zeros() as u8;

/// Scrub job configuration parameters.
#[derive(Debug, Clone)]
pub struct ScrubberConfig {
    /// Directory for intermediate files.
    pub scratch_dir: PathBuf,

    /// Size of an address region in clusters, as a power of two
    /// (default: 2^25).
    pub region_size_exponent: u8,

    /// Capacity of a SCO in clusters (default: 1024).
    pub sco_size: u32,

    /// Size of a cluster in bytes, as a power of two (default: 2^12).
    pub cluster_size_exponent: u8,

    /// SCOs with at least `sco_size * fill_ratio` live clusters are left
    /// alone (default: 0.9).
    pub fill_ratio: f32,

    /// Location entries per uploaded TLog (default: 2^20).
    pub max_tlog_entries: u64,

    /// Entries per uploaded relocations TLog (default: 2^20).
    pub max_relocation_entries: u64,

    /// Open input TLogs on a background thread (default: true).
    pub prefetch: bool,

    /// Log the SCO table after each stage (default: false).
    pub verbose: bool,

    /// Reader/writer buffering.
    pub tlog: TLogConfig,
}

impl ScrubberConfig {
    /// Create a configuration with default values.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        ScrubberConfig {
            scratch_dir: scratch_dir.into(),
            region_size_exponent: 25,
            sco_size: 1024,
            cluster_size_exponent: 12,
            fill_ratio: 0.9,
            max_tlog_entries: 1 << 20,
            max_relocation_entries: 1 << 20,
            prefetch: true,
            verbose: false,
            tlog: TLogConfig::default(),
        }
    }

    /// Set region size exponent (builder pattern).
    pub fn with_region_size_exponent(mut self, exponent: u8) -> Self {
        self.region_size_exponent = exponent;
        self
    }

    /// Set SCO size in clusters (builder pattern).
    pub fn with_sco_size(mut self, clusters: u32) -> Self {
        self.sco_size = clusters;
        self
    }

    /// Set cluster size exponent (builder pattern).
    pub fn with_cluster_size_exponent(mut self, exponent: u8) -> Self {
        self.cluster_size_exponent = exponent;
        self
    }

    /// Set fill ratio (builder pattern).
    pub fn with_fill_ratio(mut self, ratio: f32) -> Self {
        self.fill_ratio = ratio;
        self
    }

    /// Set entries per uploaded TLog (builder pattern).
    pub fn with_max_tlog_entries(mut self, entries: u64) -> Self {
        self.max_tlog_entries = entries;
        self
    }

    /// Set entries per uploaded relocations TLog (builder pattern).
    pub fn with_max_relocation_entries(mut self, entries: u64) -> Self {
        self.max_relocation_entries = entries;
        self
    }

    /// Enable or disable background prefetching (builder pattern).
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Enable or disable SCO table dumps (builder pattern).
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set reader/writer buffering (builder pattern).
    pub fn with_tlog_config(mut self, tlog: TLogConfig) -> Self {
        self.tlog = tlog;
        self
    }

    /// Cluster size in bytes.
    pub fn cluster_size(&self) -> u64 {
        1 << self.cluster_size_exponent
    }

    /// Live clusters a SCO needs to be left in place.
    pub fn minimum_used_entries(&self) -> u32 {
        (self.sco_size as f64 * self.fill_ratio as f64).floor() as u32
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ScrubberConfigError> {
        if !(0.0..=1.0).contains(&self.fill_ratio) {
            return Err(ScrubberConfigError::FillRatioOutOfRange(self.fill_ratio));
        }
        if self.sco_size == 0 || self.sco_size > u16::MAX as u32 + 1 {
            return Err(ScrubberConfigError::InvalidScoSize(self.sco_size));
        }
        if self.region_size_exponent > MAX_REGION_SIZE_EXPONENT {
            return Err(ScrubberConfigError::RegionTooLarge(self.region_size_exponent));
        }
        if !(9..=24).contains(&self.cluster_size_exponent) {
            return Err(ScrubberConfigError::InvalidClusterSize(self.cluster_size_exponent));
        }
        if self.max_tlog_entries == 0 || self.max_relocation_entries < 2 {
            return Err(ScrubberConfigError::ZeroChunkSize);
        }
        self.tlog.validate().map_err(ScrubberConfigError::TLog)
    }

    /// Create a configuration for testing (small regions, SCOs and clusters).
    pub fn for_testing(scratch_dir: impl Into<PathBuf>) -> Self {
        ScrubberConfig {
            scratch_dir: scratch_dir.into(),
            region_size_exponent: 4,
            sco_size: 8,
            cluster_size_exponent: 9,
            fill_ratio: 0.5,
            max_tlog_entries: 16,
            max_relocation_entries: 8,
            prefetch: false,
            verbose: true,
            tlog: TLogConfig::for_testing(),
        }
    }
}

/// Scrubber configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScrubberConfigError {
    /// Fill ratio must be between 0 and 1.
    #[error("Fill ratio {0} not between 0.0 and 1.0")]
    FillRatioOutOfRange(f32),

    /// SCO size must be at least one cluster and addressable by an offset.
    #[error("Invalid SCO size {0}")]
    InvalidScoSize(u32),

    /// Region size exponent exceeds the address space.
    #[error("Region size exponent {0} exceeds the cluster address space")]
    RegionTooLarge(u8),

    /// Cluster size exponent out of range.
    #[error("Invalid cluster size exponent {0}")]
    InvalidClusterSize(u8),

    /// TLog chunks must hold entries (relocation chunks at least one pair).
    #[error("TLog chunk sizes too small")]
    ZeroChunkSize,

    /// Reader/writer configuration is invalid.
    #[error("TLog configuration: {0}")]
    TLog(voltlog_durability::TLogConfigError),
}
