//! Shared test utilities for the integration test suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::{Path, PathBuf};
pub use tempfile::TempDir;
pub use voltlog_core::{
    ClusterLocation, ClusterLocationAndHash, LocationEntry, Sco, TLog, TLogId, TLogs, Weed,
};
pub use voltlog_durability::{
    Backend, FilePool, ForwardReader, InsistOnLatest, LocalBackend, OverwriteObject, TLogConfig,
    TLogReader, TLogWriter,
};
pub use voltlog_scrub::{ScoAccessData, ScrubberConfig};

// ============================================================================
// Test volume
// ============================================================================

/// Backend namespace plus scratch space for one simulated volume.
pub struct TestVolume {
    pub dir: TempDir,
    pub backend: LocalBackend,
    pub config: ScrubberConfig,
    uploads: u64,
}

impl TestVolume {
    /// Volume using `ScrubberConfig::for_testing`.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().join("store"), "volume").unwrap();
        let config = ScrubberConfig::for_testing(dir.path().join("scratch"));
        TestVolume {
            dir,
            backend,
            config,
            uploads: 0,
        }
    }

    /// Scratch directory of the scrub job.
    pub fn scratch(&self) -> &Path {
        &self.config.scratch_dir
    }

    fn staging(&mut self) -> PathBuf {
        self.uploads += 1;
        let staging = self.dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        staging.join(format!("upload-{}", self.uploads))
    }

    /// Write and upload a TLog with `entries` (address, sco number,
    /// offset), closing each SCO with a SCO CRC.
    pub fn upload_tlog(&mut self, entries: &[(u64, u32, u16)]) -> TLogId {
        let path = self.staging();
        let mut w = TLogWriter::create(&path).unwrap();
        let mut previous: Option<u32> = None;
        for &(address, number, offset) in entries {
            if let Some(p) = previous {
                if p != number {
                    w.append_sco_crc(p).unwrap();
                }
            }
            w.append_location(address, clh(number, offset)).unwrap();
            previous = Some(number);
        }
        if let Some(p) = previous {
            w.append_sco_crc(p).unwrap();
        }
        w.close().unwrap();

        let id = TLogId::new();
        self.backend
            .write(&path, &id.name(), OverwriteObject::Forbid, None)
            .unwrap();
        id
    }

    /// Upload SCO `number` with `clusters` clusters, each filled with its
    /// `cluster_byte`.
    pub fn upload_sco(&mut self, number: u32, clusters: u16) {
        let size = self.config.cluster_size() as usize;
        let mut data = Vec::with_capacity(size * clusters as usize);
        for offset in 0..clusters {
            data.extend(std::iter::repeat(cluster_byte(number, offset)).take(size));
        }
        let path = self.staging();
        std::fs::write(&path, &data).unwrap();
        self.backend
            .write(&path, &Sco::new(number, 0, 0).to_string(), OverwriteObject::Forbid, None)
            .unwrap();
    }

    /// Location entries of the TLog `name` on the backend.
    pub fn tlog_locations(&mut self, name: &str) -> Vec<LocationEntry> {
        let path = self.staging();
        self.backend.read(&path, name, InsistOnLatest::No).unwrap();
        read_locations(&path)
    }

    /// Data of the cluster at `location` on the backend.
    pub fn cluster_data(&mut self, location: ClusterLocation) -> Vec<u8> {
        let path = self.staging();
        self.backend
            .read(&path, &location.sco().to_string(), InsistOnLatest::No)
            .unwrap();
        let data = std::fs::read(&path).unwrap();
        let size = self.config.cluster_size() as usize;
        let start = location.offset() as usize * size;
        data[start..start + size].to_vec()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Location in SCO `number` (clone 0, version 0) with a null digest.
pub fn clh(number: u32, offset: u16) -> ClusterLocationAndHash {
    ClusterLocationAndHash::new(ClusterLocation::new(Sco::new(number, 0, 0), offset), Weed::null())
}

/// Byte filling cluster `offset` of test SCO `number`.
pub fn cluster_byte(number: u32, offset: u16) -> u8 {
    (number * 16 + offset as u32) as u8
}

/// All location entries of a local TLog, oldest first.
pub fn read_locations(path: &Path) -> Vec<LocationEntry> {
    let mut r = ForwardReader::open(path).unwrap();
    let mut out = Vec::new();
    while let Some(e) = r.next_location().unwrap() {
        out.push(e);
    }
    out
}
