//! Scrub stage integration tests
//!
//! These tests drive the stages the way the scrub job does:
//! - Split -> region scrub -> merge keeps exactly the latest write per address
//! - Usage rows end up counting live clusters
//! - New SCO names are probed against the backend

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use voltlog_core::{ClusterLocation, ClusterLocationAndHash, LocationEntry, Sco, Weed};
use voltlog_durability::{
    Backend, FilePool, ForwardReader, LocalBackend, OverwriteObject, TLogConfig, TLogReader,
    TLogWriter,
};
use voltlog_scrub::{
    make_new_sco_name, Merger, PartScrubber, ScrubError, ScrubbingScoTable, Splitter,
    MAX_SCO_NAME_PROBES,
};

fn clh(number: u32, offset: u16) -> ClusterLocationAndHash {
    ClusterLocationAndHash::new(ClusterLocation::new(Sco::new(number, 0, 0), offset), Weed::null())
}

/// Write `addresses` in order, filling SCOs of `sco_size` clusters.
fn write_volume_tlog(path: &Path, addresses: &[u64], sco_size: u16) -> Vec<LocationEntry> {
    let mut w = TLogWriter::create(path).unwrap();
    let mut written = Vec::new();
    for (i, &address) in addresses.iter().enumerate() {
        let number = 1 + (i / sco_size as usize) as u32;
        let offset = (i % sco_size as usize) as u16;
        w.append_location(address, clh(number, offset)).unwrap();
        written.push(LocationEntry::new(address, clh(number, offset)));
        if offset == sco_size - 1 {
            w.append_sco_crc(number).unwrap();
        }
    }
    w.close().unwrap();
    written
}

/// Split, scrub every region and merge; returns the merged entries and
/// the usage table.
fn metadata_scrub(
    dir: &TempDir,
    input: &Path,
    region_size_exponent: u8,
) -> (Vec<LocationEntry>, ScrubbingScoTable) {
    let files = FilePool::new(dir.path().join("scratch")).unwrap();
    let config = TLogConfig::for_testing();
    let split = Splitter::new(&files, region_size_exponent, &config)
        .split(&mut ForwardReader::open(input).unwrap())
        .unwrap();

    let mut table = split.table;
    let mut scrubbed: Vec<PathBuf> = Vec::new();
    for (region, path) in &split.regions {
        let (out, _) = PartScrubber::new(&files, *region, region_size_exponent, &config)
            .scrub(path, &mut table)
            .unwrap();
        scrubbed.push(out);
    }

    let merged = dir.path().join("merged");
    Merger::backward(&scrubbed, &config)
        .unwrap()
        .merge(&merged, &config)
        .unwrap();

    let mut r = ForwardReader::open(&merged).unwrap();
    let mut entries = Vec::new();
    while let Some(e) = r.next_location().unwrap() {
        entries.push(e);
    }
    (entries, table)
}

#[test]
fn test_idempotent_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("tlog");
    let addresses: Vec<u64> = vec![5, 40, 3, 17, 0, 33, 2, 63, 18, 4];
    let written = write_volume_tlog(&input, &addresses, 4);

    let (merged, table) = metadata_scrub(&dir, &input, 4);

    let mut expected = written.clone();
    expected.sort_by_key(|e| e.location());
    assert_eq!(merged, expected);
    assert!(table.iter().all(|row| row.usage_count == row.size));
}

#[test]
fn test_latest_write_wins() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("tlog");
    // address 7 first in sco 1, then again in sco 2
    write_volume_tlog(&input, &[7, 1, 2, 3, 7, 8], 4);

    let (merged, table) = metadata_scrub(&dir, &input, 4);

    let sevens: Vec<&LocationEntry> = merged.iter().filter(|e| e.address == 7).collect();
    assert_eq!(sevens.len(), 1);
    assert_eq!(sevens[0].location(), ClusterLocation::new(Sco::new(2, 0, 0), 0));
    assert_eq!(merged.len(), 5);

    // the stale write takes exactly one use away from sco 1
    assert_eq!(table.row(0).sco, Sco::new(1, 0, 0));
    assert_eq!(table.row(0).size, 4);
    assert_eq!(table.row(0).usage_count, 3);
    assert_eq!(table.row(1).usage_count, 2);
}

#[test]
fn test_regions_are_independent() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("tlog");
    // same offset in two regions is not a duplicate
    write_volume_tlog(&input, &[1, 17, 33], 8);

    let (merged, table) = metadata_scrub(&dir, &input, 4);
    assert_eq!(merged.len(), 3);
    assert_eq!(table.row(0).usage_count, 3);
}

#[test]
fn test_new_sco_name_exhausted() {
    let dir = TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path().join("store"), "volume").unwrap();
    let base = Sco::new(3, 0, 7);
    let src = dir.path().join("object");
    std::fs::write(&src, b"sco").unwrap();

    for version in 0..=255u8 {
        if version != base.version() {
            backend
                .write(&src, &base.with_version(version).to_string(), OverwriteObject::Forbid, None)
                .unwrap();
        }
    }
    assert!(matches!(
        make_new_sco_name(&backend, base),
        Err(ScrubError::ScoNameExhausted(sco)) if sco == base
    ));

    // freeing the last probe makes it the answer
    let last = base.with_version(base.version().wrapping_add(MAX_SCO_NAME_PROBES as u8));
    assert_eq!(last, base.with_version(6));
    backend
        .remove(&last.to_string(), voltlog_durability::ObjectMayNotExist::No)
        .unwrap();
    assert_eq!(make_new_sco_name(&backend, base).unwrap(), last);
}

#[test]
fn test_new_sco_name_first_free() {
    let dir = TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path().join("store"), "volume").unwrap();
    let base = Sco::new(3, 0, 0);
    assert_eq!(make_new_sco_name(&backend, base).unwrap(), base.with_version(1));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_one_entry_per_live_address(
        addresses in prop::collection::vec(0u64..64, 1..120),
    ) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("tlog");
        let written = write_volume_tlog(&input, &addresses, 8);

        let (merged, table) = metadata_scrub(&dir, &input, 4);

        let mut latest: BTreeMap<u64, ClusterLocation> = BTreeMap::new();
        for e in &written {
            latest.insert(e.address, e.location());
        }
        prop_assert_eq!(merged.len(), latest.len());
        for e in &merged {
            prop_assert_eq!(latest[&e.address], e.location());
        }
        // merged output is in location order
        prop_assert!(merged.windows(2).all(|w| w[0].location() < w[1].location()));

        let live: u64 = table.iter().map(|r| r.usage_count as u64).sum();
        prop_assert_eq!(live, latest.len() as u64);
    }
}
