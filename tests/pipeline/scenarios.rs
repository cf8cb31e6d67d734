//! Stage-by-stage scenarios
//!
//! Runs split, region scrub, merge and pool by hand so the usage table can
//! be inspected after the pool.

use crate::common::*;
use voltlog_scrub::{Merger, PartScrubber, Pool, PoolOutput, ScoState, ScrubbingScoTable, Splitter};

/// Run every stage up to and including the pool over the local TLog at
/// `input`.
fn scrub_stages(vol: &TestVolume, input: &std::path::Path) -> (PoolOutput, ScrubbingScoTable) {
    let files = FilePool::new(vol.scratch()).unwrap();
    let tlog = &vol.config.tlog;
    let exponent = vol.config.region_size_exponent;

    let split = Splitter::new(&files, exponent, tlog)
        .split(&mut ForwardReader::open(input).unwrap())
        .unwrap();
    let mut table = split.table;

    let mut scrubbed = Vec::new();
    for (region, path) in &split.regions {
        let (out, _) = PartScrubber::new(&files, *region, exponent, tlog)
            .scrub(path, &mut table)
            .unwrap();
        scrubbed.push(out);
    }

    let merged_path = vol.dir.path().join("merged");
    let merged = Merger::backward(&scrubbed, tlog)
        .unwrap()
        .merge(&merged_path, tlog)
        .unwrap();

    let access = ScoAccessData::new();
    let out = Pool::new(
        &mut table,
        &files,
        &vol.backend,
        &access,
        &vol.config,
        merged.last_location.sco(),
    )
    .unwrap()
    .run(&merged_path)
    .unwrap();
    (out, table)
}

/// Every address of `0..addresses` written once into SCOs `1..`, then
/// again into the SCOs after them.
fn write_twice(path: &std::path::Path, addresses: u32, sco_size: u32) {
    let mut w = TLogWriter::create(path).unwrap();
    let scos_per_pass = addresses / sco_size;
    for pass in 0..2 {
        for a in 0..addresses {
            let number = 1 + pass * scos_per_pass + a / sco_size;
            let offset = (a % sco_size) as u16;
            w.append_location(a as u64, clh(number, offset)).unwrap();
            if offset as u32 == sco_size - 1 {
                w.append_sco_crc(number).unwrap();
            }
        }
    }
    w.close().unwrap();
}

#[test]
fn two_regions_threshold_one_keeps_everything_in_place() {
    let mut vol = TestVolume::new();
    // 32 addresses over two regions of 16, one live cluster is enough
    vol.config = vol
        .config
        .clone()
        .with_region_size_exponent(4)
        .with_fill_ratio(0.125);
    assert_eq!(vol.config.minimum_used_entries(), 1);

    let input = vol.dir.path().join("tlog");
    write_twice(&input, 32, vol.config.sco_size);

    let (out, table) = scrub_stages(&vol, &input);

    for row in table.iter() {
        if row.sco.number() <= 4 {
            assert_eq!(row.usage_count, 0, "{}", row.sco);
            assert_eq!(row.state, ScoState::Scrubbed, "{}", row.sco);
        } else {
            assert_eq!(row.usage_count, 8, "{}", row.sco);
            assert_eq!(row.state, ScoState::NotScrubbed, "{}", row.sco);
        }
    }

    assert_eq!(out.relocation_count, 0);
    assert!(read_locations(&out.relocations).is_empty());
    assert!(read_locations(&out.rewritten).is_empty());
    assert!(out.new_scos.is_empty());
    assert_eq!(out.scos_read, 0);

    let kept = read_locations(&out.nonrewritten);
    assert_eq!(kept.len(), 32);
    assert!(kept.iter().all(|e| e.location().number() >= 5));
}

#[test]
fn fully_superseded_sco_is_scrubbed_and_dropped() {
    let mut vol = TestVolume::new();
    vol.config = vol.config.clone().with_region_size_exponent(4);

    let input = vol.dir.path().join("tlog");
    write_twice(&input, 8, vol.config.sco_size);

    let (out, table) = scrub_stages(&vol, &input);

    assert_eq!(table.row(0).sco, Sco::new(1, 0, 0));
    assert_eq!(table.row(0).usage_count, 0);
    assert_eq!(table.row(0).state, ScoState::Scrubbed);
    assert_eq!(out.scos_to_delete, vec![Sco::new(1, 0, 0)]);
    assert!(read_locations(&out.nonrewritten)
        .iter()
        .all(|e| e.location().sco() != Sco::new(1, 0, 0)));
}
