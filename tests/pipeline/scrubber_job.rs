//! Full scrub job runs

use crate::common::*;
use voltlog_durability::TLogError;
use voltlog_scrub::{ScrubError, ScrubResult, Scrubber};

/// Volume with SCOs 1 and 2 full (addresses 0..16) and SCO 3 rewriting
/// addresses 0..6. SCO 1 keeps two live clusters and gets scrubbed.
pub fn sparse_volume() -> (TestVolume, Vec<TLogId>) {
    let mut vol = TestVolume::new();
    vol.config = vol
        .config
        .clone()
        .with_region_size_exponent(3)
        .with_max_tlog_entries(10);

    vol.upload_sco(1, 8);
    vol.upload_sco(2, 8);
    vol.upload_sco(3, 6);

    let first: Vec<(u64, u32, u16)> = (0..16u32).map(|a| (a as u64, 1 + a / 8, (a % 8) as u16)).collect();
    let second: Vec<(u64, u32, u16)> = (0..6u32).map(|a| (a as u64, 3, a as u16)).collect();
    let ids = vec![vol.upload_tlog(&first), vol.upload_tlog(&second)];
    (vol, ids)
}

pub fn scrub(vol: &TestVolume, ids: &[TLogId], access: &ScoAccessData) -> ScrubResult {
    Scrubber::new(vol.config.clone(), vol.backend.clone_backend())
        .unwrap()
        .run(ids, access)
        .unwrap()
}

/// Byte the volume last wrote to `address` in `sparse_volume`.
fn latest_byte(address: u64) -> u8 {
    if address < 6 {
        cluster_byte(3, address as u16)
    } else {
        cluster_byte(1 + address as u32 / 8, (address % 8) as u16)
    }
}

#[test]
fn sparse_sco_is_compacted() {
    let (mut vol, ids) = sparse_volume();
    let mut access = ScoAccessData::new();
    access.insert(Sco::new(1, 0, 0), 0.8);

    let result = scrub(&vol, &ids, &access);
    let new_sco = Sco::new(1, 0, 1);

    assert_eq!(result.tlog_names_in, ids);
    assert_eq!(result.new_scos, vec![new_sco]);
    assert_eq!(result.scos_to_delete, vec![Sco::new(1, 0, 0)]);
    assert_eq!(result.prefetch, vec![(new_sco, 0.8)]);
    assert_eq!(result.relocation_count, 2);
    assert_eq!(result.relocations.len(), 1);

    // 2 relocated + 8 in SCO 2 fill the first TLog; SCO 3 goes to the next
    assert_eq!(result.tlogs_out.len(), 2);
    let mut live = Vec::new();
    for (i, tlog) in result.tlogs_out.iter().enumerate() {
        assert!(tlog.written_to_backend());
        let entries = vol.tlog_locations(&tlog.name());
        assert_eq!(entries.len(), if i == 0 { 10 } else { 6 });
        live.extend(entries);
    }

    let mut addresses: Vec<u64> = live.iter().map(|e| e.address).collect();
    addresses.sort_unstable();
    assert_eq!(addresses, (0..16).collect::<Vec<u64>>());

    for e in &live {
        let data = vol.cluster_data(e.location());
        assert!(
            data.iter().all(|&b| b == latest_byte(e.address)),
            "wrong data for address {} at {}",
            e.address,
            e.location()
        );
    }

    let moved: Vec<u64> = live
        .iter()
        .filter(|e| e.location().sco() == new_sco)
        .map(|e| e.address)
        .collect();
    assert_eq!(moved, vec![6, 7]);

    let relocations = vol.tlog_locations(&result.relocations[0]);
    assert_eq!(relocations.len(), 4);
    assert_eq!(relocations[0].address, 6);
    assert_eq!(relocations[0].location(), ClusterLocation::new(Sco::new(1, 0, 0), 6));
    assert_eq!(relocations[1].location(), ClusterLocation::new(new_sco, 0));

    // running never deletes anything
    assert!(vol.backend.exists(&Sco::new(1, 0, 0).to_string()).unwrap());
    for id in &ids {
        assert!(vol.backend.exists(&id.name()).unwrap());
    }
}

#[test]
fn prefetched_run_matches_plain_run() {
    let (vol, ids) = sparse_volume();
    let plain = scrub(&vol, &ids, &ScoAccessData::new());

    let (mut vol, ids) = sparse_volume();
    vol.config = vol.config.clone().with_prefetch(true);
    let prefetched = scrub(&vol, &ids, &ScoAccessData::new());

    assert_eq!(prefetched.new_scos, plain.new_scos);
    assert_eq!(prefetched.scos_to_delete, plain.scos_to_delete);
    assert_eq!(prefetched.relocation_count, plain.relocation_count);
    assert_eq!(prefetched.tlogs_out.len(), plain.tlogs_out.len());
}

#[test]
fn duplicate_free_tlogs_come_back_unchanged() {
    let mut vol = TestVolume::new();
    vol.config = vol.config.clone().with_fill_ratio(0.0);
    let first: Vec<(u64, u32, u16)> = (0..8u32).map(|a| (a as u64 * 3, 1, a as u16)).collect();
    let second: Vec<(u64, u32, u16)> = (0..5u32).map(|a| (a as u64 * 3 + 1, 2, a as u16)).collect();
    let ids = vec![vol.upload_tlog(&first), vol.upload_tlog(&second)];

    let result = scrub(&vol, &ids, &ScoAccessData::new());

    assert!(result.new_scos.is_empty());
    assert!(result.scos_to_delete.is_empty());
    assert!(result.relocations.is_empty());
    assert_eq!(result.relocation_count, 0);

    let mut out: Vec<(u64, ClusterLocation)> = Vec::new();
    for tlog in &result.tlogs_out {
        out.extend(
            vol.tlog_locations(&tlog.name())
                .into_iter()
                .map(|e| (e.address, e.location())),
        );
    }
    let expected: Vec<(u64, ClusterLocation)> = first
        .iter()
        .chain(second.iter())
        .map(|&(a, n, o)| (a, ClusterLocation::new(Sco::new(n, 0, 0), o)))
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn missing_tlog_fails_the_job() {
    let vol = TestVolume::new();
    let scrubber = Scrubber::new(vol.config.clone(), vol.backend.clone_backend()).unwrap();
    let result = scrubber.run(&[TLogId::new()], &ScoAccessData::new());
    assert!(matches!(result, Err(ScrubError::TLog(TLogError::Backend(_)))));
}

#[test]
fn missing_sco_data_fails_the_job() {
    let (vol, ids) = sparse_volume();
    vol.backend
        .remove(&Sco::new(1, 0, 0).to_string(), voltlog_durability::ObjectMayNotExist::No)
        .unwrap();
    let scrubber = Scrubber::new(vol.config.clone(), vol.backend.clone_backend()).unwrap();
    assert!(matches!(
        scrubber.run(&ids, &ScoAccessData::new()),
        Err(ScrubError::Backend(_))
    ));
}
