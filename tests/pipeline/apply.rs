//! Publishing and adopting scrub results

use crate::common::*;
use crate::scrubber_job::{scrub, sparse_volume};
use voltlog_core::TLogsError;
use voltlog_scrub::{is_scrubbing_result_name, ScrubError, ScrubResult, Scrubber};

fn tlogs_of(ids: &[TLogId]) -> TLogs {
    ids.iter()
        .map(|id| {
            let mut tlog = TLog::with_id(*id);
            tlog.set_written_to_backend(true);
            tlog
        })
        .collect()
}

#[test]
fn published_result_round_trips() {
    let (vol, ids) = sparse_volume();
    let scrubber = Scrubber::new(vol.config.clone(), vol.backend.clone_backend()).unwrap();
    let name = scrubber.run_and_publish(&ids, &ScoAccessData::new()).unwrap();

    assert!(is_scrubbing_result_name(&name));
    assert!(vol.backend.list_objects().unwrap().contains(&name));

    let fetched = ScrubResult::fetch(&vol.backend, &name, vol.dir.path()).unwrap();
    assert_eq!(fetched.tlog_names_in, ids);
    assert_eq!(fetched.new_scos, vec![Sco::new(1, 0, 1)]);
    assert_eq!(fetched.relocation_count, 2);
    for tlog in &fetched.tlogs_out {
        assert!(vol.backend.exists(&tlog.name()).unwrap());
    }
}

#[test]
fn apply_swaps_tlogs_and_deletes_garbage() {
    let (vol, ids) = sparse_volume();
    let result = scrub(&vol, &ids, &ScoAccessData::new());
    let mut tlogs = tlogs_of(&ids);

    result.apply(&mut tlogs, &vol.backend).unwrap();

    let expected: Vec<TLogId> = result.tlogs_out.iter().map(|t| t.id()).collect();
    assert_eq!(tlogs.ordered_ids(), expected);
    assert!(tlogs.all_written_to_backend());

    assert!(!vol.backend.exists(&Sco::new(1, 0, 0).to_string()).unwrap());
    assert!(vol.backend.exists(&Sco::new(1, 0, 1).to_string()).unwrap());
    for id in &ids {
        assert!(!vol.backend.exists(&id.name()).unwrap());
    }
}

#[test]
fn apply_after_volume_wrote_more_is_rejected() {
    let (mut vol, ids) = sparse_volume();
    let result = scrub(&vol, &ids, &ScoAccessData::new());

    // the volume wrote another TLog meanwhile
    let later = vol.upload_tlog(&[(3, 4, 0)]);
    let mut all = ids.clone();
    all.push(later);
    let mut tlogs = tlogs_of(&all);
    let before = tlogs.clone();

    assert!(matches!(
        result.apply(&mut tlogs, &vol.backend),
        Err(ScrubError::TLogs(TLogsError::StalePrefix { .. }))
    ));
    assert_eq!(tlogs, before);
    assert!(vol.backend.exists(&Sco::new(1, 0, 0).to_string()).unwrap());
    for id in &all {
        assert!(vol.backend.exists(&id.name()).unwrap());
    }
}

#[test]
fn apply_against_changed_tlogs_is_rejected() {
    let (vol, ids) = sparse_volume();
    let result = scrub(&vol, &ids, &ScoAccessData::new());

    // the first TLog is gone
    let mut tlogs = tlogs_of(&ids[1..]);
    let before = tlogs.clone();
    assert!(matches!(
        result.apply(&mut tlogs, &vol.backend),
        Err(ScrubError::TLogs(TLogsError::StalePrefix { .. }))
    ));
    assert_eq!(tlogs, before);
    assert!(vol.backend.exists(&Sco::new(1, 0, 0).to_string()).unwrap());
}
