//! TLog bookkeeping
//!
//! A volume's write history is a sequence of TLogs, oldest first. Each TLog
//! is written locally, then uploaded; once uploaded it stays uploaded, so
//! the `written_to_backend` flags over a `TLogs` sequence always look like
//! `true* false*`.
//!
//! A TLog is stored under the name `tlog_<uuid>` both locally and on the
//! backend.

use crate::error::TLogsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, warn};
use uuid::Uuid;

/// Prefix of every TLog object name.
pub const TLOG_NAME_PREFIX: &str = "tlog_";

/// Unique identifier of a TLog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TLogId(Uuid);

impl TLogId {
    /// Create a new random id.
    pub fn new() -> Self {
        TLogId(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        TLogId(uuid)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Object name for this id (`tlog_<uuid>`).
    pub fn name(&self) -> String {
        format!("{}{}", TLOG_NAME_PREFIX, self.0)
    }

    /// Parse an object name of the form `tlog_<uuid>`.
    pub fn from_name(name: &str) -> Option<Self> {
        name.strip_prefix(TLOG_NAME_PREFIX)?
            .parse::<Uuid>()
            .ok()
            .map(TLogId)
    }
}

impl Default for TLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TLogId(s.parse()?))
    }
}

/// One TLog of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TLog {
    id: TLogId,
    written_to_backend: bool,
    backend_size: u64,
}

impl TLog {
    /// New TLog with a fresh id, not yet written to the backend.
    pub fn new() -> Self {
        Self::with_id(TLogId::new())
    }

    /// New TLog with the given id, not yet written to the backend.
    pub fn with_id(id: TLogId) -> Self {
        TLog {
            id,
            written_to_backend: false,
            backend_size: 0,
        }
    }

    /// Id
    pub fn id(&self) -> TLogId {
        self.id
    }

    /// Object name (`tlog_<uuid>`)
    pub fn name(&self) -> String {
        self.id.name()
    }

    /// Whether the TLog has been uploaded.
    pub fn written_to_backend(&self) -> bool {
        self.written_to_backend
    }

    /// Record whether the TLog has been uploaded.
    pub fn set_written_to_backend(&mut self, written: bool) {
        self.written_to_backend = written;
    }

    /// Size of the uploaded object in bytes.
    pub fn backend_size(&self) -> u64 {
        self.backend_size
    }

    /// Record the size of the uploaded object.
    pub fn set_backend_size(&mut self, size: u64) {
        self.backend_size = size;
    }

    /// Whether `name` is a well-formed TLog object name.
    pub fn is_tlog_name(name: &str) -> bool {
        TLogId::from_name(name).is_some()
    }
}

impl Default for TLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered sequence of TLogs, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TLogs {
    tlogs: Vec<TLog>,
}

impl TLogs {
    /// Empty sequence.
    pub fn new() -> Self {
        TLogs { tlogs: Vec::new() }
    }

    /// Append a TLog at the end.
    ///
    /// The caller keeps the write-monotonicity: a TLog marked written may
    /// only follow written TLogs.
    pub fn push(&mut self, tlog: TLog) {
        debug_assert!(
            !tlog.written_to_backend()
                || self.tlogs.last().map_or(true, |t| t.written_to_backend())
        );
        self.tlogs.push(tlog);
    }

    /// Number of TLogs
    pub fn len(&self) -> usize {
        self.tlogs.len()
    }

    /// Whether the sequence is empty
    pub fn is_empty(&self) -> bool {
        self.tlogs.is_empty()
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, TLog> {
        self.tlogs.iter()
    }

    /// Look up a TLog by id.
    pub fn get(&self, id: &TLogId) -> Option<&TLog> {
        self.tlogs.iter().find(|t| t.id == *id)
    }

    /// Ids, oldest first.
    pub fn ordered_ids(&self) -> Vec<TLogId> {
        self.tlogs.iter().map(|t| t.id).collect()
    }

    /// Ids, newest first.
    pub fn reverse_ordered_ids(&self) -> Vec<TLogId> {
        self.tlogs.iter().rev().map(|t| t.id).collect()
    }

    /// Whether the sequence contains `id`.
    pub fn is_referenced(&self, id: &TLogId) -> bool {
        self.get(id).is_some()
    }

    /// Leading run of TLogs that are on the backend.
    pub fn tlogs_on_backend(&self) -> TLogs {
        TLogs {
            tlogs: self
                .tlogs
                .iter()
                .take_while(|t| t.written_to_backend)
                .cloned()
                .collect(),
        }
    }

    /// Whether every TLog is on the backend.
    pub fn all_written_to_backend(&self) -> bool {
        self.tlogs.iter().all(|t| t.written_to_backend)
    }

    /// Whether `id` is on the backend; `None` if the id is unknown.
    pub fn is_written_to_backend(&self, id: &TLogId) -> Option<bool> {
        self.get(id).map(|t| t.written_to_backend)
    }

    /// Sum of the backend sizes of all TLogs.
    pub fn backend_size(&self) -> u64 {
        self.tlogs.iter().map(|t| t.backend_size).sum()
    }

    /// Mark `id` as written (or not) to the backend.
    ///
    /// Returns `Ok(false)` if the id is unknown. Marking a TLog written while
    /// an earlier one is still unwritten would break monotonicity and is
    /// rejected.
    pub fn set_written_to_backend(&mut self, id: &TLogId, written: bool) -> Result<bool, TLogsError> {
        for tlog in self.tlogs.iter_mut() {
            if tlog.id == *id {
                tlog.written_to_backend = written;
                return Ok(true);
            } else if written && !tlog.written_to_backend {
                error!(
                    tlog = %tlog.id,
                    marking = %id,
                    "predecessor not written to backend"
                );
                return Err(TLogsError::UnwrittenPredecessor {
                    id: *id,
                    predecessor: tlog.id,
                });
            }
        }
        Ok(false)
    }

    /// Atomically replace the TLogs with the result of a scrub.
    ///
    /// `expected` must equal the ids of the whole sequence, in order; the
    /// sequence then becomes `replacement`. Nothing is changed if the
    /// sequence differs in any way or the replacement is empty.
    pub fn replace(&mut self, expected: &[TLogId], replacement: Vec<TLog>) -> Result<(), TLogsError> {
        let unchanged = expected.len() == self.tlogs.len()
            && self
                .tlogs
                .iter()
                .zip(expected.iter())
                .all(|(t, id)| t.id == *id);

        if !unchanged {
            warn!(
                expected = expected.len(),
                present = self.tlogs.len(),
                "not replacing TLogs, sequence has changed"
            );
            return Err(TLogsError::StalePrefix {
                expected: expected.to_vec(),
            });
        }

        if replacement.is_empty() {
            error!("result of a scrub cannot be empty, refusing replace");
            return Err(TLogsError::EmptyReplacement);
        }

        self.tlogs = replacement;
        Ok(())
    }

    /// Drop every TLog after `id`, optionally fixing the backend size of `id`.
    ///
    /// Returns `false` (and changes nothing) if `id` is unknown.
    pub fn snip(&mut self, id: &TLogId, backend_size: Option<u64>) -> bool {
        match self.tlogs.iter().position(|t| t.id == *id) {
            None => false,
            Some(pos) => {
                if let Some(size) = backend_size {
                    self.tlogs[pos].backend_size = size;
                }
                self.tlogs.truncate(pos + 1);
                true
            }
        }
    }

    /// Collect the ids of the leading written TLogs and drop everything
    /// from the first unwritten one on.
    ///
    /// Returns the written ids and the id of the first unwritten TLog, if any.
    pub fn take_unwritten_tail(&mut self) -> (Vec<TLogId>, Option<TLogId>) {
        let split = self
            .tlogs
            .iter()
            .position(|t| !t.written_to_backend)
            .unwrap_or(self.tlogs.len());

        let written = self.tlogs[..split].iter().map(|t| t.id).collect();
        let first_unwritten = self.tlogs.get(split).map(|t| t.id);
        self.tlogs.truncate(split);
        (written, first_unwritten)
    }

    /// Written TLogs newest first, stopping at `cork`.
    ///
    /// Returns whether the cork was found along with the ids collected
    /// before reaching it. A cork that is not on the backend is an error.
    pub fn reversed_on_backend_since_cork(
        &self,
        cork: Option<&TLogId>,
    ) -> Result<(bool, Vec<TLogId>), TLogsError> {
        let mut ids = Vec::new();
        for tlog in self.tlogs.iter().rev() {
            if Some(&tlog.id) == cork {
                if !tlog.written_to_backend {
                    return Err(TLogsError::CorkNotOnBackend(tlog.id));
                }
                return Ok((true, ids));
            } else if tlog.written_to_backend {
                ids.push(tlog.id);
            }
        }
        Ok((false, ids))
    }
}

impl FromIterator<TLog> for TLogs {
    fn from_iter<I: IntoIterator<Item = TLog>>(iter: I) -> Self {
        TLogs {
            tlogs: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TLogs {
    type Item = TLog;
    type IntoIter = std::vec::IntoIter<TLog>;

    fn into_iter(self) -> Self::IntoIter {
        self.tlogs.into_iter()
    }
}

impl<'a> IntoIterator for &'a TLogs {
    type Item = &'a TLog;
    type IntoIter = std::slice::Iter<'a, TLog>;

    fn into_iter(self) -> Self::IntoIter {
        self.tlogs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(size: u64) -> TLog {
        let mut t = TLog::new();
        t.set_written_to_backend(true);
        t.set_backend_size(size);
        t
    }

    #[test]
    fn test_tlog_name() {
        let t = TLog::new();
        let name = t.name();
        assert!(name.starts_with("tlog_"));
        assert!(TLog::is_tlog_name(&name));
        assert_eq!(TLogId::from_name(&name), Some(t.id()));
        assert!(!TLog::is_tlog_name("tlog_nonsense"));
        assert!(!TLog::is_tlog_name(&t.id().to_string()));
    }

    #[test]
    fn test_replace_whole_sequence() {
        let mut tlogs: TLogs = vec![written(1), written(2), written(3)].into_iter().collect();
        let ids = tlogs.ordered_ids();
        let first = written(10);
        let second = written(11);
        let out = vec![first.id(), second.id()];

        tlogs.replace(&ids, vec![first, second]).unwrap();
        assert_eq!(tlogs.ordered_ids(), out);
        assert!(tlogs.all_written_to_backend());
    }

    #[test]
    fn test_replace_partial_match_rejected() {
        let mut tlogs: TLogs = vec![written(1), written(2), written(3)].into_iter().collect();
        let before = tlogs.clone();
        let ids = tlogs.ordered_ids();

        // matches the first two of three
        let err = tlogs.replace(&ids[..2], vec![written(10)]).unwrap_err();
        assert!(matches!(err, TLogsError::StalePrefix { .. }));
        assert_eq!(tlogs, before);

        // same length, different order
        let swapped = vec![ids[1], ids[0], ids[2]];
        assert!(tlogs.replace(&swapped, vec![written(10)]).is_err());
        assert_eq!(tlogs, before);
    }

    #[test]
    fn test_replace_stale_prefix_rejected() {
        let mut tlogs: TLogs = vec![written(1), written(2)].into_iter().collect();
        let before = tlogs.clone();
        let bogus = vec![TLogId::new()];

        let err = tlogs.replace(&bogus, vec![written(3)]).unwrap_err();
        assert!(matches!(err, TLogsError::StalePrefix { .. }));
        assert_eq!(tlogs, before);

        // longer than the sequence
        let mut too_long = before.ordered_ids();
        too_long.push(TLogId::new());
        assert!(tlogs.replace(&too_long, vec![written(3)]).is_err());
        assert_eq!(tlogs, before);
    }

    #[test]
    fn test_replace_empty_rejected() {
        let mut tlogs: TLogs = vec![written(1)].into_iter().collect();
        let before = tlogs.clone();
        let ids = tlogs.ordered_ids();
        assert_eq!(tlogs.replace(&ids, vec![]), Err(TLogsError::EmptyReplacement));
        assert_eq!(tlogs, before);
    }

    #[test]
    fn test_snip() {
        let mut tlogs: TLogs = vec![written(1), written(2), TLog::new()].into_iter().collect();
        let ids = tlogs.ordered_ids();

        assert!(!tlogs.snip(&TLogId::new(), None));
        assert_eq!(tlogs.len(), 3);

        assert!(tlogs.snip(&ids[1], Some(42)));
        assert_eq!(tlogs.ordered_ids(), ids[..2].to_vec());
        assert_eq!(tlogs.get(&ids[1]).unwrap().backend_size(), 42);
        assert_eq!(tlogs.backend_size(), 43);
    }

    #[test]
    fn test_set_written_to_backend_monotone() {
        let mut tlogs: TLogs = vec![TLog::new(), TLog::new()].into_iter().collect();
        let ids = tlogs.ordered_ids();

        assert!(matches!(
            tlogs.set_written_to_backend(&ids[1], true),
            Err(TLogsError::UnwrittenPredecessor { .. })
        ));
        assert_eq!(tlogs.set_written_to_backend(&ids[0], true), Ok(true));
        assert_eq!(tlogs.set_written_to_backend(&ids[1], true), Ok(true));
        assert_eq!(tlogs.set_written_to_backend(&TLogId::new(), true), Ok(false));
        assert!(tlogs.all_written_to_backend());
    }

    #[test]
    fn test_is_written_to_backend_tristate() {
        let tlogs: TLogs = vec![written(1), TLog::new()].into_iter().collect();
        let ids = tlogs.ordered_ids();
        assert_eq!(tlogs.is_written_to_backend(&ids[0]), Some(true));
        assert_eq!(tlogs.is_written_to_backend(&ids[1]), Some(false));
        assert_eq!(tlogs.is_written_to_backend(&TLogId::new()), None);
    }

    #[test]
    fn test_take_unwritten_tail() {
        let mut tlogs: TLogs = vec![written(1), written(2), TLog::new(), TLog::new()]
            .into_iter()
            .collect();
        let ids = tlogs.ordered_ids();
        let (on_backend, first) = tlogs.take_unwritten_tail();
        assert_eq!(on_backend, ids[..2].to_vec());
        assert_eq!(first, Some(ids[2]));
        assert_eq!(tlogs.len(), 2);

        let (_, first) = tlogs.take_unwritten_tail();
        assert_eq!(first, None);
    }

    #[test]
    fn test_tlogs_on_backend_and_reverse() {
        let tlogs: TLogs = vec![written(1), written(2), TLog::new()].into_iter().collect();
        let ids = tlogs.ordered_ids();
        assert_eq!(tlogs.tlogs_on_backend().ordered_ids(), ids[..2].to_vec());
        assert_eq!(
            tlogs.reverse_ordered_ids(),
            ids.iter().rev().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_reversed_since_cork() {
        let tlogs: TLogs = vec![written(1), written(2), written(3), TLog::new()]
            .into_iter()
            .collect();
        let ids = tlogs.ordered_ids();

        let (found, rev) = tlogs.reversed_on_backend_since_cork(Some(&ids[0])).unwrap();
        assert!(found);
        assert_eq!(rev, vec![ids[2], ids[1]]);

        let (found, rev) = tlogs.reversed_on_backend_since_cork(None).unwrap();
        assert!(!found);
        assert_eq!(rev, vec![ids[2], ids[1], ids[0]]);

        assert!(matches!(
            tlogs.reversed_on_backend_since_cork(Some(&ids[3])),
            Err(TLogsError::CorkNotOnBackend(_))
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let tlogs: TLogs = vec![written(7), TLog::new()].into_iter().collect();
        let json = serde_json::to_string(&tlogs).unwrap();
        let back: TLogs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tlogs);
    }
}
