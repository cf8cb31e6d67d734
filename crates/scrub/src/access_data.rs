//! Per-SCO access frequencies
//!
//! Volumes record how often each SCO is read. The scrubber averages these
//! over the clusters it copies into a new SCO, so the volume can prefetch
//! the new SCOs with the same priority the old ones had.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use voltlog_core::Sco;

/// Access frequency per SCO, normalized to `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoAccessData {
    frequencies: HashMap<Sco, f32>,
}

impl ScoAccessData {
    /// Empty table; every SCO has frequency zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frequency of `sco`.
    pub fn insert(&mut self, sco: Sco, frequency: f32) {
        self.frequencies.insert(sco, frequency);
    }

    /// Frequency of `sco`, zero if unknown.
    pub fn get(&self, sco: &Sco) -> f32 {
        self.frequencies.get(sco).copied().unwrap_or(0.0)
    }

    /// Number of SCOs with a recorded frequency
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// Whether no frequencies are recorded
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

impl FromIterator<(Sco, f32)> for ScoAccessData {
    fn from_iter<I: IntoIterator<Item = (Sco, f32)>>(iter: I) -> Self {
        ScoAccessData {
            frequencies: iter.into_iter().collect(),
        }
    }
}
