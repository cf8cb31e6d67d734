//! Per-SCO usage table
//!
//! While splitting, every run of consecutive location entries in the same
//! SCO gets a row, in the order the runs appear (oldest first):
//!
//! ```text
//! row:    0          1          2          3
//!       ┌──────────┬──────────┬──────────┬──────────┐
//!       │ sco 1    │ sco 2    │ sco 3    │ sco 4    │
//!       │ size 8   │ size 8   │ size 8   │ size 3   │
//!       │ usage 8  │ usage 8  │ usage 8  │ usage 3  │
//!       └──────────┴──────────┴──────────┴──────────┘
//!                  ◄── RegionCursor (per region, newest first)
//!         PoolCursor ──►
//! ```
//!
//! `usage_count` starts equal to `size` and drops by one for every entry
//! the region scrubbers find superseded, so it ends up as the number of
//! live clusters in the SCO. The pool then walks the rows oldest first,
//! deciding per SCO whether its data is kept in place or relocated.

use crate::error::{Result, ScrubError};
use std::fmt;
use tracing::error;
use voltlog_core::Sco;

/// Scrub state of a SCO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoState {
    /// Not decided yet
    Unknown,
    /// Live data will be copied out; the SCO can be deleted afterwards
    Scrubbed,
    /// Dense enough to keep
    NotScrubbed,
    /// Scrubbed, and its name serves as the base for a new SCO
    Reused,
}

impl fmt::Display for ScoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoState::Unknown => "unknown",
            ScoState::Scrubbed => "scrubbed",
            ScoState::NotScrubbed => "not scrubbed",
            ScoState::Reused => "reused",
        };
        f.write_str(s)
    }
}

/// Usage of one SCO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubbingScoData {
    /// The SCO
    pub sco: Sco,
    /// Live clusters (after region scrubbing)
    pub usage_count: u32,
    /// Location entries seen for the SCO
    pub size: u32,
    /// Scrub decision
    pub state: ScoState,
}

impl ScrubbingScoData {
    /// Row for a SCO seen once.
    pub fn new(sco: Sco) -> Self {
        ScrubbingScoData {
            sco,
            usage_count: 1,
            size: 1,
            state: ScoState::Unknown,
        }
    }
}

/// All usage rows of a scrub job, oldest SCO first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrubbingScoTable {
    rows: Vec<ScrubbingScoData>,
}

impl ScrubbingScoTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more location entry in `sco`.
    ///
    /// Extends the last row if it is for the same SCO, otherwise starts a
    /// new row.
    pub fn record(&mut self, sco: Sco) {
        match self.rows.last_mut() {
            Some(row) if row.sco == sco => {
                row.size += 1;
                row.usage_count += 1;
            }
            _ => self.rows.push(ScrubbingScoData::new(sco)),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at `index`
    pub fn row(&self, index: usize) -> &ScrubbingScoData {
        &self.rows[index]
    }

    /// Mutable row at `index`
    pub fn row_mut(&mut self, index: usize) -> &mut ScrubbingScoData {
        &mut self.rows[index]
    }

    /// Iterate rows oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, ScrubbingScoData> {
        self.rows.iter()
    }

    /// Mutably iterate rows oldest first.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ScrubbingScoData> {
        self.rows.iter_mut()
    }

    /// First row for `sco`.
    pub fn find(&self, sco: &Sco) -> Option<&ScrubbingScoData> {
        self.rows.iter().find(|r| r.sco == *sco)
    }
}

impl fmt::Display for ScrubbingScoTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(
                f,
                "{} size {} usage {} {}",
                row.sco, row.size, row.usage_count, row.state
            )?;
        }
        Ok(())
    }
}

impl FromIterator<ScrubbingScoData> for ScrubbingScoTable {
    fn from_iter<I: IntoIterator<Item = ScrubbingScoData>>(iter: I) -> Self {
        ScrubbingScoTable {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Cursor over the table for a region scrubbed newest entry first.
///
/// It starts past the newest row and only moves towards older rows.
#[derive(Debug)]
pub struct RegionCursor {
    // one past the row the cursor is on
    pos: usize,
}

impl RegionCursor {
    /// Cursor past the newest row of `table`.
    pub fn new(table: &ScrubbingScoTable) -> Self {
        RegionCursor { pos: table.len() }
    }

    /// Move to the nearest row for `sco` at or before the current one.
    pub fn seek(&mut self, table: &ScrubbingScoTable, sco: &Sco) -> Result<usize> {
        while self.pos > 0 {
            let index = self.pos - 1;
            if table.row(index).sco == *sco {
                return Ok(index);
            }
            self.pos -= 1;
        }
        error!(target: "voltlog::scrub", sco = %sco, "SCO not found in usage table");
        Err(ScrubError::UnknownSco(*sco))
    }
}
