//! Running CRC32 checksum
//!
//! Every TLog and every SCO carries a CRC32 computed over its raw bytes.
//! `CheckSum` accumulates that value incrementally; the current value can
//! be read at any point without ending the accumulation.

use std::fmt;

/// Incremental CRC32 (IEEE) over a byte stream.
#[derive(Clone, Default)]
pub struct CheckSum {
    hasher: crc32fast::Hasher,
}

impl CheckSum {
    /// Create an empty checksum.
    pub fn new() -> Self {
        CheckSum {
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Checksum that resumes from a previously computed `value`.
    pub fn with_value(value: u32) -> Self {
        CheckSum {
            hasher: crc32fast::Hasher::new_with_initial(value),
        }
    }

    /// Feed bytes into the checksum.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Current value over everything fed so far.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Start over from the empty checksum.
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// Checksum of a complete buffer.
    pub fn of(bytes: &[u8]) -> u32 {
        crc32fast::hash(bytes)
    }
}

impl fmt::Debug for CheckSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSum")
            .field("value", &format_args!("{:#010x}", self.value()))
            .finish()
    }
}

impl PartialEq for CheckSum {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for CheckSum {}
