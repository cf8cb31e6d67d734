//! Core types for volume transaction logs
//!
//! This module defines the addressing types shared by every layer:
//! - ClusterAddress: index of a cluster in the volume's address space
//! - Sco: name of a storage container object (number, clone id, version)
//! - ClusterLocation: a cluster inside a SCO (SCO + offset)
//! - Weed: 16-byte content digest stored alongside a location
//! - ClusterLocationAndHash: location + digest, the payload of a log entry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Index of a cluster in a volume's address space.
pub type ClusterAddress = u64;

/// Largest cluster address that can be recorded in a log entry (2^33 - 1).
pub const MAX_CLUSTER_ADDRESS: ClusterAddress = (1 << 33) - 1;

/// Sequence number of a SCO within a volume.
pub type ScoNumber = u32;

/// Offset of a cluster inside a SCO, in clusters.
pub type ScoOffset = u16;

/// Version of a SCO; bumped whenever a SCO is rewritten under the same number.
pub type ScoVersion = u8;

/// Clone id of a SCO; distinguishes SCOs inherited from a parent volume.
pub type ScoCloneId = u8;

/// Length of the canonical SCO name (`cc_nnnnnnnn_vv`).
pub const SCO_NAME_LEN: usize = 14;

/// Length of the canonical cluster location string (`<sco>:oooo`).
pub const CLUSTER_LOCATION_STRING_LEN: usize = SCO_NAME_LEN + 1 + 4;

/// Size of a packed `ClusterLocation`.
pub const CLUSTER_LOCATION_SIZE: usize = 8;

/// Size of a content digest.
pub const WEED_SIZE: usize = 16;

/// Errors produced while parsing SCO names and cluster location strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Input does not have the expected length.
    #[error("Invalid length for {what}: expected {expected}, got {actual}")]
    InvalidLength {
        /// What was being parsed
        what: &'static str,
        /// Expected length in characters
        expected: usize,
        /// Length of the input
        actual: usize,
    },

    /// Input is not in the expected layout.
    #[error("Malformed {what}: {input:?}")]
    Malformed {
        /// What was being parsed
        what: &'static str,
        /// The offending input
        input: String,
    },
}

/// Name of a storage container object.
///
/// A SCO is identified by its number, clone id and version. The number
/// 0 is reserved: a SCO with number 0 is the null SCO.
///
/// Canonical string form: `cc_nnnnnnnn_vv` (clone id, number, version;
/// lowercase hex, 14 characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sco {
    number: ScoNumber,
    clone_id: ScoCloneId,
    version: ScoVersion,
}

impl Sco {
    /// Create a SCO name.
    pub const fn new(number: ScoNumber, clone_id: ScoCloneId, version: ScoVersion) -> Self {
        Sco {
            number,
            clone_id,
            version,
        }
    }

    /// SCO number
    pub fn number(&self) -> ScoNumber {
        self.number
    }

    /// Clone id
    pub fn clone_id(&self) -> ScoCloneId {
        self.clone_id
    }

    /// Version
    pub fn version(&self) -> ScoVersion {
        self.version
    }

    /// Whether this is the null SCO (number 0).
    pub fn is_null(&self) -> bool {
        self.number == 0
    }

    /// Same SCO with a different version.
    pub fn with_version(&self, version: ScoVersion) -> Self {
        Sco { version, ..*self }
    }

    /// Check whether `s` is a well-formed SCO name.
    pub fn is_sco_name(s: &str) -> bool {
        s.parse::<Sco>().is_ok()
    }
}

impl fmt::Display for Sco {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}_{:08x}_{:02x}",
            self.clone_id, self.number, self.version
        )
    }
}

fn parse_hex_field<T>(field: &str, width: usize, what: &'static str, input: &str) -> Result<T, ParseError>
where
    T: TryFrom<u32>,
{
    let malformed = || ParseError::Malformed {
        what,
        input: input.to_string(),
    };
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    let value = u32::from_str_radix(field, 16).map_err(|_| malformed())?;
    T::try_from(value).map_err(|_| malformed())
}

impl FromStr for Sco {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SCO_NAME_LEN {
            return Err(ParseError::InvalidLength {
                what: "SCO name",
                expected: SCO_NAME_LEN,
                actual: s.len(),
            });
        }

        let mut parts = s.split('_');
        let (Some(clone_id), Some(number), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::Malformed {
                what: "SCO name",
                input: s.to_string(),
            });
        };

        Ok(Sco {
            clone_id: parse_hex_field(clone_id, 2, "SCO name", s)?,
            number: parse_hex_field(number, 8, "SCO name", s)?,
            version: parse_hex_field(version, 2, "SCO name", s)?,
        })
    }
}

impl TryFrom<String> for Sco {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Sco> for String {
    fn from(sco: Sco) -> String {
        sco.to_string()
    }
}

/// Location of a cluster: a SCO and an offset inside it.
///
/// Packed on disk into 8 bytes: SCO number (u32 LE), version (u8),
/// clone id (u8), offset (u16 LE). A location is null iff its SCO number
/// is 0; the all-zero encoding is the null location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClusterLocation {
    sco: Sco,
    offset: ScoOffset,
}

impl ClusterLocation {
    /// Create a cluster location.
    pub const fn new(sco: Sco, offset: ScoOffset) -> Self {
        ClusterLocation { sco, offset }
    }

    /// The null location.
    pub const fn null() -> Self {
        ClusterLocation {
            sco: Sco::new(0, 0, 0),
            offset: 0,
        }
    }

    /// SCO holding the cluster
    pub fn sco(&self) -> Sco {
        self.sco
    }

    /// Offset inside the SCO, in clusters
    pub fn offset(&self) -> ScoOffset {
        self.offset
    }

    /// SCO number
    pub fn number(&self) -> ScoNumber {
        self.sco.number
    }

    /// SCO version
    pub fn version(&self) -> ScoVersion {
        self.sco.version
    }

    /// SCO clone id
    pub fn clone_id(&self) -> ScoCloneId {
        self.sco.clone_id
    }

    /// Whether this is the null location.
    pub fn is_null(&self) -> bool {
        self.sco.is_null()
    }

    /// Serialize to the packed 8-byte form.
    pub fn to_bytes(&self) -> [u8; CLUSTER_LOCATION_SIZE] {
        let mut bytes = [0u8; CLUSTER_LOCATION_SIZE];
        bytes[0..4].copy_from_slice(&self.sco.number.to_le_bytes());
        bytes[4] = self.sco.version;
        bytes[5] = self.sco.clone_id;
        bytes[6..8].copy_from_slice(&self.offset.to_le_bytes());
        bytes
    }

    /// Deserialize from the packed 8-byte form.
    pub fn from_bytes(bytes: &[u8; CLUSTER_LOCATION_SIZE]) -> Self {
        ClusterLocation {
            sco: Sco {
                number: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                version: bytes[4],
                clone_id: bytes[5],
            },
            offset: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Check whether `s` is a well-formed cluster location string.
    pub fn is_cluster_location_string(s: &str) -> bool {
        s.parse::<ClusterLocation>().is_ok()
    }
}

impl fmt::Display for ClusterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:04x}", self.sco, self.offset)
    }
}

impl FromStr for ClusterLocation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CLUSTER_LOCATION_STRING_LEN {
            return Err(ParseError::InvalidLength {
                what: "cluster location",
                expected: CLUSTER_LOCATION_STRING_LEN,
                actual: s.len(),
            });
        }
        let (sco, offset) = s.split_once(':').ok_or_else(|| ParseError::Malformed {
            what: "cluster location",
            input: s.to_string(),
        })?;

        Ok(ClusterLocation {
            sco: sco.parse()?,
            offset: parse_hex_field(offset, 4, "cluster location", s)?,
        })
    }
}

// Ordering used by the merger: SCO number, then offset. Clone id and
// version only break ties so the order stays total.
impl Ord for ClusterLocation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sco
            .number
            .cmp(&other.sco.number)
            .then(self.offset.cmp(&other.offset))
            .then(self.sco.clone_id.cmp(&other.sco.clone_id))
            .then(self.sco.version.cmp(&other.sco.version))
    }
}

impl PartialOrd for ClusterLocation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// 16-byte content digest of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Weed([u8; WEED_SIZE]);

impl Weed {
    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; WEED_SIZE]) -> Self {
        Weed(bytes)
    }

    /// The all-zero digest.
    pub const fn null() -> Self {
        Weed([0u8; WEED_SIZE])
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; WEED_SIZE] {
        &self.0
    }

    /// Whether all digest bytes are zero.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Weed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A cluster location together with the digest of the cluster's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClusterLocationAndHash {
    /// Where the cluster lives
    pub location: ClusterLocation,
    /// Digest of the cluster's content
    pub weed: Weed,
}

impl ClusterLocationAndHash {
    /// Create a location-and-hash pair.
    pub const fn new(location: ClusterLocation, weed: Weed) -> Self {
        ClusterLocationAndHash { location, weed }
    }

    /// Same digest, different location (used when data is relocated).
    pub fn relocated(&self, location: ClusterLocation) -> Self {
        ClusterLocationAndHash {
            location,
            weed: self.weed,
        }
    }
}
