//! TLog entry format.
//!
//! A TLog is a flat sequence of fixed-size 32-byte entries. There is no
//! tag byte: the variant is recovered from the content.
//!
//! # Entry Layout
//!
//! ```text
//! 0              8                 16                               32
//! ┌──────────────┬─────────────────┬────────────────────────────────┐
//! │ Address (8)  │ Location (8)    │ Weed (16)                      │
//! └──────────────┴─────────────────┴────────────────────────────────┘
//!
//! Location: SCO number (u32 LE) │ version (u8) │ clone id (u8) │ offset (u16 LE)
//! ```
//!
//! # Variants
//!
//! - Location: non-null location, address in `0..=MAX_CLUSTER_ADDRESS`
//! - TLogCrc / ScoCrc: location and weed zero, address field holds
//!   `discriminant << 56 | crc32`, bits 32..56 zero
//! - Sync: all 32 bytes zero
//!
//! Any other pattern is rejected with `EntryError::InvalidEntry`.

use crate::error::EntryError;
use crate::types::{
    ClusterAddress, ClusterLocation, ClusterLocationAndHash, Weed, CLUSTER_LOCATION_SIZE,
    MAX_CLUSTER_ADDRESS, WEED_SIZE,
};

/// Size of one encoded entry in bytes.
pub const ENTRY_SIZE: usize = 32;

/// Top byte of the address field marking a TLog CRC entry.
pub const TLOG_CRC_DISCRIMINANT: u8 = 0xc5;

/// Top byte of the address field marking a SCO CRC entry.
pub const SCO_CRC_DISCRIMINANT: u8 = 0x5c;

const DISCRIMINANT_SHIFT: u32 = 56;
const CRC_RESERVED_MASK: u64 = 0x00ff_ffff_0000_0000;

/// Kind of a decoded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Cluster address to location mapping
    Location,
    /// Checksum over every preceding entry of the TLog
    TLogCrc,
    /// Checksum over the data of the SCO that was just closed
    ScoCrc,
    /// Sync point
    Sync,
}

/// A cluster address mapped to a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationEntry {
    /// Address of the cluster in the volume
    pub address: ClusterAddress,
    /// Where the cluster data lives, with its digest
    pub location_and_hash: ClusterLocationAndHash,
}

impl LocationEntry {
    /// Create a location entry.
    pub fn new(address: ClusterAddress, location_and_hash: ClusterLocationAndHash) -> Self {
        LocationEntry {
            address,
            location_and_hash,
        }
    }

    /// Location of the cluster
    pub fn location(&self) -> ClusterLocation {
        self.location_and_hash.location
    }

    /// Digest of the cluster
    pub fn weed(&self) -> Weed {
        self.location_and_hash.weed
    }
}

/// One decoded TLog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    /// Address to location mapping
    Location(LocationEntry),
    /// Checksum of the TLog up to (excluding) this entry
    TLogCrc(u32),
    /// Checksum of the SCO closed by this entry
    ScoCrc(u32),
    /// Sync marker
    Sync,
}

impl Entry {
    /// Build a location entry.
    pub fn location(address: ClusterAddress, location_and_hash: ClusterLocationAndHash) -> Self {
        Entry::Location(LocationEntry::new(address, location_and_hash))
    }

    /// Kind of this entry
    pub fn entry_type(&self) -> EntryType {
        match self {
            Entry::Location(_) => EntryType::Location,
            Entry::TLogCrc(_) => EntryType::TLogCrc,
            Entry::ScoCrc(_) => EntryType::ScoCrc,
            Entry::Sync => EntryType::Sync,
        }
    }

    /// Checksum carried by a CRC entry, `None` for other kinds.
    pub fn checksum(&self) -> Option<u32> {
        match self {
            Entry::TLogCrc(crc) | Entry::ScoCrc(crc) => Some(*crc),
            _ => None,
        }
    }

    /// Cluster address of a location entry.
    pub fn cluster_address(&self) -> Option<ClusterAddress> {
        self.as_location().map(|l| l.address)
    }

    /// Location and hash of a location entry.
    pub fn location_and_hash(&self) -> Option<ClusterLocationAndHash> {
        self.as_location().map(|l| l.location_and_hash)
    }

    /// Cluster location of a location entry.
    pub fn cluster_location(&self) -> Option<ClusterLocation> {
        self.as_location().map(|l| l.location())
    }

    /// Borrow the location payload, if this is a location entry.
    pub fn as_location(&self) -> Option<&LocationEntry> {
        match self {
            Entry::Location(l) => Some(l),
            _ => None,
        }
    }

    /// Serialize to the 32-byte on-disk form.
    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut bytes = [0u8; ENTRY_SIZE];
        match self {
            Entry::Location(l) => {
                bytes[0..8].copy_from_slice(&l.address.to_le_bytes());
                bytes[8..16].copy_from_slice(&l.location_and_hash.location.to_bytes());
                bytes[16..32].copy_from_slice(l.location_and_hash.weed.as_bytes());
            }
            Entry::TLogCrc(crc) => {
                bytes[0..8].copy_from_slice(&crc_field(TLOG_CRC_DISCRIMINANT, *crc).to_le_bytes());
            }
            Entry::ScoCrc(crc) => {
                bytes[0..8].copy_from_slice(&crc_field(SCO_CRC_DISCRIMINANT, *crc).to_le_bytes());
            }
            Entry::Sync => {}
        }
        bytes
    }

    /// Deserialize from the 32-byte on-disk form.
    pub fn decode(bytes: &[u8; ENTRY_SIZE]) -> Result<Self, EntryError> {
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&bytes[0..8]);
        let address = u64::from_le_bytes(addr);

        let mut loc = [0u8; CLUSTER_LOCATION_SIZE];
        loc.copy_from_slice(&bytes[8..16]);
        let location = ClusterLocation::from_bytes(&loc);

        let mut weed = [0u8; WEED_SIZE];
        weed.copy_from_slice(&bytes[16..32]);

        if !location.is_null() {
            if address > MAX_CLUSTER_ADDRESS {
                return Err(EntryError::InvalidEntry {
                    reason: format!("cluster address {:#x} out of range", address),
                });
            }
            return Ok(Entry::location(
                address,
                ClusterLocationAndHash::new(location, Weed::new(weed)),
            ));
        }

        if bytes[8..32].iter().any(|b| *b != 0) {
            return Err(EntryError::InvalidEntry {
                reason: "null location with non-zero location or digest bytes".to_string(),
            });
        }

        if address == 0 {
            return Ok(Entry::Sync);
        }

        if address & CRC_RESERVED_MASK != 0 {
            return Err(EntryError::InvalidEntry {
                reason: format!("reserved bits set in address field {:#018x}", address),
            });
        }

        let crc = address as u32;
        match (address >> DISCRIMINANT_SHIFT) as u8 {
            TLOG_CRC_DISCRIMINANT => Ok(Entry::TLogCrc(crc)),
            SCO_CRC_DISCRIMINANT => Ok(Entry::ScoCrc(crc)),
            other => Err(EntryError::InvalidEntry {
                reason: format!("unknown discriminant {:#04x}", other),
            }),
        }
    }

    /// Deserialize from a slice that must be exactly `ENTRY_SIZE` bytes long.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self, EntryError> {
        let array: &[u8; ENTRY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| EntryError::InvalidLength {
                    expected: ENTRY_SIZE,
                    actual: bytes.len(),
                })?;
        Entry::decode(array)
    }
}

fn crc_field(discriminant: u8, crc: u32) -> u64 {
    ((discriminant as u64) << DISCRIMINANT_SHIFT) | crc as u64
}
