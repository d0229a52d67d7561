//! # cidata PathTable Module
//!
//! Path tables (ECMA-119 9.4) list every directory of the volume for fast
//! lookup. A seed image has a flat layout, so both tables hold a single
//! record for the root directory; the L table is little-endian, the M table
//! big-endian.
//!
//! ## Encoding Layout
//! ```text
//! [1 byte: identifier length][1 byte: ext attr length]
//! [4 bytes: extent location][2 bytes: parent directory number]
//! [N bytes: identifier][1 pad byte when N is odd]
//! ```
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use super::super::constants::SECTOR_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTableType {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableRecord {
    pub identifier: Vec<u8>,
    pub extent_lba: u32,
    pub parent: u16,
}

impl PathTableRecord {
    /// The root directory is its own parent and is directory number 1.
    pub fn root(extent_lba: u32) -> Self {
        Self {
            identifier: vec![0x00],
            extent_lba,
            parent: 1,
        }
    }

    pub fn encoded_len(&self) -> usize {
        8 + self.identifier.len() + self.identifier.len() % 2
    }

    pub fn to_bytes(&self, table: PathTableType) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(self.encoded_len());

        encoded.push(self.identifier.len() as u8);
        encoded.push(0);
        match table {
            PathTableType::LittleEndian => {
                encoded.extend_from_slice(&self.extent_lba.to_le_bytes());
                encoded.extend_from_slice(&self.parent.to_le_bytes());
            }
            PathTableType::BigEndian => {
                encoded.extend_from_slice(&self.extent_lba.to_be_bytes());
                encoded.extend_from_slice(&self.parent.to_be_bytes());
            }
        }
        encoded.extend_from_slice(&self.identifier);
        encoded.resize(self.encoded_len(), 0);

        encoded
    }
}

/// Encodes a whole table into one sector and reports its byte size for the
/// volume descriptor.
pub fn encode_table(records: &[PathTableRecord], table: PathTableType) -> (Vec<u8>, u32) {
    let mut encoded: Vec<u8> = records.iter().flat_map(|record| record.to_bytes(table)).collect();
    let size = encoded.len() as u32;
    encoded.resize(encoded.len().div_ceil(SECTOR_SIZE).max(1) * SECTOR_SIZE, 0);
    (encoded, size)
}
