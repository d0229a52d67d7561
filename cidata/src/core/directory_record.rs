//! # cidata DirectoryRecord Module
//!
//! A directory record (ECMA-119 9.1) names one entry of a directory extent
//! and points at the extent holding its data. Records are variable length,
//! always even, and never straddle a sector boundary.
//!
//! ## Layout
//! ```text
//! - record length (1 byte)
//! - extended attribute length (1 byte)
//! - extent location (8 bytes, both-endian)
//! - data length (8 bytes, both-endian)
//! - recording date (7 bytes)
//! - file flags (1 byte)
//! - file unit size, interleave gap (2 bytes)
//! - volume sequence number (4 bytes, both-endian)
//! - identifier length (1 byte)
//! - identifier (N bytes) [+ 1 pad byte when N is even]
//! - system use area (SUSP / Rock Ridge entries)
//! ```
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use super::super::constants::{DIR_RECORD_BASE, ROOT_RECORD_SIZE};
use super::super::utils::{both_endian_u16, both_endian_u32, read_both_u32};
use anyhow::Result;

/// Identifier of the `.` entry of every directory.
pub const CURRENT_DIR_ID: &[u8] = &[0x00];
/// Identifier of the `..` entry of every directory.
pub const PARENT_DIR_ID: &[u8] = &[0x01];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub extent_lba: u32,
    pub data_length: u32,
    pub recorded: [u8; 7],
    pub flags: FileFlags,
    pub identifier: Vec<u8>,
    pub system_use: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFlags {
    pub hidden: bool,
    pub directory: bool,
    pub associated: bool,
    pub extended_format: bool,
    pub extended_permissions: bool,
    pub not_final: bool,
}

impl FileFlags {
    pub fn file() -> Self {
        Self::default()
    }

    pub fn directory() -> Self {
        Self { directory: true, ..Self::default() }
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            hidden: byte & 0x01 != 0,
            directory: byte & 0x02 != 0,
            associated: byte & 0x04 != 0,
            extended_format: byte & 0x08 != 0,
            extended_permissions: byte & 0x10 != 0,
            not_final: byte & 0x80 != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.hidden {
            byte |= 0x01;
        }
        if self.directory {
            byte |= 0x02;
        }
        if self.associated {
            byte |= 0x04;
        }
        if self.extended_format {
            byte |= 0x08;
        }
        if self.extended_permissions {
            byte |= 0x10;
        }
        if self.not_final {
            byte |= 0x80;
        }
        byte
    }
}

impl DirectoryRecord {
    pub fn new(identifier: &[u8], extent_lba: u32, data_length: u32, recorded: [u8; 7], flags: FileFlags) -> Self {
        Self {
            extent_lba,
            data_length,
            recorded,
            flags,
            identifier: identifier.to_vec(),
            system_use: vec![],
        }
    }

    pub fn with_system_use(mut self, system_use: Vec<u8>) -> Self {
        self.system_use = system_use;
        self
    }

    /// Encoded length, padding included. Always even.
    pub fn encoded_len(&self) -> usize {
        let head = DIR_RECORD_BASE + self.identifier.len() + self.identifier_padding();
        let total = head + self.system_use.len();
        total + total % 2
    }

    fn identifier_padding(&self) -> usize {
        usize::from(self.identifier.len() % 2 == 0)
    }

    pub fn is_current_dir(&self) -> bool {
        self.identifier == CURRENT_DIR_ID
    }

    pub fn is_parent_dir(&self) -> bool {
        self.identifier == PARENT_DIR_ID
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let length = self.encoded_len();
        let mut encoded = Vec::with_capacity(length);

        encoded.push(length as u8);
        encoded.push(0); // extended attribute record length
        encoded.extend_from_slice(&both_endian_u32(self.extent_lba));
        encoded.extend_from_slice(&both_endian_u32(self.data_length));
        encoded.extend_from_slice(&self.recorded);
        encoded.push(self.flags.to_byte());
        encoded.push(0); // file unit size
        encoded.push(0); // interleave gap
        encoded.extend_from_slice(&both_endian_u16(1));
        encoded.push(self.identifier.len() as u8);
        encoded.extend_from_slice(&self.identifier);
        if self.identifier_padding() == 1 {
            encoded.push(0);
        }
        encoded.extend_from_slice(&self.system_use);
        encoded.resize(length, 0);

        encoded
    }

    /// The fixed 34-byte copy of the root record held by the volume descriptor.
    pub fn to_root_bytes(&self) -> [u8; ROOT_RECORD_SIZE] {
        let root = Self {
            identifier: CURRENT_DIR_ID.to_vec(),
            system_use: vec![],
            ..self.clone()
        };
        let mut out = [0u8; ROOT_RECORD_SIZE];
        out.copy_from_slice(&root.to_bytes());
        out
    }

    /// Decodes one record. `data` must start at the length byte and hold at
    /// least the whole record; `None` means the bytes are not a valid record.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        let Some(&length) = data.first() else {
            return Ok(None);
        };
        let length = length as usize;
        if length < DIR_RECORD_BASE + 1 || length > data.len() {
            return Ok(None);
        }

        let identifier_len = data[32] as usize;
        let identifier_end = DIR_RECORD_BASE + identifier_len;
        if identifier_end > length {
            return Ok(None);
        }
        let system_use_start = (identifier_end + usize::from(identifier_len % 2 == 0)).min(length);

        Ok(Some(Self {
            extent_lba: read_both_u32(&data[2..10]),
            data_length: read_both_u32(&data[10..18]),
            recorded: data[18..25].try_into()?,
            flags: FileFlags::from_byte(data[25]),
            identifier: data[DIR_RECORD_BASE..identifier_end].to_vec(),
            system_use: data[system_use_start..length].to_vec(),
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_round_trip_through_byte() {
        let flags = FileFlags::from_byte(0x82);
        assert!(flags.directory);
        assert!(flags.not_final);
        assert!(!flags.hidden);
        assert_eq!(flags.to_byte(), 0x82);
        assert_eq!(FileFlags::directory().to_byte(), 0x02);
        assert_eq!(FileFlags::file().to_byte(), 0x00);
    }

    #[test]
    fn record_length_is_even_and_padded() {
        // 11-byte identifier: 33 + 11 = 44, no pad byte
        let record = DirectoryRecord::new(b"USER_DAT.;1", 24, 9, [0; 7], FileFlags::file());
        assert_eq!(record.encoded_len(), 44);

        // 10-byte identifier: 33 + 10 + 1 pad = 44
        let record = DirectoryRecord::new(b"META_DAT;1", 25, 9, [0; 7], FileFlags::file());
        assert_eq!(record.encoded_len(), 44);
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 44);
        assert_eq!(bytes[0], 44);

        // odd system use length is rounded up
        let record = record.with_system_use(vec![1, 2, 3]);
        assert_eq!(record.encoded_len(), 48);
    }

    #[test]
    fn serialize_test() {
        let record = DirectoryRecord::new(b"NETWORK_.;1", 30, 2100, [124, 1, 2, 3, 4, 5, 0], FileFlags::file())
            .with_system_use(b"NM\x13\x01\x00network-config".to_vec());
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), record.encoded_len());

        let decoded = DirectoryRecord::from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(decoded.extent_lba, 30);
        assert_eq!(decoded.data_length, 2100);
        assert_eq!(decoded.identifier, b"NETWORK_.;1");
        assert_eq!(decoded.recorded, [124, 1, 2, 3, 4, 5, 0]);
        // the trailing pad byte stays inside the system use area
        assert!(decoded.system_use.starts_with(b"NM\x13\x01\x00network-config"));
    }

    #[test]
    fn root_copy_is_34_bytes() {
        let record = DirectoryRecord::new(CURRENT_DIR_ID, 20, 2048, [0; 7], FileFlags::directory())
            .with_system_use(vec![0xAA; 40]);
        let root = record.to_root_bytes();
        assert_eq!(root[0], 34);
        assert_eq!(root[25], 0x02);
        assert_eq!(root[33], 0x00);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let record = DirectoryRecord::new(b"USER_DAT.;1", 24, 9, [0; 7], FileFlags::file());
        let bytes = record.to_bytes();
        assert!(DirectoryRecord::from_bytes(&bytes[..20]).unwrap().is_none());
        assert!(DirectoryRecord::from_bytes(&[]).unwrap().is_none());
        assert!(DirectoryRecord::from_bytes(&[0u8; 40]).unwrap().is_none());
    }
}
