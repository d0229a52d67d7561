//! # cidata VolumeDescriptor Module
//!
//! The Primary Volume Descriptor (ECMA-119 8.4) is the root metadata of every
//! image: it names the volume, gives its size in blocks, the logical block
//! size, where the path tables live and a copy of the root directory record.
//! It sits in block 16 and is followed by the set terminator in block 17.
//!
//! ## Key Fields
//! - `volume_identifier`: the label cloud-init looks for (`cidata`)
//! - `volume_space_size`: total logical blocks, i.e. the container capacity
//! - `root`: where the root directory extent starts and how long it is
//!
//! Both `to_bytes` and `from_bytes` work on a whole 2048-byte sector.
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use super::super::constants::{
    ROOT_RECORD_SIZE, SECTOR_SIZE, STANDARD_IDENTIFIER, VD_TYPE_PRIMARY, VD_TYPE_TERMINATOR,
};
use super::super::seed_errors::SeedError;
use super::super::utils::{
    both_endian_u16, both_endian_u32, dec_datetime_unset, padded, read_both_u16, read_both_u32, unpadded,
};
use super::directory_record::DirectoryRecord;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct PrimaryVolumeDescriptor {
    pub system_identifier: String,
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub logical_block_size: u16,
    pub path_table_size: u32,
    pub l_path_table_lba: u32,
    pub m_path_table_lba: u32,
    pub root: DirectoryRecord,
    pub application_identifier: String,
    pub created: [u8; 17],
}

impl PrimaryVolumeDescriptor {
    /// Serialize to one full sector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(SECTOR_SIZE);

        encoded.push(VD_TYPE_PRIMARY);
        encoded.extend_from_slice(STANDARD_IDENTIFIER);
        encoded.push(1); // descriptor version
        encoded.push(0);
        encoded.extend_from_slice(&padded::<32>(&self.system_identifier));
        encoded.extend_from_slice(&padded::<32>(&self.volume_identifier));
        encoded.extend_from_slice(&[0; 8]);
        encoded.extend_from_slice(&both_endian_u32(self.volume_space_size));
        encoded.extend_from_slice(&[0; 32]);
        encoded.extend_from_slice(&both_endian_u16(1)); // volume set size
        encoded.extend_from_slice(&both_endian_u16(1)); // volume sequence number
        encoded.extend_from_slice(&both_endian_u16(self.logical_block_size));
        encoded.extend_from_slice(&both_endian_u32(self.path_table_size));
        encoded.extend_from_slice(&self.l_path_table_lba.to_le_bytes());
        encoded.extend_from_slice(&0u32.to_le_bytes());
        encoded.extend_from_slice(&self.m_path_table_lba.to_be_bytes());
        encoded.extend_from_slice(&0u32.to_be_bytes());
        encoded.extend_from_slice(&self.root.to_root_bytes());
        encoded.extend_from_slice(&padded::<128>("")); // volume set
        encoded.extend_from_slice(&padded::<128>("")); // publisher
        encoded.extend_from_slice(&padded::<128>("")); // data preparer
        encoded.extend_from_slice(&padded::<128>(&self.application_identifier));
        encoded.extend_from_slice(&padded::<37>("")); // copyright file
        encoded.extend_from_slice(&padded::<37>("")); // abstract file
        encoded.extend_from_slice(&padded::<37>("")); // bibliographic file
        encoded.extend_from_slice(&self.created);
        encoded.extend_from_slice(&self.created); // modification
        encoded.extend_from_slice(&dec_datetime_unset()); // expiration
        encoded.extend_from_slice(&self.created); // effective
        encoded.push(1); // file structure version
        encoded.resize(SECTOR_SIZE, 0);

        encoded
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != SECTOR_SIZE {
            return Err(SeedError::NotIso9660.into());
        }
        if data[0] != VD_TYPE_PRIMARY || &data[1..6] != STANDARD_IDENTIFIER {
            return Err(SeedError::NotIso9660.into());
        }
        if data[6] != 1 {
            return Err(SeedError::UnsupportedVersion(data[6]).into());
        }

        let logical_block_size = read_both_u16(&data[128..132]);
        if logical_block_size as usize != SECTOR_SIZE {
            return Err(SeedError::InvalidBlockSize(logical_block_size).into());
        }

        let root = DirectoryRecord::from_bytes(&data[156..156 + ROOT_RECORD_SIZE])?.ok_or(SeedError::NotIso9660)?;

        Ok(Self {
            system_identifier: unpadded(&data[8..40]),
            volume_identifier: unpadded(&data[40..72]),
            volume_space_size: read_both_u32(&data[80..88]),
            logical_block_size,
            path_table_size: read_both_u32(&data[132..140]),
            l_path_table_lba: u32::from_le_bytes(data[140..144].try_into()?),
            m_path_table_lba: u32::from_be_bytes(data[148..152].try_into()?),
            root,
            application_identifier: unpadded(&data[574..702]),
            created: data[813..830].try_into()?,
        })
    }
}

/// Type byte of a raw descriptor sector, if it carries the `CD001` signature.
pub fn descriptor_type(data: &[u8]) -> Option<u8> {
    if data.len() >= 7 && &data[1..6] == STANDARD_IDENTIFIER {
        Some(data[0])
    } else {
        None
    }
}

/// Volume descriptor set terminator sector.
pub fn terminator_bytes() -> Vec<u8> {
    let mut encoded = Vec::with_capacity(SECTOR_SIZE);
    encoded.push(VD_TYPE_TERMINATOR);
    encoded.extend_from_slice(STANDARD_IDENTIFIER);
    encoded.push(1);
    encoded.resize(SECTOR_SIZE, 0);
    encoded
}
