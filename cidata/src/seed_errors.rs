//! # cidata Error Definitions Module
//!
//! All structured errors raised by this crate. Operations return
//! `anyhow::Result` and raise these variants with `.into()`, so a caller can
//! tell the failure classes apart with `err.downcast_ref::<SeedError>()`
//! even after context has been attached.
//!
//! ## Error Categories
//! - **Input**: malformed resource identifiers, unknown pools, bad file names
//! - **Local resources**: temp allocation, free space, image capacity
//! - **Remote state**: missing volume key, empty volume or pool names
//! - **Data integrity**: downloaded byte count differs from the volume size
//! - **Format**: anything that is not a readable ISO9660 image
//!
//! Transport failures coming out of a [`StorageBackend`](crate::backend::StorageBackend)
//! are not listed here; they keep whatever error type the backend produced.
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("{0} is not a valid key")]
    InvalidResourceId(String),

    #[error("can't find storage pool '{0}'")]
    PoolNotFound(String),

    #[error("error retrieving cloudinit volume name for volume key: {0}")]
    EmptyVolumeName(String),

    #[error("error retrieving pool name for cloudinit volume: {0}")]
    EmptyPoolName(String),

    #[error("error retrieving volume key for volume {0}")]
    MissingVolumeKey(String),

    #[error("cannot create tmp {kind} under {path}")]
    TempAllocation {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not enough space under {path}: {available} bytes available, {required} required")]
    InsufficientSpace { path: PathBuf, available: u64, required: u64 },

    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    #[error("image needs {required} bytes but the disk holds {capacity}")]
    ImageTooLarge { required: u64, capacity: u64 },

    #[error("capacity {0} is not a positive multiple of the sector size")]
    InvalidCapacity(u64),

    #[error("error while copying remote volume to local disk, bytes copied {copied} != {expected} volume size")]
    SizeMismatch { expected: u64, copied: u64 },

    #[error("not an iso9660 filesystem")]
    NotIso9660,

    #[error("unsupported volume descriptor version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported logical block size {0}")]
    InvalidBlockSize(u16),

    #[error("malformed directory record at byte {offset} of block {lba}")]
    MalformedDirectoryRecord { lba: u32, offset: usize },

    #[error("extent of {length} bytes at block {lba} ends past the volume limit of {limit} bytes")]
    ExtentOutOfBounds { lba: u32, length: u64, limit: u64 },
}
