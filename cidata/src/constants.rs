//! # cidata Constants Module
//!
//! Fixed values shared by the image writer, the image reader and the remote
//! transfer path. The ISO9660 numbers come from ECMA-119; the seed-specific
//! values (label, file names, capacity) are what cloud-init's NoCloud
//! datasource looks for.
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

/// Logical block (sector) size of every image this crate writes or reads.
pub const SECTOR_SIZE: usize = 2048;

/// Blocks 0..16 form the system area and are left zeroed.
pub const SYSTEM_AREA_BLOCKS: u32 = 16;

pub const PVD_LBA: u32 = SYSTEM_AREA_BLOCKS;
pub const TERMINATOR_LBA: u32 = PVD_LBA + 1;
pub const L_PATH_TABLE_LBA: u32 = TERMINATOR_LBA + 1;
pub const M_PATH_TABLE_LBA: u32 = L_PATH_TABLE_LBA + 1;
pub const ROOT_DIR_LBA: u32 = M_PATH_TABLE_LBA + 1;

pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

pub const VD_TYPE_BOOT_RECORD: u8 = 0;
pub const VD_TYPE_PRIMARY: u8 = 1;
pub const VD_TYPE_SUPPLEMENTARY: u8 = 2;
pub const VD_TYPE_TERMINATOR: u8 = 255;

/// Fixed part of a directory record, before the file identifier.
pub const DIR_RECORD_BASE: usize = 33;
/// Root directory record embedded in the primary volume descriptor.
pub const ROOT_RECORD_SIZE: usize = 34;

/// Reference sizing of the raw container: 10 MiB.
pub const DEFAULT_CAPACITY: u64 = 10 * 1024 * 1024;
pub const DEFAULT_VOLUME_LABEL: &str = "cidata";
pub const DEFAULT_TEMP_PREFIX: &str = "cloudinit";

pub const USER_DATA_FILE_NAME: &str = "user-data";
pub const META_DATA_FILE_NAME: &str = "meta-data";
pub const NETWORK_CONFIG_FILE_NAME: &str = "network-config";

/// Separator between the volume key and the disambiguating token.
pub const RESOURCE_KEY_SEPARATOR: char = ';';

/// Upper bound for the download write buffer; volumes larger than this
/// are still accepted, they just flush more than once.
pub const MAX_DOWNLOAD_BUFFER: u64 = 16 * 1024 * 1024;
