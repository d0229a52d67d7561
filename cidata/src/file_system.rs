//! # cidata File System Module
//!
//! Writing and reading of the flat ISO9660 images that carry cloud-init seeds.
//!
//! ## Key Responsibilities
//! - [`IsoFileSystem`]: allocate a fixed-capacity raw container, stage files
//!   (whole-file overwrite), then lay the whole filesystem out in one
//!   explicit [`finalize`](IsoFileSystem::finalize) step
//! - [`IsoReader`]: mount an existing image through its primary volume
//!   descriptor and walk every directory entry, presenting level-1 names the
//!   way a reader without Joliet or Rock Ridge support does
//!
//! ## File Layout
//! ```text
//! [System area: blocks 0-15 | PVD: 16 | Terminator: 17 | L path table: 18 |
//!  M path table: 19 | Root directory: 20.. | File extents... | zero fill to capacity]
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use cidata::file_system::{FinalizeOptions, IsoFileSystem, IsoReader};
//!
//! let mut fs = IsoFileSystem::create("/tmp/seed.iso", 10 * 1024 * 1024)?;
//! fs.write_file("user-data", b"#cloud-config\n")?;
//! let path = fs.finalize(&FinalizeOptions::default())?;
//!
//! let mut reader = IsoReader::new(std::fs::File::open(path)?)?;
//! while let Some(entry) = reader.next_entry()? {
//!     let data = reader.read_contents(&entry)?;
//!     println!("{} {}", entry.name, data.len());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};

use crate::constants::{
    DEFAULT_VOLUME_LABEL, L_PATH_TABLE_LBA, M_PATH_TABLE_LBA, PVD_LBA, ROOT_DIR_LBA, SECTOR_SIZE, SYSTEM_AREA_BLOCKS,
    TERMINATOR_LBA, VD_TYPE_BOOT_RECORD, VD_TYPE_PRIMARY, VD_TYPE_SUPPLEMENTARY, VD_TYPE_TERMINATOR,
};
use crate::core::directory_record::{CURRENT_DIR_ID, DirectoryRecord, FileFlags, PARENT_DIR_ID};
use crate::core::path_table::{PathTableRecord, PathTableType, encode_table};
use crate::core::rock_ridge::{SystemUseEntry, alternate_name, encode_entries};
use crate::core::short_name::{level1_identifier, reader_name};
use crate::core::volume_descriptor::{PrimaryVolumeDescriptor, descriptor_type, terminator_bytes};
use crate::seed_errors::SeedError;
use crate::utils::{create_physical_file, current_time, dec_datetime, read_range, record_datetime, sectors_for, write_range};

/// Longest file name accepted; keeps every record, Rock Ridge name included,
/// under the 255-byte directory record limit.
const MAX_NAME_LEN: usize = 128;

/// Volume descriptors are searched this many blocks past the system area.
const MAX_DESCRIPTORS: u32 = 32;

const SECTOR: u64 = SECTOR_SIZE as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOptions {
    pub rock_ridge: bool,
    pub volume_identifier: String,
}

impl Default for FinalizeOptions {
    fn default() -> Self {
        Self {
            rock_ridge: true,
            volume_identifier: DEFAULT_VOLUME_LABEL.into(),
        }
    }
}

#[derive(Debug)]
struct StagedFile {
    name: String,
    data: Vec<u8>,
}

/// An ISO9660 filesystem being assembled inside a fixed-size raw file.
#[derive(Debug)]
pub struct IsoFileSystem {
    pub path: PathBuf,
    pub capacity: u64,
    disk: File,
    files: Vec<StagedFile>,
}

impl IsoFileSystem {
    /// Allocates the raw container at `path`, `capacity` bytes long.
    pub fn create<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self> {
        let min_capacity = u64::from(ROOT_DIR_LBA + 1) * SECTOR;
        if capacity % SECTOR != 0 || capacity < min_capacity {
            return Err(SeedError::InvalidCapacity(capacity).into());
        }

        let path = path.as_ref().to_path_buf();
        create_physical_file(&path, capacity)?;
        let disk = OpenOptions::new().write(true).open(&path)?;

        Ok(Self { path, capacity, disk, files: vec![] })
    }

    /// Opens `name` for writing, truncating any content staged earlier.
    /// The data only becomes part of the filesystem once the writer is closed.
    pub fn open_file(&mut self, name: &str) -> Result<IsoFileWriter<'_>> {
        validate_file_name(name)?;
        Ok(IsoFileWriter { fs: self, name: name.to_string(), buffer: vec![] })
    }

    /// Stages the whole content of `name` (create if absent, replace if present).
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        match self.files.iter_mut().find(|file| file.name == name) {
            Some(file) => file.data = data.to_vec(),
            None => self.files.push(StagedFile { name: name.to_string(), data: data.to_vec() }),
        }
        Ok(())
    }

    /// Lays out and writes every structure of the filesystem. Terminal: the
    /// filesystem is consumed and the image is complete on return.
    pub fn finalize(mut self, options: &FinalizeOptions) -> Result<PathBuf> {
        let now = current_time();
        let recorded = record_datetime(now);
        let total_blocks = (self.capacity / SECTOR) as u32;

        let mut files: Vec<(String, &StagedFile)> =
            self.files.iter().map(|file| (level1_identifier(&file.name), file)).collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = files.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(SeedError::InvalidFileName(pair[1].1.name.clone()).into());
        }

        let dir_system_use = |entries: &[SystemUseEntry]| {
            if options.rock_ridge { encode_entries(entries) } else { vec![] }
        };

        // extents are not known yet, but record lengths do not depend on them
        let mut records = vec![
            DirectoryRecord::new(CURRENT_DIR_ID, ROOT_DIR_LBA, 0, recorded, FileFlags::directory()).with_system_use(
                dir_system_use(&[
                    SystemUseEntry::SharingProtocol,
                    SystemUseEntry::directory_attributes(),
                    SystemUseEntry::extension_reference(),
                ]),
            ),
            DirectoryRecord::new(PARENT_DIR_ID, ROOT_DIR_LBA, 0, recorded, FileFlags::directory())
                .with_system_use(dir_system_use(&[SystemUseEntry::directory_attributes()])),
        ];
        for (identifier, file) in files.iter() {
            let record = DirectoryRecord::new(identifier.as_bytes(), 0, file.data.len() as u32, recorded, FileFlags::file())
                .with_system_use(dir_system_use(&[
                    SystemUseEntry::file_attributes(),
                    SystemUseEntry::AlternateName { name: file.name.clone() },
                ]));
            records.push(record);
        }

        let dir_blocks = directory_blocks(&records);
        let dir_length = dir_blocks * SECTOR_SIZE as u32;
        for record in records.iter_mut().take(2) {
            record.data_length = dir_length;
        }

        let mut next_lba = ROOT_DIR_LBA + dir_blocks;
        for (record, (_, file)) in records.iter_mut().skip(2).zip(files.iter()) {
            if file.data.is_empty() {
                continue;
            }
            record.extent_lba = next_lba;
            next_lba += sectors_for(file.data.len() as u64, SECTOR) as u32;
        }
        if next_lba > total_blocks {
            return Err(SeedError::ImageTooLarge {
                required: u64::from(next_lba) * SECTOR,
                capacity: self.capacity,
            }
            .into());
        }

        let root_table = [PathTableRecord::root(ROOT_DIR_LBA)];
        let (l_table, path_table_size) = encode_table(&root_table, PathTableType::LittleEndian);
        let (m_table, _) = encode_table(&root_table, PathTableType::BigEndian);

        let descriptor = PrimaryVolumeDescriptor {
            system_identifier: "LINUX".into(),
            volume_identifier: options.volume_identifier.clone(),
            volume_space_size: total_blocks,
            logical_block_size: SECTOR_SIZE as u16,
            path_table_size,
            l_path_table_lba: L_PATH_TABLE_LBA,
            m_path_table_lba: M_PATH_TABLE_LBA,
            root: records[0].clone(),
            application_identifier: "CIDATA".into(),
            created: dec_datetime(now),
        };

        let disk = &mut self.disk;
        write_range(disk, lba_offset(PVD_LBA), &descriptor.to_bytes())?;
        write_range(disk, lba_offset(TERMINATOR_LBA), &terminator_bytes())?;
        write_range(disk, lba_offset(L_PATH_TABLE_LBA), &l_table)?;
        write_range(disk, lba_offset(M_PATH_TABLE_LBA), &m_table)?;
        write_range(disk, lba_offset(ROOT_DIR_LBA), &pack_records(&records))?;
        for (record, (_, file)) in records.iter().skip(2).zip(files.iter()) {
            if !file.data.is_empty() {
                write_range(disk, lba_offset(record.extent_lba), &file.data)?;
            }
        }
        disk.sync_all()?;

        info!("ISO created at {} ({} files, {} blocks used)", self.path.display(), files.len(), next_lba);
        Ok(self.path.clone())
    }
}

/// Buffered writer for one staged file, see [`IsoFileSystem::open_file`].
pub struct IsoFileWriter<'a> {
    fs: &'a mut IsoFileSystem,
    name: String,
    buffer: Vec<u8>,
}

impl IsoFileWriter<'_> {
    pub fn close(self) -> Result<()> {
        self.fs.write_file(&self.name, &self.buffer)
    }
}

impl Write for IsoFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(['/', '\0']) || name == "." || name == ".." {
        return Err(SeedError::InvalidFileName(name.to_string()).into());
    }
    Ok(())
}

fn lba_offset(lba: u32) -> u64 {
    u64::from(lba) * SECTOR
}

/// Number of blocks the records occupy once none straddles a sector boundary.
fn directory_blocks(records: &[DirectoryRecord]) -> u32 {
    (pack_records(records).len() / SECTOR_SIZE) as u32
}

/// Packs records back to back, moving to the next sector whenever the next
/// record would cross a boundary. Output is a whole number of sectors.
fn pack_records(records: &[DirectoryRecord]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(SECTOR_SIZE);
    for record in records {
        let bytes = record.to_bytes();
        let used = packed.len() % SECTOR_SIZE;
        if used + bytes.len() > SECTOR_SIZE {
            packed.resize(packed.len() + SECTOR_SIZE - used, 0);
        }
        packed.extend_from_slice(&bytes);
    }
    packed.resize(packed.len().div_ceil(SECTOR_SIZE).max(1) * SECTOR_SIZE, 0);
    packed
}

/// One directory entry as seen by [`IsoReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoEntry {
    /// Level-1 name as a non-Joliet reader reports it, relative to the root
    /// (`user_dat.`, `subdir/file.txt`).
    pub name: String,
    /// Rock Ridge `NM` name, when the image carries one.
    pub rock_ridge_name: Option<String>,
    pub extent_lba: u32,
    pub size: u32,
    pub is_dir: bool,
}

/// Reader for ISO9660 images that deliberately ignores Joliet and uses
/// Rock Ridge only for the informational [`IsoEntry::rock_ridge_name`].
pub struct IsoReader<R> {
    inner: R,
    descriptor: PrimaryVolumeDescriptor,
    pending: VecDeque<IsoEntry>,
    directories: VecDeque<(String, u32, u32)>,
    visited: HashSet<u32>,
    /// End of readable data: the recorded volume size or the image length, whichever is smaller.
    limit: u64,
}

impl<R: Read + Seek> IsoReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let mut descriptor = None;
        for lba in SYSTEM_AREA_BLOCKS..SYSTEM_AREA_BLOCKS + MAX_DESCRIPTORS {
            let sector = read_sector(&mut inner, lba)?;
            match descriptor_type(&sector) {
                Some(VD_TYPE_PRIMARY) => {
                    descriptor = Some(PrimaryVolumeDescriptor::from_bytes(&sector)?);
                    break;
                }
                Some(VD_TYPE_TERMINATOR) | None => break,
                // Joliet lives in supplementary descriptors and is ignored
                Some(VD_TYPE_BOOT_RECORD | VD_TYPE_SUPPLEMENTARY) => continue,
                Some(other) => debug!("ISO reader: skipping volume descriptor of type {other}"),
            }
        }
        let descriptor = descriptor.ok_or(SeedError::NotIso9660)?;
        let image_len = inner.seek(SeekFrom::End(0))?;
        let limit = image_len.min(lba_offset(descriptor.volume_space_size));

        let root = &descriptor.root;
        let directories = VecDeque::from([(String::new(), root.extent_lba, root.data_length)]);

        Ok(Self {
            inner,
            descriptor,
            pending: VecDeque::new(),
            directories,
            visited: HashSet::new(),
            limit,
        })
    }

    pub fn volume_identifier(&self) -> &str {
        &self.descriptor.volume_identifier
    }

    pub fn volume_space_size(&self) -> u32 {
        self.descriptor.volume_space_size
    }

    /// Next entry in directory order, root first, subdirectories after their
    /// parent. `None` marks the end of the walk.
    pub fn next_entry(&mut self) -> Result<Option<IsoEntry>> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                if entry.is_dir {
                    self.directories.push_back((format!("{}/", entry.name), entry.extent_lba, entry.size));
                }
                return Ok(Some(entry));
            }

            let Some((prefix, lba, length)) = self.directories.pop_front() else {
                return Ok(None);
            };
            if self.visited.insert(lba) {
                self.load_directory(&prefix, lba, length)?;
            }
        }
    }

    /// Whole content of a file entry; directories read as empty.
    pub fn read_contents(&mut self, entry: &IsoEntry) -> Result<Vec<u8>> {
        if entry.is_dir || entry.size == 0 {
            return Ok(vec![]);
        }
        let (start, end) = self.extent(entry.extent_lba, u64::from(entry.size))?;
        read_range(&mut self.inner, start, end)
    }

    /// Byte range of an extent, rejected before any allocation when it runs
    /// past the end of the volume.
    fn extent(&self, lba: u32, length: u64) -> Result<(u64, u64)> {
        let start = lba_offset(lba);
        let end = start + length;
        if end > self.limit {
            return Err(SeedError::ExtentOutOfBounds { lba, length, limit: self.limit }.into());
        }
        Ok((start, end))
    }

    fn load_directory(&mut self, prefix: &str, lba: u32, length: u32) -> Result<()> {
        let (start, end) = self.extent(lba, sectors_for(u64::from(length), SECTOR) * SECTOR)?;
        let extent = read_range(&mut self.inner, start, end)?;

        for (index, sector) in extent.chunks(SECTOR_SIZE).enumerate() {
            let mut offset = 0;
            while offset < sector.len() && sector[offset] != 0 {
                let record = DirectoryRecord::from_bytes(&sector[offset..])?.ok_or(SeedError::MalformedDirectoryRecord {
                    lba: lba + index as u32,
                    offset,
                })?;
                offset += sector[offset] as usize;

                if record.is_current_dir() || record.is_parent_dir() {
                    continue;
                }
                let entry = IsoEntry {
                    name: format!("{prefix}{}", reader_name(&record.identifier)),
                    rock_ridge_name: alternate_name(&record.system_use),
                    extent_lba: record.extent_lba,
                    size: record.data_length,
                    is_dir: record.flags.directory,
                };
                debug!("ISO reader: found {} ({} bytes)", entry.name, entry.size);
                self.pending.push_back(entry);
            }
        }
        Ok(())
    }
}

fn read_sector<R: Read + Seek>(reader: &mut R, lba: u32) -> Result<Vec<u8>> {
    let start = lba_offset(lba);
    read_range(reader, start, start + SECTOR).map_err(|err| match err.downcast_ref::<io::Error>() {
        Some(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => SeedError::NotIso9660.into(),
        _ => err,
    })
}
