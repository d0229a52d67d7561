//! # cidata Storage Backend Module
//!
//! The remote storage service that holds seed volumes is a collaborator, not
//! part of this crate. [`StorageBackend`] is the set of calls the create and
//! reload flows consume from it; a libvirt connection, a test double or
//! [`InMemoryBackend`](crate::memory_backend::InMemoryBackend) plug in here.
//!
//! All calls block. None of them carry a timeout; callers needing one wrap
//! the surrounding operation.

use std::fmt::{self, Display, Formatter, Write as _};
use std::io::{Read, Write};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Unit every seed volume is sized in.
pub const CAPACITY_UNIT: &str = "B";
/// Target format of every seed volume.
pub const VOLUME_FORMAT: &str = "raw";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pub name: String,
}

impl PoolHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeHandle {
    /// Backend-assigned, stable across refreshes. Empty means the backend
    /// did not report one.
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeType {
    File,
    Block,
    Directory,
    Network,
    Other,
}

impl Display for VolumeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            VolumeType::File => "file",
            VolumeType::Block => "block",
            VolumeType::Directory => "dir",
            VolumeType::Network => "network",
            VolumeType::Other => "other",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub kind: VolumeType,
    /// Logical size in bytes. Downloads must deliver exactly this many.
    pub capacity: u64,
    pub allocation: u64,
}

/// What a volume is created from: name, capacity with its unit, and the
/// target format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescription {
    pub name: String,
    pub capacity: u64,
    pub unit: String,
    pub format: String,
}

impl VolumeDescription {
    /// A raw volume of exactly `size` bytes.
    pub fn raw(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            capacity: size,
            unit: CAPACITY_UNIT.to_string(),
            format: VOLUME_FORMAT.to_string(),
        }
    }

    /// Renders the libvirt `<volume>` document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        // writing into a String cannot fail
        let _ = write!(
            xml,
            "<volume>\n  <name>{}</name>\n  <capacity unit=\"{}\">{}</capacity>\n  <target>\n    <format type=\"{}\"/>\n  </target>\n</volume>\n",
            escape_xml(&self.name),
            escape_xml(&self.unit),
            self.capacity,
            escape_xml(&self.format),
        );
        xml
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Remote calls the seed flows depend on.
pub trait StorageBackend: Send + Sync {
    /// `Ok(None)` when no pool has that name.
    fn lookup_pool_by_name(&self, name: &str) -> Result<Option<PoolHandle>>;

    /// Makes the backend pick up volumes created behind its back.
    fn refresh_pool(&self, pool: &PoolHandle) -> Result<()>;

    fn create_volume(&self, pool: &PoolHandle, description: &VolumeDescription) -> Result<VolumeHandle>;

    /// Streams `length` bytes starting at `offset` into `sink`.
    fn download_volume(&self, volume: &VolumeHandle, sink: &mut dyn Write, offset: u64, length: u64) -> Result<()>;

    /// Replaces the volume contents with `size` bytes read from `source`.
    fn upload_volume(&self, volume: &VolumeHandle, source: &mut dyn Read, size: u64) -> Result<()>;

    fn volume_info(&self, volume: &VolumeHandle) -> Result<VolumeInfo>;

    fn lookup_volume_by_key(&self, key: &str) -> Result<VolumeHandle>;

    fn lookup_pool_by_volume(&self, volume: &VolumeHandle) -> Result<PoolHandle>;
}
