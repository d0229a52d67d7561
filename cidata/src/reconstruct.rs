//! # cidata Seed Reconstructor Module
//!
//! Reads a seed image back into its three payloads. Entries are matched by
//! the short name a non-Joliet reader reports (see
//! [`ShortNameTable`]), never by Rock Ridge names, so images written by other
//! tools reload the same way. Unrelated files are read and ignored.
//!
//! Each entry is read into memory whole. Seed payloads are small text files,
//! so no streaming is attempted; this is not meant for arbitrary images.

use std::io::{Read, Seek};

use anyhow::{Context, Result};
use log::debug;

use crate::config::{SeedFile, SeedPayloads};
use crate::core::short_name::{LegacyReaderNames, ShortNameTable};
use crate::file_system::IsoReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
    pub payloads: SeedPayloads,
    /// Seed files that never showed up in the image. Their payloads are left
    /// empty, which alone would be indistinguishable from an empty file.
    pub missing: Vec<SeedFile>,
}

impl Reconstruction {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Reconstructs with the [`LegacyReaderNames`] table.
pub fn reconstruct<R: Read + Seek>(image: R) -> Result<Reconstruction> {
    reconstruct_with(image, &LegacyReaderNames)
}

pub fn reconstruct_with<R: Read + Seek, T: ShortNameTable>(image: R, names: &T) -> Result<Reconstruction> {
    let mut reader = IsoReader::new(image).context("error initializing ISO reader")?;
    let mut payloads = SeedPayloads::default();
    let mut seen = Vec::with_capacity(SeedFile::ALL.len());

    while let Some(entry) = reader.next_entry()? {
        debug!("ISO reader: processing file {}", entry.name);
        let data = reader
            .read_contents(&entry)
            .with_context(|| format!("error while reading {}", entry.name))?;

        if entry.is_dir {
            continue;
        }
        if let Some(file) = names.classify(&entry.name) {
            payloads.set(file, data);
            seen.push(file);
        }
    }

    let missing = SeedFile::ALL.into_iter().filter(|file| !seen.contains(file)).collect();
    Ok(Reconstruction { payloads, missing })
}
