//! # cidata Image Builder Module
//!
//! Turns the three seed payloads into a finished ISO9660 image on local
//! disk. Every build gets its own temp directory so concurrent builds of
//! seeds with the same name never collide; the image lives inside it and is
//! removed together with it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use sysinfo::Disks;
use tempfile::TempDir;

use crate::config::{SeedFile, SeedOptions, SeedPayloads};
use crate::file_system::{FinalizeOptions, IsoFileSystem};
use crate::seed_errors::SeedError;
use std::io::Write;

/// A built image and the temp directory that owns it. Dropping it removes
/// both; [`LocalImage::cleanup`] does the same but reports failures.
#[derive(Debug)]
pub struct LocalImage {
    path: PathBuf,
    dir: TempDir,
}

impl LocalImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact byte size of the image file.
    pub fn size(&self) -> Result<u64> {
        let metadata = std::fs::metadata(&self.path)
            .with_context(|| format!("cannot stat image {}", self.path.display()))?;
        Ok(metadata.len())
    }

    /// Best-effort removal of the temp directory; failures are only logged.
    pub fn cleanup(self) {
        let dir = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!("error while removing tmp directory {} holding the ISO file: {err}", dir.display());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    pub options: SeedOptions,
}

impl ImageBuilder {
    pub fn new(options: SeedOptions) -> Self {
        Self { options }
    }

    /// Builds `<tmp>/<prefix>XXXX/<name>` holding the three seed files.
    pub fn build(&self, name: &str, payloads: &SeedPayloads) -> Result<LocalImage> {
        if name.is_empty() || name.contains(['/', '\0']) || name == "." || name == ".." {
            return Err(SeedError::InvalidFileName(name.to_string()).into());
        }
        info!("Creating new ISO {name}");

        let temp_root = self.options.temp_dir();
        ensure_free_space(&temp_root, self.options.capacity)?;
        let dir = tempfile::Builder::new()
            .prefix(&self.options.temp_prefix)
            .tempdir_in(&temp_root)
            .map_err(|source| SeedError::TempAllocation { kind: "directory", path: temp_root.clone(), source })
            .context("cannot create tmp directory for cloudinit ISO generation")?;
        let path = dir.path().join(name);

        let mut fs = IsoFileSystem::create(&path, self.options.capacity).context("error while creating ISO disk")?;
        for file in SeedFile::ALL {
            let file_name = file.file_name();
            let mut writer = fs
                .open_file(file_name)
                .with_context(|| format!("error while opening {file_name}"))?;
            writer
                .write_all(payloads.get(file))
                .with_context(|| format!("error while writing {file_name}"))?;
            writer.close().with_context(|| format!("error while closing {file_name}"))?;
        }

        let finalize = FinalizeOptions {
            rock_ridge: self.options.rock_ridge,
            volume_identifier: self.options.volume_label.clone(),
        };
        let path = fs.finalize(&finalize).context("error while finalizing ISO")?;

        Ok(LocalImage { path, dir })
    }
}

/// Fails when the disk backing `path` has less than `required` bytes free.
/// Paths not covered by any known mount point are let through.
pub fn ensure_free_space(path: &Path, required: u64) -> Result<()> {
    let Some(available) = get_free_space(path) else {
        return Ok(());
    };
    if available < required {
        return Err(SeedError::InsufficientSpace { path: path.to_path_buf(), available, required }.into());
    }
    Ok(())
}

fn get_free_space(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();

    // the most specific mount point wins, `/` covers everything
    disks
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}
