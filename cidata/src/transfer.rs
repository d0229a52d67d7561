//! # cidata Volume Transfer Module
//!
//! Moves seed images between local disk and the storage backend.
//!
//! Uploads create the target volume first, so they run under the pool's lock
//! (see [`PoolLockRegistry`]). Downloads only read an existing volume and take
//! no lock.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::backend::{PoolHandle, StorageBackend, VolumeDescription, VolumeHandle};
use crate::config::SeedOptions;
use crate::constants::MAX_DOWNLOAD_BUFFER;
use crate::image_builder::LocalImage;
use crate::pool_lock::PoolLockRegistry;
use crate::seed_errors::SeedError;

/// A failed download. When the failure happened after the local file was
/// allocated, that file is handed back in `partial`; the caller decides
/// whether to inspect it, and dropping it deletes it.
#[derive(Debug, Error)]
#[error("{error:#}")]
pub struct DownloadError {
    pub error: anyhow::Error,
    pub partial: Option<NamedTempFile>,
}

impl DownloadError {
    fn without_file(error: anyhow::Error) -> Self {
        Self { error, partial: None }
    }

    /// Discards the partial file, keeping the error.
    pub fn into_error(self) -> anyhow::Error {
        self.error
    }
}

/// Counts the bytes accepted by the wrapped writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct VolumeTransferClient {
    backend: Arc<dyn StorageBackend>,
    locks: PoolLockRegistry,
    temp_dir: PathBuf,
    temp_prefix: String,
}

impl VolumeTransferClient {
    pub fn new(backend: Arc<dyn StorageBackend>, locks: PoolLockRegistry, options: &SeedOptions) -> Self {
        Self {
            backend,
            locks,
            temp_dir: options.temp_dir(),
            temp_prefix: options.temp_prefix.clone(),
        }
    }

    /// Creates `volume_name` in `pool` sized to the image and fills it with
    /// the image bytes. Returns the backend's key for the new volume.
    ///
    /// The image's temp directory is removed afterwards whatever the outcome.
    pub fn upload(&self, pool: &PoolHandle, volume_name: &str, image: LocalImage) -> Result<String> {
        let result = self
            .locks
            .with_pool_lock(&pool.name, || self.upload_locked(pool, volume_name, &image));
        image.cleanup();
        result
    }

    fn upload_locked(&self, pool: &PoolHandle, volume_name: &str, image: &LocalImage) -> Result<String> {
        self.backend
            .refresh_pool(pool)
            .with_context(|| format!("can't refresh storage pool '{}'", pool.name))?;

        let size = image.size()?;
        let description = VolumeDescription::raw(volume_name, size);
        let volume = self
            .backend
            .create_volume(pool, &description)
            .with_context(|| format!("can't create volume {volume_name}"))?;

        let mut source = File::open(image.path())
            .with_context(|| format!("can't open ISO file {}", image.path().display()))?;
        self.backend
            .upload_volume(&volume, &mut source, size)
            .with_context(|| format!("can't upload ISO file {} to volume {volume_name}", image.path().display()))?;

        if volume.key.is_empty() {
            return Err(SeedError::MissingVolumeKey(volume_name.to_string()).into());
        }
        info!("Uploaded {size} bytes to volume {volume_name} in pool {}", pool.name);
        Ok(volume.key)
    }

    /// Copies the whole volume into a new local temp file, rewound to the
    /// start. The caller owns the file and its removal.
    pub fn download(&self, volume: &VolumeHandle) -> Result<NamedTempFile, DownloadError> {
        let info = self
            .backend
            .volume_info(volume)
            .with_context(|| format!("can't retrieve info of volume {}", volume.name))
            .map_err(DownloadError::without_file)?;

        let mut file = tempfile::Builder::new()
            .prefix(&self.temp_prefix)
            .tempfile_in(&self.temp_dir)
            .map_err(|source| SeedError::TempAllocation { kind: "file", path: self.temp_dir.clone(), source })
            .context("cannot create local file to download the ISO")
            .map_err(DownloadError::without_file)?;

        match self.download_into(volume, file.as_file_mut(), info.capacity) {
            Ok(()) => {
                info!("Downloaded {} bytes of volume {}", info.capacity, volume.name);
                Ok(file)
            }
            Err(error) => Err(DownloadError { error, partial: Some(file) }),
        }
    }

    fn download_into(&self, volume: &VolumeHandle, file: &mut File, expected: u64) -> Result<()> {
        let capacity = expected.min(MAX_DOWNLOAD_BUFFER) as usize;
        let mut writer = CountingWriter { inner: BufWriter::with_capacity(capacity, &mut *file), count: 0 };

        // whatever arrived is flushed to disk even when streaming broke off
        let streamed = self.backend.download_volume(volume, &mut writer, 0, expected);
        let flushed = writer.flush();
        streamed.with_context(|| format!("can't download volume {}", volume.name))?;
        flushed.with_context(|| format!("can't write downloaded volume {}", volume.name))?;

        let copied = writer.count;
        if copied != expected {
            return Err(SeedError::SizeMismatch { expected, copied }).with_context(|| format!("volume {} was truncated", volume.name));
        }
        drop(writer);

        file.seek(SeekFrom::Start(0)).context("can't rewind downloaded ISO")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SeedPayloads;
    use crate::image_builder::ImageBuilder;
    use crate::memory_backend::{BackendCall, InMemoryBackend};
    use std::io::Read;

    fn options(root: &std::path::Path) -> SeedOptions {
        SeedOptions {
            capacity: 1024 * 1024,
            temp_root: Some(root.to_path_buf()),
            ..SeedOptions::default()
        }
    }

    fn client(backend: &Arc<InMemoryBackend>, root: &std::path::Path) -> VolumeTransferClient {
        VolumeTransferClient::new(backend.clone(), PoolLockRegistry::new(), &options(root))
    }

    #[test]
    fn test_upload_then_download() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_pool("default"));
        let client = client(&backend, root.path());

        let image = ImageBuilder::new(options(root.path()))
            .build("seed.iso", &SeedPayloads::new("u", "m", "n"))
            .unwrap();
        let image_dir = image.path().parent().unwrap().to_path_buf();
        let local = std::fs::read(image.path()).unwrap();

        let key = client.upload(&PoolHandle::new("default"), "seed.iso", image).unwrap();
        assert_eq!(key, "/default/seed.iso");
        assert!(!image_dir.exists());
        assert_eq!(backend.volume_data(&key).unwrap(), local);

        let volume = backend.lookup_volume_by_key(&key).unwrap();
        let mut file = client.download(&volume).unwrap();
        let mut downloaded = Vec::new();
        file.read_to_end(&mut downloaded).unwrap();
        assert_eq!(downloaded, local);
        assert!(file.path().starts_with(root.path()));
    }

    #[test]
    fn test_upload_order_and_failures_clean_up() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_pool("default"));
        let client = client(&backend, root.path());
        let builder = ImageBuilder::new(options(root.path()));

        let first = builder.build("seed", &SeedPayloads::default()).unwrap();
        client.upload(&PoolHandle::new("default"), "seed", first).unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::RefreshPool("default".into()),
                BackendCall::CreateVolume { pool: "default".into(), volume: "seed".into() },
                BackendCall::UploadVolume { pool: "default".into(), volume: "seed".into() },
            ]
        );

        let second = builder.build("seed", &SeedPayloads::default()).unwrap();
        let second_dir = second.path().parent().unwrap().to_path_buf();
        let err = client.upload(&PoolHandle::new("default"), "seed", second).unwrap_err();
        assert!(err.to_string().contains("can't create volume seed"));
        assert!(!second_dir.exists());
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_pool("default").with_omitted_keys());
        let image = ImageBuilder::new(options(root.path()))
            .build("seed", &SeedPayloads::default())
            .unwrap();
        let err = client(&backend, root.path())
            .upload(&PoolHandle::new("default"), "seed", image)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<SeedError>(), Some(SeedError::MissingVolumeKey(name)) if name == "seed"));
    }

    #[test]
    fn test_short_download_is_a_size_mismatch() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_short_download(100));
        let volume = backend.insert_volume("default", "seed", vec![7; 4096]);

        let err = client(&backend, root.path()).download(&volume).unwrap_err();
        assert!(matches!(
            err.error.downcast_ref::<SeedError>(),
            Some(SeedError::SizeMismatch { expected: 4096, copied: 3996 })
        ));
        let partial = err.partial.unwrap();
        assert_eq!(std::fs::metadata(partial.path()).unwrap().len(), 3996);
    }

    #[test]
    fn test_interrupted_download_returns_the_partial_file() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_interrupted_download(1000));
        let volume = backend.insert_volume("default", "seed", vec![7; 4096]);

        let err = client(&backend, root.path()).download(&volume).unwrap_err();
        assert!(err.to_string().contains("can't download volume seed"));
        assert!(!matches!(err.error.downcast_ref::<SeedError>(), Some(SeedError::SizeMismatch { .. })));

        let partial = err.partial.unwrap();
        assert_eq!(std::fs::read(partial.path()).unwrap(), vec![7; 1000]);
    }

    #[test]
    fn test_download_of_unknown_volume_has_no_partial_file() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let volume = VolumeHandle { key: "/default/nope".into(), name: "nope".into() };
        let err = client(&backend, root.path()).download(&volume).unwrap_err();
        assert!(err.partial.is_none());
        assert!(err.to_string().contains("can't retrieve info of volume nope"));
    }

    #[test]
    fn test_missing_temp_dir_keeps_the_io_cause() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let volume = backend.insert_volume("default", "seed", vec![1; 16]);

        let err = client(&backend, &root.path().join("gone")).download(&volume).unwrap_err();
        assert!(err.partial.is_none());
        assert!(matches!(
            err.error.downcast_ref::<SeedError>(),
            Some(SeedError::TempAllocation { kind: "file", source, .. }) if source.kind() == io::ErrorKind::NotFound
        ));
    }

    #[test]
    fn test_empty_volume_downloads_to_empty_file() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let volume = backend.insert_volume("default", "empty", Vec::new());
        let file = client(&backend, root.path()).download(&volume).unwrap();
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 0);
    }
}
