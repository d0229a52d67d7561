//! # cidata In-Memory Backend Module
//!
//! A [`StorageBackend`] living entirely in process. Volumes are byte vectors
//! keyed `/<pool>/<volume>`. Every call is appended to a log before it is
//! served, so callers can check the order remote calls were issued in.
//!
//! Knobs simulate a misbehaving remote: a delay applied to every call
//! (widens race windows), a number of bytes silently dropped from the end of
//! every download, and downloads that break off with an error partway.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use crate::backend::{PoolHandle, StorageBackend, VolumeDescription, VolumeHandle, VolumeInfo, VolumeType};

/// One served call, with the identifiers it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    LookupPoolByName(String),
    RefreshPool(String),
    CreateVolume { pool: String, volume: String },
    UploadVolume { pool: String, volume: String },
    DownloadVolume { pool: String, volume: String },
    VolumeInfo(String),
    LookupVolumeByKey(String),
    LookupPoolByVolume(String),
}

impl BackendCall {
    /// Pool the call acted on, for calls that mutate a pool.
    pub fn mutated_pool(&self) -> Option<&str> {
        match self {
            BackendCall::RefreshPool(pool)
            | BackendCall::CreateVolume { pool, .. }
            | BackendCall::UploadVolume { pool, .. } => Some(pool),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct StoredVolume {
    pool: String,
    name: String,
    capacity: u64,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    pools: BTreeSet<String>,
    volumes: BTreeMap<String, StoredVolume>,
    calls: Vec<BackendCall>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    call_delay: Duration,
    short_download: u64,
    interrupt_download: Option<u64>,
    omit_keys: bool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(self, name: &str) -> Self {
        self.add_pool(name);
        self
    }

    /// Sleeps this long inside every call, after it is logged.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Drops `bytes` from the end of every download without reporting it.
    pub fn with_short_download(mut self, bytes: u64) -> Self {
        self.short_download = bytes;
        self
    }

    /// Every download delivers at most `bytes` bytes and then fails.
    pub fn with_interrupted_download(mut self, bytes: u64) -> Self {
        self.interrupt_download = Some(bytes);
        self
    }

    /// Created volumes come back with an empty key.
    pub fn with_omitted_keys(mut self) -> Self {
        self.omit_keys = true;
        self
    }

    pub fn add_pool(&self, name: &str) {
        self.state().pools.insert(name.to_string());
    }

    /// Stores a volume directly, as if it had been created by someone else.
    /// Neither the pool nor the volume name is validated.
    pub fn insert_volume(&self, pool: &str, name: &str, data: Vec<u8>) -> VolumeHandle {
        let key = volume_key(pool, name);
        let volume = StoredVolume {
            pool: pool.to_string(),
            name: name.to_string(),
            capacity: data.len() as u64,
            data,
        };
        self.state().volumes.insert(key.clone(), volume);
        VolumeHandle { key, name: name.to_string() }
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn volume_data(&self, key: &str) -> Option<Vec<u8>> {
        self.state().volumes.get(key).map(|volume| volume.data.clone())
    }

    pub fn volume_count(&self) -> usize {
        self.state().volumes.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: BackendCall) {
        debug!("in-memory backend: {call:?}");
        self.state().calls.push(call);
        if !self.call_delay.is_zero() {
            thread::sleep(self.call_delay);
        }
    }

    fn require_pool(&self, pool: &PoolHandle) -> Result<()> {
        if !self.state().pools.contains(&pool.name) {
            bail!("storage pool '{}' does not exist", pool.name);
        }
        Ok(())
    }

    /// Storage key of `volume`. Handles handed out without a key are
    /// resolved by volume name.
    fn resolve(&self, volume: &VolumeHandle) -> String {
        if !volume.key.is_empty() {
            return volume.key.clone();
        }
        self.state()
            .volumes
            .iter()
            .find(|(_, stored)| stored.name == volume.name)
            .map(|(key, _)| key.clone())
            .unwrap_or_default()
    }

    fn pool_of(&self, key: &str) -> String {
        self.state()
            .volumes
            .get(key)
            .map(|stored| stored.pool.clone())
            .unwrap_or_default()
    }
}

fn volume_key(pool: &str, name: &str) -> String {
    format!("/{pool}/{name}")
}

fn no_volume(key: &str) -> anyhow::Error {
    anyhow!("no storage vol with matching key {key}")
}

impl StorageBackend for InMemoryBackend {
    fn lookup_pool_by_name(&self, name: &str) -> Result<Option<PoolHandle>> {
        self.record(BackendCall::LookupPoolByName(name.to_string()));
        Ok(self.state().pools.contains(name).then(|| PoolHandle::new(name)))
    }

    fn refresh_pool(&self, pool: &PoolHandle) -> Result<()> {
        self.record(BackendCall::RefreshPool(pool.name.clone()));
        self.require_pool(pool)
    }

    fn create_volume(&self, pool: &PoolHandle, description: &VolumeDescription) -> Result<VolumeHandle> {
        self.record(BackendCall::CreateVolume { pool: pool.name.clone(), volume: description.name.clone() });
        self.require_pool(pool)?;
        if description.unit != "B" {
            bail!("unsupported capacity unit '{}'", description.unit);
        }
        let capacity = usize::try_from(description.capacity).context("volume capacity does not fit in memory")?;

        let key = volume_key(&pool.name, &description.name);
        let mut state = self.state();
        if state.volumes.contains_key(&key) {
            bail!("storage volume '{}' already exists", description.name);
        }
        state.volumes.insert(
            key.clone(),
            StoredVolume {
                pool: pool.name.clone(),
                name: description.name.clone(),
                capacity: description.capacity,
                data: vec![0; capacity],
            },
        );

        let key = if self.omit_keys { String::new() } else { key };
        Ok(VolumeHandle { key, name: description.name.clone() })
    }

    fn download_volume(&self, volume: &VolumeHandle, sink: &mut dyn Write, offset: u64, length: u64) -> Result<()> {
        let key = self.resolve(volume);
        self.record(BackendCall::DownloadVolume { pool: self.pool_of(&key), volume: volume.name.clone() });

        let data = self.volume_data(&key).ok_or_else(|| no_volume(&key))?;
        let end = offset.saturating_add(length).min(data.len() as u64);
        let end = end.saturating_sub(self.short_download);
        let start = offset.min(end);
        let end = match self.interrupt_download {
            Some(limit) => end.min(start.saturating_add(limit)),
            None => end,
        };
        sink.write_all(&data[start as usize..end as usize])
            .context("stream send failed")?;
        if self.interrupt_download.is_some() {
            bail!("stream interrupted after {} bytes", end - start);
        }
        Ok(())
    }

    fn upload_volume(&self, volume: &VolumeHandle, source: &mut dyn Read, size: u64) -> Result<()> {
        let key = self.resolve(volume);
        self.record(BackendCall::UploadVolume { pool: self.pool_of(&key), volume: volume.name.clone() });

        let mut data = Vec::new();
        source.take(size).read_to_end(&mut data).context("stream receive failed")?;
        if (data.len() as u64) != size {
            bail!("stream ended after {} of {size} bytes", data.len());
        }

        let mut state = self.state();
        let stored = state.volumes.get_mut(&key).ok_or_else(|| no_volume(&key))?;
        if size > stored.capacity {
            bail!("upload of {size} bytes exceeds capacity {} of volume '{}'", stored.capacity, stored.name);
        }
        stored.data = data;
        Ok(())
    }

    fn volume_info(&self, volume: &VolumeHandle) -> Result<VolumeInfo> {
        let key = self.resolve(volume);
        self.record(BackendCall::VolumeInfo(key.clone()));
        let state = self.state();
        let stored = state.volumes.get(&key).ok_or_else(|| no_volume(&key))?;
        Ok(VolumeInfo {
            kind: VolumeType::File,
            capacity: stored.data.len() as u64,
            allocation: stored.data.len() as u64,
        })
    }

    fn lookup_volume_by_key(&self, key: &str) -> Result<VolumeHandle> {
        self.record(BackendCall::LookupVolumeByKey(key.to_string()));
        let state = self.state();
        let stored = state.volumes.get(key).ok_or_else(|| no_volume(key))?;
        Ok(VolumeHandle { key: key.to_string(), name: stored.name.clone() })
    }

    fn lookup_pool_by_volume(&self, volume: &VolumeHandle) -> Result<PoolHandle> {
        self.record(BackendCall::LookupPoolByVolume(volume.key.clone()));
        let state = self.state();
        let stored = state.volumes.get(&volume.key).ok_or_else(|| no_volume(&volume.key))?;
        Ok(PoolHandle::new(stored.pool.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_create_upload_download() {
        let backend = InMemoryBackend::new().with_pool("default");
        let pool = backend.lookup_pool_by_name("default").unwrap().unwrap();
        let volume = backend.create_volume(&pool, &VolumeDescription::raw("seed", 5)).unwrap();
        assert_eq!(volume.key, "/default/seed");

        backend.upload_volume(&volume, &mut Cursor::new(b"hello"), 5).unwrap();
        assert_eq!(backend.volume_data("/default/seed").unwrap(), b"hello");

        let mut sink = Vec::new();
        backend.download_volume(&volume, &mut sink, 1, 3).unwrap();
        assert_eq!(sink, b"ell");

        let info = backend.volume_info(&volume).unwrap();
        assert_eq!((info.kind, info.capacity, info.allocation), (VolumeType::File, 5, 5));
    }

    #[test]
    fn test_lookups() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.lookup_pool_by_name("missing").unwrap(), None);

        let volume = backend.insert_volume("images", "vol", vec![1, 2, 3]);
        assert_eq!(backend.lookup_volume_by_key("/images/vol").unwrap(), volume);
        assert_eq!(backend.lookup_pool_by_volume(&volume).unwrap().name, "images");
        assert!(backend.lookup_volume_by_key("/images/other").is_err());
    }

    #[test]
    fn test_create_rejects_duplicates_and_unknown_pools() {
        let backend = InMemoryBackend::new().with_pool("default");
        let pool = PoolHandle::new("default");
        backend.create_volume(&pool, &VolumeDescription::raw("seed", 1)).unwrap();
        assert!(backend.create_volume(&pool, &VolumeDescription::raw("seed", 1)).is_err());
        assert!(backend.create_volume(&PoolHandle::new("other"), &VolumeDescription::raw("seed", 1)).is_err());
        assert!(backend.refresh_pool(&PoolHandle::new("other")).is_err());
    }

    #[test]
    fn test_upload_size_checks() {
        let backend = InMemoryBackend::new().with_pool("default");
        let volume = backend.create_volume(&PoolHandle::new("default"), &VolumeDescription::raw("seed", 2)).unwrap();
        assert!(backend.upload_volume(&volume, &mut Cursor::new(b"abc"), 3).is_err());
        assert!(backend.upload_volume(&volume, &mut Cursor::new(b"a"), 2).is_err());
    }

    #[test]
    fn test_short_download_knob() {
        let backend = InMemoryBackend::new().with_short_download(2);
        let volume = backend.insert_volume("p", "v", b"abcdef".to_vec());
        let mut sink = Vec::new();
        backend.download_volume(&volume, &mut sink, 0, 6).unwrap();
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn test_interrupted_download_knob() {
        let backend = InMemoryBackend::new().with_interrupted_download(3);
        let volume = backend.insert_volume("p", "v", b"abcdef".to_vec());
        let mut sink = Vec::new();
        let err = backend.download_volume(&volume, &mut sink, 0, 6).unwrap_err();
        assert_eq!(sink, b"abc");
        assert!(err.to_string().contains("interrupted after 3 bytes"));
    }

    #[test]
    fn test_call_log_records_targets() {
        let backend = InMemoryBackend::new().with_pool("default");
        let pool = PoolHandle::new("default");
        backend.refresh_pool(&pool).unwrap();
        let volume = backend.create_volume(&pool, &VolumeDescription::raw("seed", 1)).unwrap();
        backend.upload_volume(&volume, &mut Cursor::new(b"x"), 1).unwrap();

        let calls = backend.calls();
        assert_eq!(
            calls,
            vec![
                BackendCall::RefreshPool("default".into()),
                BackendCall::CreateVolume { pool: "default".into(), volume: "seed".into() },
                BackendCall::UploadVolume { pool: "default".into(), volume: "seed".into() },
            ]
        );
        assert!(calls.iter().all(|call| call.mutated_pool() == Some("default")));
    }

    #[test]
    fn test_omitted_keys() {
        let backend = InMemoryBackend::new().with_pool("default").with_omitted_keys();
        let volume = backend.create_volume(&PoolHandle::new("default"), &VolumeDescription::raw("seed", 1)).unwrap();
        assert!(volume.key.is_empty());
        assert_eq!(backend.volume_count(), 1);

        backend.upload_volume(&volume, &mut Cursor::new(b"x"), 1).unwrap();
        assert_eq!(backend.volume_data("/default/seed").unwrap(), b"x");
    }
}
