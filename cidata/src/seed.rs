//! # cidata Seed Module
//!
//! The two flows the surrounding system drives:
//!
//! - **create**: resolve the pool, build the image locally, upload it into a
//!   new volume and hand out `<volume key>;<token>`.
//! - **load**: parse the identifier, find the volume and its pool, download
//!   the image and read the three payloads back out of it.
//!
//! A [`SeedManager`] owns the backend handle and shares its
//! [`PoolLockRegistry`] with anything else creating volumes in the same pools.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::config::{SeedConfig, SeedOptions};
use crate::image_builder::ImageBuilder;
use crate::pool_lock::PoolLockRegistry;
use crate::reconstruct::reconstruct;
use crate::resource_key::{build_resource_id, parse_resource_id};
use crate::seed_errors::SeedError;
use crate::transfer::{DownloadError, VolumeTransferClient};

pub struct SeedManager {
    backend: Arc<dyn StorageBackend>,
    builder: ImageBuilder,
    transfer: VolumeTransferClient,
}

impl SeedManager {
    pub fn new(backend: Arc<dyn StorageBackend>, locks: PoolLockRegistry, options: SeedOptions) -> Self {
        let transfer = VolumeTransferClient::new(backend.clone(), locks, &options);
        Self { backend, builder: ImageBuilder::new(options), transfer }
    }

    /// Creates the seed volume and returns its external identifier.
    pub fn create(&self, config: &SeedConfig) -> Result<String> {
        let pool = self
            .backend
            .lookup_pool_by_name(&config.pool_name)
            .with_context(|| format!("can't find storage pool '{}'", config.pool_name))?
            .ok_or_else(|| SeedError::PoolNotFound(config.pool_name.clone()))?;

        let image = self
            .builder
            .build(&config.name, &config.payloads())
            .context("error while creating cloudinit ISO")?;
        let key = self.transfer.upload(&pool, &config.name, image)?;

        let id = build_resource_id(&key);
        info!("Created seed {} in pool {} as {id}", config.name, pool.name);
        Ok(id)
    }

    /// Rebuilds the [`SeedConfig`] behind an identifier returned by
    /// [`SeedManager::create`]. Seed files absent from the image load as
    /// empty payloads.
    pub fn load(&self, id: &str) -> Result<SeedConfig> {
        let key = parse_resource_id(id)?;
        let volume = self
            .backend
            .lookup_volume_by_key(key)
            .with_context(|| format!("error while retrieving volume with key '{key}'"))?;
        if volume.name.is_empty() {
            return Err(SeedError::EmptyVolumeName(key.to_string()).into());
        }

        let pool = self
            .backend
            .lookup_pool_by_volume(&volume)
            .with_context(|| format!("error while retrieving pool of volume {}", volume.name))?;
        if pool.name.is_empty() {
            return Err(SeedError::EmptyPoolName(volume.name).into());
        }

        let file = self.transfer.download(&volume).map_err(DownloadError::into_error)?;
        let reconstruction = reconstruct(file.as_file())
            .with_context(|| format!("error while reading ISO of volume {}", volume.name))?;
        for missing in &reconstruction.missing {
            warn!("{missing} not found in ISO of volume {}, loading it as empty", volume.name);
        }

        let mut config = SeedConfig::new(volume.name, pool.name);
        config.set_payloads(reconstruction.payloads);
        debug!("Read cloudinit from volume: {config:?}");
        Ok(config)
    }
}
