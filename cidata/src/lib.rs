//! # cidata
//!
//! Lifecycle core for cloud-init seed images (NoCloud `cidata` volumes).
//!
//! A seed is an ISO9660 image labelled `cidata` carrying three files:
//! `user-data`, `meta-data` and `network-config`. This crate
//!     1. builds such images locally, with Rock Ridge long names.
//!     2. uploads them into a storage pool, serializing volume creation per pool.
//!     3. downloads them again, verifying the byte count.
//!     4. reads the three payloads back using the short names a plain
//!         ISO9660 reader reports.
//!
//! The storage service itself is behind [`backend::StorageBackend`].
//!
//! Copyrights © 2025, cidata Contributors

pub mod backend;
pub mod config;
pub mod constants;
pub mod core;
pub mod file_system;
pub mod image_builder;
pub mod memory_backend;
pub mod pool_lock;
pub mod prelude;
pub mod reconstruct;
pub mod resource_key;
pub mod seed;
pub mod seed_errors;
pub mod transfer;
pub mod utils;
