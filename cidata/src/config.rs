//! # cidata Configuration Module
//!
//! Two kinds of configuration live here:
//! - [`SeedOptions`]: how images are produced (capacity, label, Rock Ridge,
//!   where temp files go). Persisted as TOML and loaded with defaults for
//!   every missing key.
//! - [`SeedConfig`]: the seed itself, i.e. the three cloud-init payloads plus
//!   the volume and pool names. Also serde-friendly so seed definitions can be
//!   kept in TOML next to the options.
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_CAPACITY, DEFAULT_TEMP_PREFIX, DEFAULT_VOLUME_LABEL, META_DATA_FILE_NAME, NETWORK_CONFIG_FILE_NAME,
    USER_DATA_FILE_NAME,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeedOptions {
    pub capacity: u64,
    pub volume_label: String,
    pub rock_ridge: bool,
    pub temp_prefix: String,
    pub temp_root: Option<PathBuf>,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            volume_label: DEFAULT_VOLUME_LABEL.into(),
            rock_ridge: true,
            temp_prefix: DEFAULT_TEMP_PREFIX.into(),
            temp_root: None,
        }
    }
}

impl SeedOptions {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SeedOptions> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("cannot parse {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).with_context(|| format!("cannot write {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<SeedOptions> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Directory temp files are created under.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// One of the three files every seed image carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeedFile {
    UserData,
    MetaData,
    NetworkConfig,
}

impl SeedFile {
    pub const ALL: [SeedFile; 3] = [SeedFile::UserData, SeedFile::MetaData, SeedFile::NetworkConfig];

    pub fn file_name(self) -> &'static str {
        match self {
            SeedFile::UserData => USER_DATA_FILE_NAME,
            SeedFile::MetaData => META_DATA_FILE_NAME,
            SeedFile::NetworkConfig => NETWORK_CONFIG_FILE_NAME,
        }
    }
}

impl fmt::Display for SeedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Byte-exact contents of the three seed files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPayloads {
    pub user_data: Vec<u8>,
    pub meta_data: Vec<u8>,
    pub network_config: Vec<u8>,
}

impl SeedPayloads {
    pub fn new(user_data: impl Into<Vec<u8>>, meta_data: impl Into<Vec<u8>>, network_config: impl Into<Vec<u8>>) -> Self {
        Self {
            user_data: user_data.into(),
            meta_data: meta_data.into(),
            network_config: network_config.into(),
        }
    }

    pub fn get(&self, file: SeedFile) -> &[u8] {
        match file {
            SeedFile::UserData => &self.user_data,
            SeedFile::MetaData => &self.meta_data,
            SeedFile::NetworkConfig => &self.network_config,
        }
    }

    pub fn set(&mut self, file: SeedFile, data: Vec<u8>) {
        match file {
            SeedFile::UserData => self.user_data = data,
            SeedFile::MetaData => self.meta_data = data,
            SeedFile::NetworkConfig => self.network_config = data,
        }
    }
}

/// The seed itself. Payloads are opaque bytes: gzip-compressed or otherwise
/// binary user-data is carried as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeedConfig {
    pub name: String,
    pub pool_name: String,
    #[serde(with = "payload_text")]
    pub user_data: Vec<u8>,
    #[serde(with = "payload_text")]
    pub meta_data: Vec<u8>,
    #[serde(with = "payload_text")]
    pub network_config: Vec<u8>,
}

impl SeedConfig {
    pub fn new(name: impl Into<String>, pool_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool_name: pool_name.into(),
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> SeedPayloads {
        SeedPayloads::new(
            self.user_data.as_slice(),
            self.meta_data.as_slice(),
            self.network_config.as_slice(),
        )
    }

    pub fn set_payloads(&mut self, payloads: SeedPayloads) {
        self.user_data = payloads.user_data;
        self.meta_data = payloads.meta_data;
        self.network_config = payloads.network_config;
    }

    /// The payload as text, `None` when it is not UTF-8.
    pub fn text(&self, file: SeedFile) -> Option<&str> {
        let data = match file {
            SeedFile::UserData => &self.user_data,
            SeedFile::MetaData => &self.meta_data,
            SeedFile::NetworkConfig => &self.network_config,
        };
        std::str::from_utf8(data).ok()
    }
}

/// TOML form of a payload: a string when it is UTF-8, an array of bytes
/// otherwise. Both forms are accepted on input.
mod payload_text {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(data) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(data),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(match Payload::deserialize(deserializer)? {
            Payload::Text(text) => text.into_bytes(),
            Payload::Bytes(bytes) => bytes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seed_options_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cidata.toml");

        let options = SeedOptions {
            capacity: 4 * 1024 * 1024,
            temp_root: Some(dir.path().to_path_buf()),
            ..SeedOptions::default()
        };
        options.save(&path).unwrap();

        let loaded = SeedOptions::load(&path).unwrap();
        assert_eq!(loaded, options);
        assert_eq!(loaded.temp_dir(), dir.path());
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let options = SeedOptions::from_toml_str("volume_label = \"CIDATA\"\n").unwrap();
        assert_eq!(options.volume_label, "CIDATA");
        assert_eq!(options.capacity, DEFAULT_CAPACITY);
        assert!(options.rock_ridge);
        assert_eq!(options.temp_prefix, "cloudinit");
        assert!(options.temp_root.is_none());
    }

    #[test]
    fn test_load_reports_the_path() {
        let err = SeedOptions::load("/nonexistent/cidata.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cidata.toml"));
    }

    #[test]
    fn test_seed_config_from_toml() {
        let config: SeedConfig = toml::from_str(
            r##"
            name = "seed1"
            pool_name = "default"
            user_data = "#cloud-config\n"
            meta_data = "instance-id: i-1"
            "##,
        )
        .unwrap();
        assert_eq!(config.name, "seed1");
        assert!(config.network_config.is_empty());
        assert_eq!(config.text(SeedFile::UserData), Some("#cloud-config\n"));
        assert_eq!(config.payloads().get(SeedFile::MetaData), b"instance-id: i-1");
    }

    #[test]
    fn test_binary_payloads_survive_toml() {
        let mut config = SeedConfig::new("seed1", "default");
        config.set_payloads(SeedPayloads::new(vec![0x1f, 0x8b, 0x08, 0x00, 0xff], "instance-id: i-1", ""));

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("meta_data = \"instance-id: i-1\""));
        let loaded: SeedConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded, config);

        assert_eq!(loaded.text(SeedFile::UserData), None);
        assert_eq!(loaded.text(SeedFile::MetaData), Some("instance-id: i-1"));
        assert_eq!(loaded.text(SeedFile::NetworkConfig), Some(""));
    }

    #[test]
    fn test_byte_array_payload_in_toml() {
        let config: SeedConfig = toml::from_str("name = \"s\"\nuser_data = [31, 139, 8]\n").unwrap();
        assert_eq!(config.user_data, vec![31, 139, 8]);
        assert!(config.meta_data.is_empty());
    }
}
