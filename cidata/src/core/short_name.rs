//! # cidata Short Name Module
//!
//! ISO9660 level-1 identifiers are 8.3 upper-case names. A reader without
//! Rock Ridge or Joliet support (such as [`IsoReader`](crate::file_system::IsoReader))
//! lower-cases them and drops the `;1` version suffix, so `user-data` shows
//! up as `user_dat.`.
//!
//! Seed reconstruction classifies entries only through a [`ShortNameTable`].
//! The built-in [`LegacyReaderNames`] table is fixed; swapping the reader for
//! one that normalizes differently means supplying another table, not
//! touching the reconstruction logic.

use crate::config::SeedFile;

/// Maps seed files to the names a non-Joliet reader reports, and back.
pub trait ShortNameTable {
    fn short_name(&self, file: SeedFile) -> &str;

    fn classify(&self, short_name: &str) -> Option<SeedFile> {
        SeedFile::ALL.into_iter().find(|file| self.short_name(*file) == short_name)
    }

    fn long_name(&self, short_name: &str) -> Option<&'static str> {
        self.classify(short_name).map(SeedFile::file_name)
    }
}

/// The names observed from [`IsoReader`](crate::file_system::IsoReader) on
/// images written by [`IsoFileSystem`](crate::file_system::IsoFileSystem).
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyReaderNames;

impl ShortNameTable for LegacyReaderNames {
    fn short_name(&self, file: SeedFile) -> &str {
        match file {
            SeedFile::UserData => "user_dat.",
            SeedFile::MetaData => "meta_dat.",
            SeedFile::NetworkConfig => "network_.",
        }
    }
}

/// Level-1 identifier written for `name`: d-characters only, 8-char stem,
/// 3-char extension, always a dot, `;1` version.
pub fn level1_identifier(name: &str) -> String {
    let mangled: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else if c == '.' { '.' } else { '_' })
        .collect();

    let (stem, extension) = match mangled.rfind('.') {
        Some(dot) => (&mangled[..dot], &mangled[dot + 1..]),
        None => (mangled.as_str(), ""),
    };
    let stem: String = stem.chars().filter(|c| *c != '.').take(8).collect();
    let extension: String = extension.chars().take(3).collect();

    format!("{stem}.{extension};1")
}

/// How a non-Rock-Ridge, non-Joliet reader presents a raw identifier.
pub fn reader_name(identifier: &[u8]) -> String {
    let name = String::from_utf8_lossy(identifier);
    let name = match name.rfind(';') {
        Some(version) => &name[..version],
        None => &name,
    };
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_table() {
        let table = LegacyReaderNames;
        assert_eq!(table.short_name(SeedFile::UserData), "user_dat.");
        assert_eq!(table.short_name(SeedFile::MetaData), "meta_dat.");
        assert_eq!(table.short_name(SeedFile::NetworkConfig), "network_.");

        assert_eq!(table.classify("network_."), Some(SeedFile::NetworkConfig));
        assert_eq!(table.long_name("user_dat."), Some("user-data"));
        assert_eq!(table.classify("user-data"), None);
        assert_eq!(table.classify("/user_dat."), None);
    }

    #[test]
    fn level1_identifiers_of_seed_files() {
        assert_eq!(level1_identifier("user-data"), "USER_DAT.;1");
        assert_eq!(level1_identifier("meta-data"), "META_DAT.;1");
        assert_eq!(level1_identifier("network-config"), "NETWORK_.;1");
        assert_eq!(level1_identifier("vendor-data.json"), "VENDOR_D.JSO;1");
        assert_eq!(level1_identifier("a.b.c"), "AB.C;1");
    }

    #[test]
    fn written_identifiers_agree_with_the_table() {
        let table = LegacyReaderNames;
        for file in SeedFile::ALL {
            let identifier = level1_identifier(file.file_name());
            assert_eq!(reader_name(identifier.as_bytes()), table.short_name(file));
        }
    }

    #[test]
    fn reader_name_strips_version_only() {
        assert_eq!(reader_name(b"USER_DAT.;1"), "user_dat.");
        assert_eq!(reader_name(b"README"), "readme");
    }
}
