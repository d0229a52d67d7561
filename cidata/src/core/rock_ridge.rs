//! # cidata Rock Ridge Module
//!
//! System Use Sharing Protocol (SUSP 1.10) entries and the Rock Ridge
//! Interchange Protocol (RRIP 1991A) entries written into the system use area
//! of directory records. Rock Ridge keeps `user-data`, `meta-data` and
//! `network-config` readable under their real names; a reader without Rock
//! Ridge support only sees the level-1 identifiers.
//!
//! Every entry starts with a 2-byte signature, a 1-byte length (header
//! included) and a 1-byte version.
//!
//! Copyrights © 2025 cidata Contributors. All rights reserved.

use super::super::utils::both_endian_u32;

pub const RRIP_IDENTIFIER: &str = "RRIP_1991A";
pub const RRIP_DESCRIPTOR: &str = "THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS";
pub const RRIP_SOURCE: &str = "SEE PUBLISHER";

pub const MODE_REGULAR_FILE: u32 = 0o100_444;
pub const MODE_DIRECTORY: u32 = 0o040_555;

const NM_CONTINUE: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemUseEntry {
    /// SUSP indicator, only in the `.` record of the root directory.
    SharingProtocol,
    /// Extension reference announcing which extension the entries follow.
    ExtensionReference { identifier: String, descriptor: String, source: String },
    /// POSIX file attributes.
    PosixAttributes { mode: u32, links: u32, uid: u32, gid: u32 },
    /// Alternate (long) name.
    AlternateName { name: String },
}

impl SystemUseEntry {
    pub fn extension_reference() -> Self {
        Self::ExtensionReference {
            identifier: RRIP_IDENTIFIER.into(),
            descriptor: RRIP_DESCRIPTOR.into(),
            source: RRIP_SOURCE.into(),
        }
    }

    pub fn file_attributes() -> Self {
        Self::PosixAttributes { mode: MODE_REGULAR_FILE, links: 1, uid: 0, gid: 0 }
    }

    pub fn directory_attributes() -> Self {
        Self::PosixAttributes { mode: MODE_DIRECTORY, links: 2, uid: 0, gid: 0 }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (signature, body): (&[u8; 2], Vec<u8>) = match self {
            Self::SharingProtocol => (b"SP", vec![0xBE, 0xEF, 0]),
            Self::ExtensionReference { identifier, descriptor, source } => {
                let mut body = vec![identifier.len() as u8, descriptor.len() as u8, source.len() as u8, 1];
                body.extend_from_slice(identifier.as_bytes());
                body.extend_from_slice(descriptor.as_bytes());
                body.extend_from_slice(source.as_bytes());
                (b"ER", body)
            }
            Self::PosixAttributes { mode, links, uid, gid } => {
                let mut body = Vec::with_capacity(32);
                for value in [mode, links, uid, gid] {
                    body.extend_from_slice(&both_endian_u32(*value));
                }
                (b"PX", body)
            }
            Self::AlternateName { name } => {
                let mut body = vec![0];
                body.extend_from_slice(name.as_bytes());
                (b"NM", body)
            }
        };

        let mut encoded = Vec::with_capacity(4 + body.len());
        encoded.extend_from_slice(signature);
        encoded.push((4 + body.len()) as u8);
        encoded.push(1);
        encoded.extend_from_slice(&body);
        encoded
    }
}

/// Concatenated encoding of several entries.
pub fn encode_entries(entries: &[SystemUseEntry]) -> Vec<u8> {
    entries.iter().flat_map(SystemUseEntry::to_bytes).collect()
}

/// Extracts the Rock Ridge alternate name from a system use area, joining
/// `NM` entries flagged as continued. Unknown entries are skipped and the
/// scan stops at the first malformed header or `ST` terminator.
pub fn alternate_name(system_use: &[u8]) -> Option<String> {
    let mut name: Option<Vec<u8>> = None;
    let mut offset = 0;

    while offset + 4 <= system_use.len() {
        let signature = &system_use[offset..offset + 2];
        let length = system_use[offset + 2] as usize;
        if length < 4 || offset + length > system_use.len() || signature == b"ST" {
            break;
        }

        if signature == b"NM" && length >= 5 {
            let flags = system_use[offset + 4];
            let part = &system_use[offset + 5..offset + length];
            let buffer = name.get_or_insert_with(Vec::new);
            buffer.extend_from_slice(part);
            if flags & NM_CONTINUE == 0 {
                break;
            }
        }
        offset += length;
    }

    name.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
