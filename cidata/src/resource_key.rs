//! # cidata Resource Key Module
//!
//! External identifiers handed to the surrounding system have the form
//! `<volume key>;<token>`. The token is a fresh random UUID that only keeps
//! identifiers of re-created seeds apart; parsing never looks at it.
//!
//! Volume keys are backend-assigned and may themselves contain `;`, while
//! tokens never do, so the identifier is split at the last separator. A
//! hand-written id like `key;a;b` therefore yields the key `key;a`, not `key`
//! as a split at the first separator would.

use anyhow::Result;
use uuid::Builder;

use crate::constants::RESOURCE_KEY_SEPARATOR;
use crate::seed_errors::SeedError;

/// Joins `volume_key` with a new random token.
pub fn build_resource_id(volume_key: &str) -> String {
    let token = Builder::from_random_bytes(rand::random()).into_uuid();
    format!("{volume_key}{RESOURCE_KEY_SEPARATOR}{token}")
}

/// Recovers the volume key: everything before the token.
pub fn parse_resource_id(id: &str) -> Result<&str> {
    match id.rsplit_once(RESOURCE_KEY_SEPARATOR) {
        Some((volume_key, _token)) => Ok(volume_key),
        None => Err(SeedError::InvalidResourceId(id.to_string()).into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() {
        let id = build_resource_id("volume-key");
        assert!(!id.is_empty());
        assert_eq!(parse_resource_id(&id).unwrap(), "volume-key");
    }

    #[test]
    fn test_unique_per_call() {
        let first = build_resource_id("/var/lib/libvirt/images/seed.iso");
        let second = build_resource_id("/var/lib/libvirt/images/seed.iso");
        assert_ne!(first, second);
    }

    #[test]
    fn test_token_is_a_v4_uuid() {
        let id = build_resource_id("k");
        let token = id.strip_prefix("k;").unwrap();
        let uuid = uuid::Uuid::parse_str(token).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }

    #[test]
    fn test_keys_containing_the_separator() {
        for key in ["pool;vol", ";", "a;b;c;", ""] {
            assert_eq!(parse_resource_id(&build_resource_id(key)).unwrap(), key);
        }
    }

    #[test]
    fn test_two_part_shapes() {
        assert_eq!(parse_resource_id(";token").unwrap(), "");
        assert_eq!(parse_resource_id("key;").unwrap(), "key");
        assert_eq!(parse_resource_id("key;f81d4fae-7dec-11d0-a765-00a0c91e6bf6").unwrap(), "key");
    }

    #[test]
    fn test_extra_separators_stay_in_the_key() {
        assert_eq!(parse_resource_id("key;a;b").unwrap(), "key;a");
    }

    #[test]
    fn test_malformed_ids_are_rejected() {
        for id in ["", "no-separator-here"] {
            let err = parse_resource_id(id).unwrap_err();
            assert!(matches!(err.downcast_ref::<SeedError>(), Some(SeedError::InvalidResourceId(bad)) if bad == id));
            assert_eq!(err.to_string(), format!("{id} is not a valid key"));
        }
    }
}
