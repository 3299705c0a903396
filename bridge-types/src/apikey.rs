//! API keys and their canonical text form.
//!
//! Text form is URL-safe unpadded base64 of
//! `version || key bytes || sha256(key bytes)[..4]`.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{BridgeError, SnapshotSchema, TypeTag};

/// Version byte of the text encoding.
pub const API_KEY_VERSION: u8 = 0;

/// Size of a freshly generated key.
pub const GENERATED_KEY_SIZE: usize = 32;

const CHECKSUM_LEN: usize = 4;

/// A parsed API key.
///
/// Key bytes are wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey {
    key: Vec<u8>,
}

impl ApiKey {
    /// Create a key from raw bytes. Returns `None` for an empty slice.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self {
                key: bytes.to_vec(),
            })
        }
    }

    /// Generate a random key.
    pub fn generate() -> Result<Self, BridgeError> {
        let mut key = vec![0u8; GENERATED_KEY_SIZE];
        getrandom::getrandom(&mut key)
            .map_err(|e| BridgeError::Internal(format!("getrandom failed: {e}")))?;
        Ok(Self { key })
    }

    /// Parse the canonical text form.
    pub fn parse(text: &str) -> Result<Self, BridgeError> {
        if text.is_empty() {
            return Err(BridgeError::ParseFailure("empty api key".to_string()));
        }

        let mut raw = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| BridgeError::ParseFailure(format!("invalid api key encoding: {e}")))?;

        let result = Self::from_raw(&raw);
        raw.zeroize();
        result
    }

    fn from_raw(raw: &[u8]) -> Result<Self, BridgeError> {
        if raw.len() < 1 + 1 + CHECKSUM_LEN {
            return Err(BridgeError::ParseFailure(format!(
                "api key too short ({} bytes)",
                raw.len()
            )));
        }

        let (version, rest) = (raw[0], &raw[1..]);
        if version != API_KEY_VERSION {
            return Err(BridgeError::ParseFailure(format!(
                "unsupported api key version: {version}"
            )));
        }

        let (key, checksum) = rest.split_at(rest.len() - CHECKSUM_LEN);
        if checksum != &Sha256::digest(key)[..CHECKSUM_LEN] {
            return Err(BridgeError::ParseFailure(
                "api key checksum mismatch".to_string(),
            ));
        }

        Ok(Self { key: key.to_vec() })
    }

    /// Canonical text form. `parse(serialize(k)) == k`.
    pub fn serialize(&self) -> String {
        let mut raw = Vec::with_capacity(1 + self.key.len() + CHECKSUM_LEN);
        raw.push(API_KEY_VERSION);
        raw.extend_from_slice(&self.key);
        raw.extend_from_slice(&Sha256::digest(&self.key)[..CHECKSUM_LEN]);
        let text = URL_SAFE_NO_PAD.encode(&raw);
        raw.zeroize();
        text
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Short hex fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        hex::encode(&Sha256::digest(&self.key)[..4])
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

/// Snapshot form of an [`ApiKey`].
///
/// Defaults are per field since the type implements `Drop`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ApiKeySnapshot {
    /// Raw key bytes.
    #[serde(default)]
    pub key: Vec<u8>,
}

impl SnapshotSchema for ApiKeySnapshot {
    const TAG: TypeTag = TypeTag::ApiKey;
    const FIELDS: &'static [&'static str] = &["key"];
}

impl From<&ApiKey> for ApiKeySnapshot {
    fn from(key: &ApiKey) -> Self {
        Self {
            key: key.key.clone(),
        }
    }
}

impl TryFrom<&ApiKeySnapshot> for ApiKey {
    type Error = BridgeError;

    fn try_from(snapshot: &ApiKeySnapshot) -> Result<Self, Self::Error> {
        ApiKey::from_bytes(&snapshot.key).ok_or_else(|| {
            BridgeError::DecodingFailure("api key snapshot has no key bytes".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{snapshot, ErrorKind, Snapshot};

    #[test]
    fn generated_key_roundtrips_through_text() {
        let key = ApiKey::generate().unwrap();
        let text = key.serialize();
        let parsed = ApiKey::parse(&text).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.as_bytes().len(), GENERATED_KEY_SIZE);
    }

    #[test]
    fn serialize_is_canonical() {
        let key = ApiKey::from_bytes(b"fixed-key-bytes").unwrap();
        assert_eq!(key.serialize(), key.serialize());
        assert_eq!(ApiKey::parse(&key.serialize()).unwrap().serialize(), key.serialize());
    }

    #[test]
    fn empty_text_is_parse_failure() {
        let err = ApiKey::parse("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert!(err.to_string().contains("parse failure"));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn bad_base64_is_parse_failure() {
        let err = ApiKey::parse("not base64 at all!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
    }

    #[test]
    fn short_input_is_parse_failure() {
        let text = URL_SAFE_NO_PAD.encode([0u8, 1, 2]);
        let err = ApiKey::parse(&text).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn wrong_version_is_parse_failure() {
        let key = ApiKey::from_bytes(b"some-key").unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(key.serialize()).unwrap();
        raw[0] = 9;
        let err = ApiKey::parse(&URL_SAFE_NO_PAD.encode(&raw)).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn corrupted_key_fails_checksum() {
        let key = ApiKey::from_bytes(b"some-key").unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(key.serialize()).unwrap();
        raw[2] ^= 0xff;
        let err = ApiKey::parse(&URL_SAFE_NO_PAD.encode(&raw)).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = ApiKey::from_bytes(b"super-secret").unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.starts_with("ApiKey("));
        assert_eq!(key.fingerprint().len(), 8);
    }

    #[test]
    fn snapshot_reconstructs_key() {
        let key = ApiKey::generate().unwrap();
        let bytes = Snapshot::encode(&ApiKeySnapshot::from(&key)).unwrap();
        let decoded: ApiKeySnapshot = snapshot::decode(&bytes).unwrap();
        assert_eq!(ApiKey::try_from(&decoded).unwrap(), key);
    }

    #[test]
    fn snapshot_without_key_field_decodes_to_empty() {
        #[derive(Default, Serialize, Deserialize)]
        struct NoFields {}

        impl SnapshotSchema for NoFields {
            const TAG: TypeTag = TypeTag::ApiKey;
            const FIELDS: &'static [&'static str] = &[];
        }

        let bytes = Snapshot::encode(&NoFields {}).unwrap();
        let decoded: ApiKeySnapshot = snapshot::decode(&bytes).unwrap();
        assert!(decoded.key.is_empty());
        assert_eq!(
            ApiKey::try_from(&decoded).unwrap_err().kind(),
            ErrorKind::DecodingFailure
        );
    }

    #[test]
    fn empty_snapshot_is_rejected() {
        let err = ApiKey::try_from(&ApiKeySnapshot::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingFailure);
    }
}
