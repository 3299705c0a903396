//! Identity version descriptors.

use serde::{Deserialize, Serialize};

use crate::{BridgeError, SnapshotSchema, TypeTag};

/// Describes one supported node-identity version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdVersion {
    /// Version number as carried in identities.
    pub number: u32,
    /// Short name (`V0`, ...).
    pub name: String,
    /// Key algorithm used for new identities of this version.
    pub key_algorithm: String,
    /// Certificate signature algorithm.
    pub signature_algorithm: String,
}

impl SnapshotSchema for IdVersion {
    const TAG: TypeTag = TypeTag::IdVersion;
    const FIELDS: &'static [&'static str] =
        &["number", "name", "key_algorithm", "signature_algorithm"];
}

/// Number of the newest identity version.
pub const LATEST_ID_VERSION: u32 = 0;

/// Numbers of all supported identity versions.
pub const SUPPORTED_ID_VERSIONS: &[u32] = &[0];

/// Look up an identity version by number.
pub fn id_version(number: u32) -> Result<IdVersion, BridgeError> {
    match number {
        0 => Ok(v0()),
        _ => Err(BridgeError::UnknownVersion(number)),
    }
}

/// The newest identity version.
pub fn latest_id_version() -> IdVersion {
    v0()
}

fn v0() -> IdVersion {
    IdVersion {
        number: 0,
        name: "V0".to_string(),
        key_algorithm: "ecdsa-p256".to_string(),
        signature_algorithm: "ecdsa-sha256".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn every_supported_version_resolves() {
        for &n in SUPPORTED_ID_VERSIONS {
            assert_eq!(id_version(n).unwrap().number, n);
        }
    }

    #[test]
    fn latest_is_supported() {
        assert_eq!(id_version(LATEST_ID_VERSION).unwrap(), latest_id_version());
    }

    #[test]
    fn unsupported_number_is_unknown_version() {
        let err = id_version(99999).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVersion);
        assert_eq!(err.to_string(), "unknown version: 99999");
    }
}
