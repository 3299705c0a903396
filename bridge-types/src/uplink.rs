//! Uplink client configuration.

use serde::{Deserialize, Serialize};

use crate::version::SUPPORTED_ID_VERSIONS;
use crate::{BridgeError, SnapshotSchema, TypeTag};

/// Configuration for creating an uplink client.
///
/// Zero-valued sizes and timeouts mean "use the bridge default"; they are
/// resolved when the client is created, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    /// Accept any peer CA instead of checking the whitelist.
    pub skip_peer_ca_whitelist: bool,
    /// Path to a PEM file with whitelisted peer CAs.
    pub peer_ca_whitelist_path: String,
    /// Identity version used for the client's own identity.
    pub identity_version: u32,
    /// Largest segment stored inline, in bytes.
    pub max_inline_size: u64,
    /// Memory budget for buffered uploads, in bytes.
    pub max_memory: u64,
    /// Dial timeout in milliseconds.
    pub dial_timeout_ms: u64,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl SnapshotSchema for UplinkConfig {
    const TAG: TypeTag = TypeTag::UplinkConfig;
    const FIELDS: &'static [&'static str] = &[
        "skip_peer_ca_whitelist",
        "peer_ca_whitelist_path",
        "identity_version",
        "max_inline_size",
        "max_memory",
        "dial_timeout_ms",
        "request_timeout_ms",
    ];
}

impl UplinkConfig {
    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the whitelist is skipped but a whitelist path is also given
    /// - the identity version is not supported
    /// - the inline size exceeds the memory budget
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.skip_peer_ca_whitelist && !self.peer_ca_whitelist_path.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "cannot set both skip_peer_ca_whitelist and peer_ca_whitelist_path".to_string(),
            ));
        }

        if !SUPPORTED_ID_VERSIONS.contains(&self.identity_version) {
            return Err(BridgeError::InvalidConfig(format!(
                "unsupported identity_version: {}",
                self.identity_version
            )));
        }

        if self.max_inline_size != 0
            && self.max_memory != 0
            && self.max_inline_size > self.max_memory
        {
            return Err(BridgeError::InvalidConfig(format!(
                "max_inline_size ({}) exceeds max_memory ({})",
                self.max_inline_size, self.max_memory
            )));
        }

        Ok(())
    }
}
