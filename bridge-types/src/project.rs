//! Options for opening a project.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{BridgeError, SnapshotSchema, TypeTag};

/// Size of a project encryption key.
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Options passed when opening a project.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ProjectOptions {
    /// Root encryption key for the project, if the caller supplies one.
    #[serde(default)]
    pub encryption_key: Option<Vec<u8>>,
}

impl SnapshotSchema for ProjectOptions {
    const TAG: TypeTag = TypeTag::ProjectOptions;
    const FIELDS: &'static [&'static str] = &["encryption_key"];
}

impl ProjectOptions {
    /// Validate the options.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if let Some(ref key) = self.encryption_key {
            if key.len() != ENCRYPTION_KEY_SIZE {
                return Err(BridgeError::InvalidConfig(format!(
                    "encryption_key must be {ENCRYPTION_KEY_SIZE} bytes, got {}",
                    key.len()
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProjectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectOptions")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
