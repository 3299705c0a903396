//! Error types for the uplink bridge.
//!
//! Every failure an EntryPoint can report is one [`BridgeError`]. Native
//! callers only ever see its `Display` form (through the error out-parameter),
//! so each variant renders with a stable lower-case prefix.

use thiserror::Error;

use crate::{Handle, TypeTag};

/// Coarse classification of a [`BridgeError`], with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    /// Malformed textual input.
    ParseFailure = 1,
    /// Null, freed or stale handle.
    InvalidHandle = 2,
    /// Identity version number outside the supported set.
    UnknownVersion = 3,
    /// Structurally invalid configuration.
    InvalidConfig = 4,
    /// Snapshot encoding failed.
    EncodingFailure = 5,
    /// Snapshot bytes could not be decoded.
    DecodingFailure = 6,
    /// Snapshot schema, version or fields do not match the target.
    SchemaMismatch = 7,
    /// The handle registry is full.
    ResourceExhausted = 8,
    /// Opaque failure from the storage network.
    ExternalFailure = 9,
    /// A live handle of the wrong type.
    TypeMismatch = 10,
    /// A panic caught at the native boundary.
    Internal = 99,
}

/// Errors from bridge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Textual input could not be parsed.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// The handle does not reference a live registry entry.
    #[error("invalid handle: {handle} ({reason})")]
    InvalidHandle {
        /// The offending handle.
        handle: Handle,
        /// Why resolution failed.
        reason: &'static str,
    },

    /// Identity version number is not supported.
    #[error("unknown version: {0}")]
    UnknownVersion(u32),

    /// Configuration is structurally invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Encoding a snapshot failed.
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    /// Decoding a snapshot failed.
    #[error("decoding failure: {0}")]
    DecodingFailure(String),

    /// Snapshot does not match the expected schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// No free registry slot is available.
    #[error("resource exhausted: registry is full ({capacity} live handles)")]
    ResourceExhausted {
        /// Configured registry capacity.
        capacity: usize,
    },

    /// Failure reported by the storage network, passed through verbatim.
    #[error("external failure: {0}")]
    ExternalFailure(String),

    /// The handle is live but references an object of another type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the operation needs.
        expected: TypeTag,
        /// Type the handle references.
        found: TypeTag,
    },

    /// Internal error (a panic caught at the boundary).
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::ParseFailure(_) => ErrorKind::ParseFailure,
            BridgeError::InvalidHandle { .. } => ErrorKind::InvalidHandle,
            BridgeError::UnknownVersion(_) => ErrorKind::UnknownVersion,
            BridgeError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            BridgeError::EncodingFailure(_) => ErrorKind::EncodingFailure,
            BridgeError::DecodingFailure(_) => ErrorKind::DecodingFailure,
            BridgeError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            BridgeError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            BridgeError::ExternalFailure(_) => ErrorKind::ExternalFailure,
            BridgeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            BridgeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for an [`BridgeError::InvalidHandle`].
    pub fn invalid_handle(handle: Handle, reason: &'static str) -> Self {
        BridgeError::InvalidHandle { handle, reason }
    }
}

impl From<rmp_serde::encode::Error> for BridgeError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        BridgeError::EncodingFailure(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for BridgeError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        BridgeError::DecodingFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BridgeError::UnknownVersion(99999);
        assert_eq!(err.to_string(), "unknown version: 99999");

        let err = BridgeError::invalid_handle(Handle::new(3, 2), "stale generation");
        assert_eq!(err.to_string(), "invalid handle: 3@2 (stale generation)");
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let err = BridgeError::TypeMismatch {
            expected: TypeTag::ApiKey,
            found: TypeTag::Project,
        };
        assert_eq!(err.to_string(), "type mismatch: expected APIKey, found Project");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::ParseFailure as u32, 1);
        assert_eq!(ErrorKind::InvalidHandle as u32, 2);
        assert_eq!(ErrorKind::ExternalFailure as u32, 9);
        assert_eq!(ErrorKind::Internal as u32, 99);
    }

    #[test]
    fn decode_error_maps_to_decoding_failure() {
        let err: BridgeError = rmp_serde::from_slice::<u32>(&[0xc1])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::DecodingFailure);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BridgeError>();
    }
}
