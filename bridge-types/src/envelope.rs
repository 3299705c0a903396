//! ValueEnvelope - the tagged value returned by every handle-producing call.

use crate::{Handle, TypeTag};

/// A value on the managed side as seen from native code.
///
/// Either a live handle with its type, or an error message. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueEnvelope {
    /// A registered object.
    Value {
        /// Handle to the registry entry.
        handle: Handle,
        /// Type of the referenced object.
        tag: TypeTag,
    },
    /// The call failed; no handle was produced.
    Error {
        /// Human-readable failure.
        message: String,
    },
}

impl ValueEnvelope {
    /// Envelope for a successfully registered object.
    pub fn make_value_envelope(handle: Handle, tag: TypeTag) -> Self {
        ValueEnvelope::Value { handle, tag }
    }

    /// Envelope for a failed call.
    pub fn make_error_envelope(message: impl Into<String>) -> Self {
        ValueEnvelope::Error {
            message: message.into(),
        }
    }

    /// Check if this envelope carries a value.
    pub fn is_value(&self) -> bool {
        matches!(self, ValueEnvelope::Value { .. })
    }

    /// The carried handle, or [`Handle::INVALID`] for an error envelope.
    pub fn handle(&self) -> Handle {
        match self {
            ValueEnvelope::Value { handle, .. } => *handle,
            ValueEnvelope::Error { .. } => Handle::INVALID,
        }
    }

    /// The carried type tag, if any.
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            ValueEnvelope::Value { tag, .. } => Some(*tag),
            ValueEnvelope::Error { .. } => None,
        }
    }

    /// The inline error message, if any.
    pub fn inline_error(&self) -> Option<&str> {
        match self {
            ValueEnvelope::Value { .. } => None,
            ValueEnvelope::Error { message } => Some(message),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(Handle, TypeTag), E>> for ValueEnvelope {
    fn from(result: Result<(Handle, TypeTag), E>) -> Self {
        match result {
            Ok((handle, tag)) => ValueEnvelope::make_value_envelope(handle, tag),
            Err(e) => ValueEnvelope::make_error_envelope(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;

    #[test]
    fn value_envelope_has_no_error() {
        let env = ValueEnvelope::make_value_envelope(Handle::new(1, 1), TypeTag::ApiKey);
        assert!(env.is_value());
        assert_eq!(env.handle(), Handle::new(1, 1));
        assert_eq!(env.type_tag(), Some(TypeTag::ApiKey));
        assert!(env.inline_error().is_none());
    }

    #[test]
    fn error_envelope_has_invalid_handle() {
        let env = ValueEnvelope::make_error_envelope("boom");
        assert!(!env.is_value());
        assert_eq!(env.handle(), Handle::INVALID);
        assert_eq!(env.type_tag(), None);
        assert_eq!(env.inline_error(), Some("boom"));
    }

    #[test]
    fn from_result_uses_error_display() {
        let result: Result<(Handle, TypeTag), BridgeError> = Err(BridgeError::UnknownVersion(7));
        let env = ValueEnvelope::from(result);
        assert_eq!(env.inline_error(), Some("unknown version: 7"));
    }
}
