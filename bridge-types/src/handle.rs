//! Handle and type-tag types.
//!
//! A [`Handle`] names a registry slot plus the generation that slot had when
//! the handle was issued. Native code only ever holds these two integers.

use std::fmt;

use crate::BridgeError;

/// Opaque reference to a managed object.
///
/// `id == 0` is reserved for the invalid handle; slot `i` is exported as
/// `id = i + 1`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle {
    /// Slot identifier (1-based).
    pub id: u64,
    /// Slot generation at issue time.
    pub generation: u32,
}

impl Handle {
    /// The invalid (null) handle.
    pub const INVALID: Handle = Handle {
        id: 0,
        generation: 0,
    };

    /// Create a handle from its parts.
    pub const fn new(id: u64, generation: u32) -> Self {
        Self { id, generation }
    }

    /// Check if this handle is non-null. Says nothing about liveness.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.id != 0
    }

    /// Zero-based slot index, or `None` for the invalid handle.
    #[inline]
    pub fn slot(&self) -> Option<usize> {
        if self.id == 0 {
            None
        } else {
            usize::try_from(self.id - 1).ok()
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.generation)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}@{})", self.id, self.generation)
    }
}

/// Discriminator for the type of value a handle or snapshot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeTag {
    /// Parsed API key.
    ApiKey = 1,
    /// Uplink client configuration.
    UplinkConfig = 2,
    /// Uplink client instance.
    Uplink = 3,
    /// Open project session.
    Project = 4,
    /// Bucket metadata (crosses by value).
    Bucket = 5,
    /// Identity version descriptor.
    IdVersion = 6,
    /// Options for opening a project.
    ProjectOptions = 7,
    /// Options for creating a bucket.
    BucketConfig = 8,
}

impl TypeTag {
    /// Stable name used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::ApiKey => "APIKey",
            TypeTag::UplinkConfig => "UplinkConfig",
            TypeTag::Uplink => "Uplink",
            TypeTag::Project => "Project",
            TypeTag::Bucket => "Bucket",
            TypeTag::IdVersion => "IDVersion",
            TypeTag::ProjectOptions => "ProjectOptions",
            TypeTag::BucketConfig => "BucketConfig",
        }
    }
}

impl TryFrom<u32> for TypeTag {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TypeTag::ApiKey),
            2 => Ok(TypeTag::UplinkConfig),
            3 => Ok(TypeTag::Uplink),
            4 => Ok(TypeTag::Project),
            5 => Ok(TypeTag::Bucket),
            6 => Ok(TypeTag::IdVersion),
            7 => Ok(TypeTag::ProjectOptions),
            8 => Ok(TypeTag::BucketConfig),
            _ => Err(BridgeError::SchemaMismatch(format!(
                "unknown type tag: {value}"
            ))),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
