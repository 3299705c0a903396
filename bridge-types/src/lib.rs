//! # bridge-types
//!
//! Types shared by every layer of the uplink bridge.
//!
//! - [`Handle`], [`TypeTag`] - opaque references to managed objects
//! - [`ValueEnvelope`] - the tagged value returned across the boundary
//! - [`Snapshot`], [`SnapshotSchema`] - by-value wire form of objects
//! - [`ApiKey`], [`IdVersion`], [`UplinkConfig`], [`ProjectOptions`],
//!   [`BucketConfig`], [`Bucket`] - the data model
//! - [`BridgeError`] - error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apikey;
mod bucket;
mod envelope;
mod error;
mod handle;
mod project;
pub mod snapshot;
mod uplink;
pub mod version;

pub use apikey::{ApiKey, ApiKeySnapshot, API_KEY_VERSION, GENERATED_KEY_SIZE};
pub use bucket::{
    validate_bucket_name, Bucket, BucketConfig, CipherSuite, EncryptionParameters,
    RedundancyAlgorithm, RedundancyScheme,
};
pub use envelope::ValueEnvelope;
pub use error::{BridgeError, ErrorKind};
pub use handle::{Handle, TypeTag};
pub use project::{ProjectOptions, ENCRYPTION_KEY_SIZE};
pub use snapshot::{Snapshot, SnapshotSchema, SNAPSHOT_VERSION};
pub use uplink::UplinkConfig;
pub use version::{id_version, latest_id_version, IdVersion};

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
