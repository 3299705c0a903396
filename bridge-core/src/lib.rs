//! # bridge-core
//!
//! The two pieces every EntryPoint composes:
//!
//! - [`HandleRegistry`] - generation-checked, reference-counted slot table that
//!   owns managed objects on behalf of native callers
//! - [`SnapshotCodec`] - moves object state in and out of the registry as
//!   snapshot bytes
//!
//! Neither knows about the storage network; objects plug in through the
//! [`Managed`] trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod registry;

pub use codec::SnapshotCodec;
pub use registry::{
    read_object, write_object, HandleRegistry, Managed, RegistryStats, DEFAULT_CAPACITY,
};
