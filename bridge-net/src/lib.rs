//! # bridge-net
//!
//! The storage network as the bridge sees it.
//!
//! EntryPoints never talk to satellites directly; they go through the
//! [`StorageNetwork`] trait. [`MockNetwork`] is the in-process implementation
//! used by tests and by hosts that only need the handle machinery.
//!
//! ```ignore
//! let network = MockNetwork::new();
//! let session = network.open_project(&dial, "sat.example:7777", &key, &opts).await?;
//! let bucket = network.create_bucket(&session, "photos", &config).await?;
//! network.close_project(&session);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod mock;
mod network;

pub use mock::MockNetwork;
pub use network::{DialSettings, NetworkError, ProjectSession, StorageNetwork};
