//! # bridge-ffi
//!
//! C ABI for the uplink bridge.
//!
//! Native callers never see Rust objects. They hold [`Handle`]s into a
//! process-wide registry, receive values as [`ffi::BridgeValue`] envelopes,
//! move structured data as snapshot buffers, and read failures from a
//! `char **err` out-parameter.
//!
//! ## Layers
//!
//! - [`Bridge`] - the EntryPoints as a safe Rust API (usable without C)
//! - [`ffi`] - `extern "C"` wrappers around one process-wide [`Bridge`]
//! - [`ErrorChannel`] - error out-parameter handling
//! - [`BridgeConfig`] - TOML configuration
//!
//! ## Example (C)
//!
//! ```c
//! char *err = NULL;
//! BridgeValue key = parse_api_key(text, &err);
//! if (err) { fprintf(stderr, "%s\n", err); free_string(err); return; }
//! char *again = serialize_api_key(key.handle, &err);
//! free_string(again);
//! free_api_key(key.handle, &err);
//! ```
//!
//! [`Handle`]: bridge_types::Handle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod object;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError};
pub use error::ErrorChannel;
pub use object::{ManagedObject, Project, ProjectSnapshot, UplinkClient, UplinkSnapshot};
