//! Storage network trait and the values that cross it.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bridge_types::{ApiKey, Bucket, BridgeError, BucketConfig, ProjectOptions, UplinkConfig};
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by the storage network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The satellite could not be reached within the dial timeout.
    #[error("satellite unreachable: {0}")]
    Unreachable(String),

    /// The API key was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A bucket with this name already exists in the project.
    #[error("bucket already exists: {0}")]
    BucketExists(String),

    /// The bucket name is not acceptable to the network.
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The project session was already closed.
    #[error("project session closed")]
    SessionClosed,

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl From<NetworkError> for BridgeError {
    fn from(e: NetworkError) -> Self {
        BridgeError::ExternalFailure(e.to_string())
    }
}

/// Connection parameters of an uplink client.
///
/// Built from an [`UplinkConfig`] whose zero fields have been replaced with
/// bridge defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialSettings {
    /// Accept any peer CA.
    pub skip_peer_ca_whitelist: bool,
    /// PEM file with whitelisted peer CAs; empty for the built-in list.
    pub peer_ca_whitelist_path: String,
    /// Identity version of the client.
    pub identity_version: u32,
    /// Largest segment stored inline, in bytes.
    pub max_inline_size: u64,
    /// Memory budget for buffered uploads, in bytes.
    pub max_memory: u64,
    /// Time allowed to reach a satellite.
    pub dial_timeout: Duration,
    /// Time allowed per request.
    pub request_timeout: Duration,
}

impl DialSettings {
    /// Settings taken verbatim from `config`.
    pub fn from_config(config: &UplinkConfig) -> Self {
        Self {
            skip_peer_ca_whitelist: config.skip_peer_ca_whitelist,
            peer_ca_whitelist_path: config.peer_ca_whitelist_path.clone(),
            identity_version: config.identity_version,
            max_inline_size: config.max_inline_size,
            max_memory: config.max_memory,
            dial_timeout: Duration::from_millis(config.dial_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// The settings as an [`UplinkConfig`] (timeouts in milliseconds).
    pub fn to_config(&self) -> UplinkConfig {
        UplinkConfig {
            skip_peer_ca_whitelist: self.skip_peer_ca_whitelist,
            peer_ca_whitelist_path: self.peer_ca_whitelist_path.clone(),
            identity_version: self.identity_version,
            max_inline_size: self.max_inline_size,
            max_memory: self.max_memory,
            dial_timeout_ms: self.dial_timeout.as_millis() as u64,
            request_timeout_ms: self.request_timeout.as_millis() as u64,
        }
    }
}

/// An open project on a satellite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSession {
    /// Session identifier.
    pub id: Uuid,
    /// Satellite address the session was opened against.
    pub satellite: String,
    /// Fingerprint of the API key that opened the session.
    pub key_fingerprint: String,
    /// When the session was opened.
    pub opened_at: SystemTime,
}

impl ProjectSession {
    /// New session for `satellite`, opened now.
    pub fn new(satellite: &str, api_key: &ApiKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            satellite: satellite.to_string(),
            key_fingerprint: api_key.fingerprint(),
            opened_at: SystemTime::now(),
        }
    }
}

/// The storage network.
///
/// Implementations must be safe to call from several threads at once.
#[async_trait]
pub trait StorageNetwork: Send + Sync {
    /// Open a project on `satellite` using `api_key`.
    async fn open_project(
        &self,
        dial: &DialSettings,
        satellite: &str,
        api_key: &ApiKey,
        options: &ProjectOptions,
    ) -> Result<ProjectSession, NetworkError>;

    /// Create a bucket in an open project.
    async fn create_bucket(
        &self,
        session: &ProjectSession,
        name: &str,
        config: &BucketConfig,
    ) -> Result<Bucket, NetworkError>;

    /// Close a project session. Closing twice is a no-op.
    fn close_project(&self, session: &ProjectSession);
}
