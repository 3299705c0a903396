//! ManagedObject - everything the bridge keeps behind a handle.

use std::fmt;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use bridge_core::Managed;
use bridge_net::{DialSettings, ProjectSession, StorageNetwork};
use bridge_types::{
    id_version, ApiKey, ApiKeySnapshot, BridgeError, IdVersion, ProjectOptions, Result, Snapshot,
    SnapshotSchema, TypeTag, UplinkConfig,
};
use serde::{Deserialize, Serialize};

/// An uplink client ready to dial satellites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkClient {
    /// Resolved connection parameters.
    pub dial: DialSettings,
}

/// An open project.
pub struct Project {
    /// Network session backing the project.
    pub session: ProjectSession,
    encrypted: bool,
    network: Arc<dyn StorageNetwork>,
    closed: bool,
}

impl Project {
    /// Wrap an open session. The session is closed on teardown.
    pub fn new(
        session: ProjectSession,
        options: &ProjectOptions,
        network: Arc<dyn StorageNetwork>,
    ) -> Self {
        Self {
            session,
            encrypted: options.encryption_key.is_some(),
            network,
            closed: false,
        }
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("session", &self.session)
            .field("encrypted", &self.encrypted)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Snapshot of an uplink client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkSnapshot {
    /// Resolved client configuration.
    pub config: UplinkConfig,
}

impl SnapshotSchema for UplinkSnapshot {
    const TAG: TypeTag = TypeTag::Uplink;
    const FIELDS: &'static [&'static str] = &[
        "config",
        "config.skip_peer_ca_whitelist",
        "config.peer_ca_whitelist_path",
        "config.identity_version",
        "config.max_inline_size",
        "config.max_memory",
        "config.dial_timeout_ms",
        "config.request_timeout_ms",
    ];
}

/// Snapshot of an open project. Carries no secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Satellite address.
    pub satellite: String,
    /// Fingerprint of the API key the project was opened with.
    pub key_fingerprint: String,
    /// Open time (unix seconds).
    pub opened_at: u64,
    /// Whether an encryption key was supplied.
    pub encrypted: bool,
}

impl SnapshotSchema for ProjectSnapshot {
    const TAG: TypeTag = TypeTag::Project;
    const FIELDS: &'static [&'static str] = &[
        "session_id",
        "satellite",
        "key_fingerprint",
        "opened_at",
        "encrypted",
    ];
}

impl From<&Project> for ProjectSnapshot {
    fn from(project: &Project) -> Self {
        Self {
            session_id: project.session.id.to_string(),
            satellite: project.session.satellite.clone(),
            key_fingerprint: project.session.key_fingerprint.clone(),
            opened_at: project
                .session
                .opened_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            encrypted: project.encrypted,
        }
    }
}

/// An object owned by the bridge registry.
#[derive(Debug)]
pub enum ManagedObject {
    /// Parsed API key.
    ApiKey(ApiKey),
    /// Client configuration, usually created from a snapshot.
    UplinkConfig(UplinkConfig),
    /// Identity version descriptor.
    IdVersion(IdVersion),
    /// Uplink client.
    Uplink(UplinkClient),
    /// Open project.
    Project(Project),
}

impl ManagedObject {
    fn read_only(&self) -> BridgeError {
        BridgeError::SchemaMismatch(format!(
            "{} cannot be modified through a snapshot",
            self.type_tag()
        ))
    }
}

impl Managed for ManagedObject {
    fn type_tag(&self) -> TypeTag {
        match self {
            ManagedObject::ApiKey(_) => TypeTag::ApiKey,
            ManagedObject::UplinkConfig(_) => TypeTag::UplinkConfig,
            ManagedObject::IdVersion(_) => TypeTag::IdVersion,
            ManagedObject::Uplink(_) => TypeTag::Uplink,
            ManagedObject::Project(_) => TypeTag::Project,
        }
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        match self {
            ManagedObject::ApiKey(key) => Snapshot::encode(&ApiKeySnapshot::from(key)),
            ManagedObject::UplinkConfig(config) => Snapshot::encode(config),
            ManagedObject::IdVersion(version) => Snapshot::encode(version),
            ManagedObject::Uplink(client) => Snapshot::encode(&UplinkSnapshot {
                config: client.dial.to_config(),
            }),
            ManagedObject::Project(project) => Snapshot::encode(&ProjectSnapshot::from(project)),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        match self {
            ManagedObject::ApiKey(key) => {
                let decoded: ApiKeySnapshot = snapshot.decode()?;
                *key = ApiKey::try_from(&decoded)?;
                Ok(())
            }
            ManagedObject::UplinkConfig(config) => {
                *config = snapshot.decode()?;
                Ok(())
            }
            ManagedObject::IdVersion(_) | ManagedObject::Uplink(_) | ManagedObject::Project(_) => {
                Err(self.read_only())
            }
        }
    }

    fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        match snapshot.tag() {
            TypeTag::ApiKey => {
                let decoded: ApiKeySnapshot = snapshot.decode()?;
                Ok(ManagedObject::ApiKey(ApiKey::try_from(&decoded)?))
            }
            TypeTag::UplinkConfig => Ok(ManagedObject::UplinkConfig(snapshot.decode()?)),
            TypeTag::IdVersion => {
                let decoded: IdVersion = snapshot.decode()?;
                Ok(ManagedObject::IdVersion(id_version(decoded.number)?))
            }
            TypeTag::Uplink => {
                let decoded: UplinkSnapshot = snapshot.decode()?;
                decoded.config.validate()?;
                Ok(ManagedObject::Uplink(UplinkClient {
                    dial: DialSettings::from_config(&decoded.config),
                }))
            }
            TypeTag::Project => Err(BridgeError::SchemaMismatch(
                "Project owns a network session and cannot be created from a snapshot"
                    .to_string(),
            )),
            tag @ (TypeTag::Bucket | TypeTag::ProjectOptions | TypeTag::BucketConfig) => {
                Err(BridgeError::SchemaMismatch(format!(
                    "{tag} is passed by value and has no handle"
                )))
            }
        }
    }

    fn teardown(&mut self) {
        match self {
            ManagedObject::Project(project) if !project.closed => {
                project.network.close_project(&project.session);
                project.closed = true;
                tracing::info!("Closed project session {}", project.session.id);
            }
            ManagedObject::Uplink(_) => tracing::debug!("Uplink client released"),
            _ => {}
        }
    }
}
