//! Bridge - the EntryPoints.
//!
//! Every call resolves its input handles with the registry lock held only for
//! the lookup, does its work (including any network round trip) with no
//! registry lock held, then registers the result.

use std::sync::Arc;

use bridge_core::{read_object, HandleRegistry, Managed, RegistryStats, SnapshotCodec};
use bridge_net::{DialSettings, StorageNetwork};
use bridge_types::{
    id_version, ApiKey, BridgeError, Bucket, BucketConfig, Handle, ProjectOptions, Result,
    TypeTag, ValueEnvelope,
};

use crate::config::BridgeConfig;
use crate::object::{ManagedObject, Project, UplinkClient};

/// The managed side of the bridge.
pub struct Bridge {
    registry: HandleRegistry<ManagedObject>,
    network: Arc<dyn StorageNetwork>,
    config: BridgeConfig,
}

impl Bridge {
    /// Create a bridge that talks to `network`.
    pub fn new(config: BridgeConfig, network: Arc<dyn StorageNetwork>) -> Self {
        Self {
            registry: HandleRegistry::with_capacity(config.registry.max_handles),
            network,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn register(&self, object: ManagedObject) -> Result<(Handle, TypeTag)> {
        let tag = object.type_tag();
        let handle = self.registry.register(object)?;
        Ok((handle, tag))
    }

    /// Run `f` on the object behind `handle` under its read lock.
    fn with_object<R>(
        &self,
        handle: Handle,
        expected: TypeTag,
        f: impl FnOnce(&ManagedObject) -> Option<R>,
    ) -> Result<R> {
        let object = self.registry.resolve_as(handle, expected)?;
        let guard = read_object(&object);
        f(&guard).ok_or_else(|| BridgeError::TypeMismatch {
            expected,
            found: guard.type_tag(),
        })
    }

    /// Parse an API key from its text form and register it.
    pub fn parse_api_key(&self, text: &str) -> ValueEnvelope {
        let result = ApiKey::parse(text).and_then(|key| {
            tracing::debug!("Parsed api key {}", key.fingerprint());
            self.register(ManagedObject::ApiKey(key))
        });
        envelope("parse_api_key", result)
    }

    /// Canonical text form of a registered API key. The handle stays live.
    pub fn serialize_api_key(&self, handle: Handle) -> Result<String> {
        self.with_object(handle, TypeTag::ApiKey, |object| match object {
            ManagedObject::ApiKey(key) => Some(key.serialize()),
            _ => None,
        })
    }

    /// Register the descriptor of identity version `number`.
    pub fn get_id_version(&self, number: u32) -> ValueEnvelope {
        let result = id_version(number).and_then(|v| self.register(ManagedObject::IdVersion(v)));
        envelope("get_id_version", result)
    }

    /// Create an uplink client from a registered `UplinkConfig`.
    ///
    /// Zero-valued sizes and timeouts take the bridge's `[uplink]` defaults.
    pub fn new_uplink(&self, config: Handle) -> ValueEnvelope {
        let result = self
            .with_object(config, TypeTag::UplinkConfig, |object| match object {
                ManagedObject::UplinkConfig(config) => Some(config.clone()),
                _ => None,
            })
            .and_then(|config| {
                config.validate()?;
                let resolved = self.config.uplink.apply(&config);
                resolved.validate()?;
                let dial = DialSettings::from_config(&resolved);
                self.register(ManagedObject::Uplink(UplinkClient { dial }))
            });
        envelope("new_uplink", result)
    }

    /// Open a project on `satellite` and register it.
    pub async fn open_project(
        &self,
        uplink: Handle,
        satellite: &str,
        api_key: Handle,
        options: &ProjectOptions,
    ) -> ValueEnvelope {
        let result = self
            .try_open_project(uplink, satellite, api_key, options)
            .await;
        envelope("open_project", result)
    }

    async fn try_open_project(
        &self,
        uplink: Handle,
        satellite: &str,
        api_key: Handle,
        options: &ProjectOptions,
    ) -> Result<(Handle, TypeTag)> {
        let dial = self.with_object(uplink, TypeTag::Uplink, |object| match object {
            ManagedObject::Uplink(client) => Some(client.dial.clone()),
            _ => None,
        })?;
        let key = self.with_object(api_key, TypeTag::ApiKey, |object| match object {
            ManagedObject::ApiKey(key) => Some(key.clone()),
            _ => None,
        })?;
        options.validate()?;

        let session = self
            .network
            .open_project(&dial, satellite, &key, options)
            .await?;
        tracing::info!(
            "Opened project on {} with key {} (session {})",
            satellite,
            key.fingerprint(),
            session.id
        );

        let project = Project::new(session, options, Arc::clone(&self.network));
        self.register(ManagedObject::Project(project))
    }

    /// Create a bucket in an open project and return its metadata.
    ///
    /// Nothing is registered; the bucket is returned by value.
    pub async fn create_bucket(
        &self,
        project: Handle,
        name: &str,
        config: &BucketConfig,
    ) -> Result<Bucket> {
        let session = self.with_object(project, TypeTag::Project, |object| match object {
            ManagedObject::Project(project) => Some(project.session.clone()),
            _ => None,
        })?;
        let config = config.with_defaults();
        config.validate()?;

        match self.network.create_bucket(&session, name, &config).await {
            Ok(bucket) => {
                tracing::info!("Created bucket {} on {}", bucket.name, session.satellite);
                Ok(bucket)
            }
            Err(e) => {
                tracing::warn!("create_bucket failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Encode the object behind `handle`.
    pub fn snapshot_of(&self, handle: Handle) -> Result<Vec<u8>> {
        SnapshotCodec::new(&self.registry).snapshot_of(handle)
    }

    /// Create (`target == None`) or update an object from snapshot bytes.
    pub fn apply_snapshot(&self, target: Option<Handle>, bytes: &[u8]) -> ValueEnvelope {
        let result = SnapshotCodec::new(&self.registry).apply_snapshot(target, bytes);
        envelope("apply_snapshot", result)
    }

    /// Add a reference to `handle`.
    pub fn retain(&self, handle: Handle) -> Result<u64> {
        self.registry.retain(handle)
    }

    /// Drop a reference to `handle`.
    pub fn release(&self, handle: Handle) -> Result<u64> {
        self.registry.release(handle)
    }

    /// Drop a reference to a handle that must be of type `expected`.
    pub fn release_as(&self, handle: Handle, expected: TypeTag) -> Result<u64> {
        let found = self.registry.type_of(handle)?;
        if found != expected {
            return Err(BridgeError::TypeMismatch { expected, found });
        }
        self.registry.release(handle)
    }

    /// Type of the object behind `handle`.
    pub fn type_of(&self, handle: Handle) -> Result<TypeTag> {
        self.registry.type_of(handle)
    }

    /// Number of live handles.
    pub fn live_handles(&self) -> usize {
        self.registry.len()
    }

    /// Registry counters.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Release every live handle, closing any open project sessions.
    pub fn shutdown(&self) -> usize {
        let freed = self.registry.drain();
        tracing::info!("Bridge shut down, {} handles released", freed);
        freed
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn envelope(op: &str, result: Result<(Handle, TypeTag)>) -> ValueEnvelope {
    if let Err(ref e) = result {
        tracing::warn!("{} failed: {}", op, e);
    }
    result.into()
}
