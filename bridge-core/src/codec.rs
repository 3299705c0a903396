//! SnapshotCodec - by-value transfer of registered objects.

use bridge_types::{BridgeError, Handle, Result, Snapshot, TypeTag};

use crate::registry::{read_object, write_object, HandleRegistry, Managed};

/// Moves object state between the registry and snapshot bytes.
pub struct SnapshotCodec<'a, T: Managed> {
    registry: &'a HandleRegistry<T>,
}

impl<'a, T: Managed> SnapshotCodec<'a, T> {
    /// Wrap a registry.
    pub fn new(registry: &'a HandleRegistry<T>) -> Self {
        Self { registry }
    }

    /// Encode the current state of the object behind `handle`.
    ///
    /// Calling this twice without an intervening mutation yields identical
    /// bytes.
    pub fn snapshot_of(&self, handle: Handle) -> Result<Vec<u8>> {
        let object = self.registry.resolve(handle)?;
        let guard = read_object(&object);
        guard.snapshot()
    }

    /// Apply snapshot bytes.
    ///
    /// With `target == None` a new object is built from the snapshot and
    /// registered; the new handle is returned. With `Some(handle)` the
    /// object's fields are overwritten in place and the same handle is
    /// returned. A failed apply leaves the target unchanged.
    ///
    /// The returned tag is read from the object before it is published.
    pub fn apply_snapshot(
        &self,
        target: Option<Handle>,
        bytes: &[u8],
    ) -> Result<(Handle, TypeTag)> {
        let snapshot = Snapshot::peek(bytes)?;

        let Some(handle) = target else {
            let object = T::from_snapshot(&snapshot)?;
            let tag = object.type_tag();
            return Ok((self.registry.register(object)?, tag));
        };

        let object = self.registry.resolve(handle)?;
        let mut guard = write_object(&object);
        let tag = guard.type_tag();
        if tag != snapshot.tag() {
            return Err(BridgeError::SchemaMismatch(format!(
                "cannot apply {} snapshot to {} handle {}",
                snapshot.tag(),
                tag,
                handle
            )));
        }
        guard.apply_snapshot(&snapshot)?;
        tracing::debug!("Applied {} snapshot to {}", tag, handle);
        Ok((handle, tag))
    }
}
