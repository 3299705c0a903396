//! HandleRegistry - the table that keeps managed objects alive for native code.
//!
//! Slots are reused; every free bumps the slot generation so handles issued
//! before the free stop resolving. The table lock is held only while the
//! table itself changes. Object access goes through a per-object `RwLock`
//! and teardown runs with the table unlocked.
//!
//! ```text
//! Unregistered --register--> Registered(refs > 0) --release to 0--> Released
//!                              |      ^
//!                              +------+ retain / release
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bridge_types::{BridgeError, Handle, Result, Snapshot, TypeTag};

/// Default ceiling on live handles.
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// An object the registry can own.
pub trait Managed: Send + Sync + 'static {
    /// Type of this object.
    fn type_tag(&self) -> TypeTag;

    /// Encode the current field values as snapshot bytes.
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Overwrite fields from a decoded snapshot.
    ///
    /// Must leave `self` untouched when it returns an error.
    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Build a new object from a decoded snapshot.
    fn from_snapshot(snapshot: &Snapshot) -> Result<Self>
    where
        Self: Sized;

    /// Release external resources. Runs once, before the slot is reused.
    fn teardown(&mut self) {}
}

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live entries.
    pub live: usize,
    /// Maximum live entries.
    pub capacity: usize,
    /// Entries ever registered.
    pub registered_total: u64,
    /// Entries ever freed.
    pub released_total: u64,
}

struct Entry<T> {
    object: Arc<RwLock<T>>,
    tag: TypeTag,
    refs: u64,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T> SlotTable<T> {
    fn slot_mut(&mut self, handle: Handle) -> Result<(usize, &mut Slot<T>)> {
        let index = handle
            .slot()
            .ok_or_else(|| BridgeError::invalid_handle(handle, "null handle"))?;
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| BridgeError::invalid_handle(handle, "unknown slot"))?;
        if slot.generation != handle.generation {
            return Err(BridgeError::invalid_handle(handle, "stale generation"));
        }
        if slot.entry.is_none() {
            return Err(BridgeError::invalid_handle(handle, "slot is free"));
        }
        Ok((index, slot))
    }

    fn entry_mut(&mut self, handle: Handle) -> Result<&mut Entry<T>> {
        let (_, slot) = self.slot_mut(handle)?;
        slot.entry
            .as_mut()
            .ok_or_else(|| BridgeError::invalid_handle(handle, "slot is free"))
    }
}

/// Process-wide table mapping handles to managed objects.
pub struct HandleRegistry<T: Managed> {
    table: Mutex<SlotTable<T>>,
    capacity: usize,
    registered_total: AtomicU64,
    released_total: AtomicU64,
}

impl<T: Managed> HandleRegistry<T> {
    /// Create a registry with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a registry holding at most `capacity` live entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Mutex::new(SlotTable {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
            capacity,
            registered_total: AtomicU64::new(0),
            released_total: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotTable<T>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `object` and return a handle with a reference count of one.
    ///
    /// On failure the object is torn down before the error is returned.
    pub fn register(&self, mut object: T) -> Result<Handle> {
        let tag = object.type_tag();
        let mut table = self.lock();

        if table.live >= self.capacity {
            drop(table);
            tracing::warn!("Registry full ({} live), rejecting {}", self.capacity, tag);
            object.teardown();
            return Err(BridgeError::ResourceExhausted {
                capacity: self.capacity,
            });
        }

        let index = match table.free.pop() {
            Some(index) => index,
            None => {
                table.slots.push(Slot {
                    generation: 1,
                    entry: None,
                });
                table.slots.len() - 1
            }
        };

        let slot = &mut table.slots[index];
        slot.entry = Some(Entry {
            object: Arc::new(RwLock::new(object)),
            tag,
            refs: 1,
        });
        let handle = Handle::new(index as u64 + 1, slot.generation);
        table.live += 1;
        drop(table);

        self.registered_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Registered {} as {}", tag, handle);
        Ok(handle)
    }

    /// Resolve a handle to its object.
    pub fn resolve(&self, handle: Handle) -> Result<Arc<RwLock<T>>> {
        let mut table = self.lock();
        match table.entry_mut(handle) {
            Ok(entry) => Ok(Arc::clone(&entry.object)),
            Err(e) => {
                tracing::warn!("Rejected handle {}: {}", handle, e);
                Err(e)
            }
        }
    }

    /// Resolve a handle that must reference an object of type `expected`.
    pub fn resolve_as(&self, handle: Handle, expected: TypeTag) -> Result<Arc<RwLock<T>>> {
        let mut table = self.lock();
        let entry = table.entry_mut(handle).inspect_err(|e| {
            tracing::warn!("Rejected handle {}: {}", handle, e);
        })?;
        if entry.tag != expected {
            return Err(BridgeError::TypeMismatch {
                expected,
                found: entry.tag,
            });
        }
        Ok(Arc::clone(&entry.object))
    }

    /// Type of the object behind a live handle.
    pub fn type_of(&self, handle: Handle) -> Result<TypeTag> {
        Ok(self.lock().entry_mut(handle)?.tag)
    }

    /// Current reference count of a live handle.
    pub fn ref_count(&self, handle: Handle) -> Result<u64> {
        Ok(self.lock().entry_mut(handle)?.refs)
    }

    /// Add a reference. Returns the new count.
    pub fn retain(&self, handle: Handle) -> Result<u64> {
        let mut table = self.lock();
        let entry = table.entry_mut(handle)?;
        entry.refs = entry
            .refs
            .checked_add(1)
            .ok_or_else(|| BridgeError::Internal(format!("reference count overflow on {handle}")))?;
        Ok(entry.refs)
    }

    /// Drop a reference. Returns the remaining count.
    ///
    /// When the count reaches zero the handle (and every copy of it) stops
    /// resolving immediately, the object is torn down, and only then does
    /// the slot become available to [`register`](Self::register).
    pub fn release(&self, handle: Handle) -> Result<u64> {
        let (index, entry) = {
            let mut table = self.lock();
            let (index, slot) = table.slot_mut(handle).inspect_err(|e| {
                tracing::warn!("Rejected release of {}: {}", handle, e);
            })?;
            let Some(entry) = slot.entry.as_mut() else {
                return Err(BridgeError::invalid_handle(handle, "slot is free"));
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                return Ok(entry.refs);
            }

            let entry = slot.entry.take();
            slot.generation = next_generation(slot.generation);
            table.live -= 1;
            (index, entry)
        };

        if let Some(entry) = entry {
            tracing::debug!("Freeing {} ({})", handle, entry.tag);
            self.teardown(index, entry);
        }
        Ok(0)
    }

    fn teardown(&self, index: usize, entry: Entry<T>) {
        write_object(&entry.object).teardown();
        self.lock().free.push(index);
        self.released_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Free every live entry regardless of reference count.
    ///
    /// Returns how many entries were freed.
    pub fn drain(&self) -> usize {
        let drained: Vec<(usize, Entry<T>)> = {
            let mut table = self.lock();
            let drained: Vec<_> = table
                .slots
                .iter_mut()
                .enumerate()
                .filter_map(|(index, slot)| {
                    let entry = slot.entry.take()?;
                    slot.generation = next_generation(slot.generation);
                    Some((index, entry))
                })
                .collect();
            table.live -= drained.len();
            drained
        };

        let count = drained.len();
        for (index, entry) in drained {
            self.teardown(index, entry);
        }
        if count > 0 {
            tracing::info!("Drained {} live handles", count);
        }
        count
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().live
    }

    /// True when no entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registry counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.len(),
            capacity: self.capacity,
            registered_total: self.registered_total.load(Ordering::Relaxed),
            released_total: self.released_total.load(Ordering::Relaxed),
        }
    }
}

impl<T: Managed> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Managed> std::fmt::Debug for HandleRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Generation after `current`; 0 is never issued.
fn next_generation(current: u32) -> u32 {
    match current.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// Take a read lock on an object, recovering from poisoning.
pub fn read_object<T>(object: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    object.read().unwrap_or_else(PoisonError::into_inner)
}

/// Take a write lock on an object, recovering from poisoning.
pub fn write_object<T>(object: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    object.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bridge_types::{snapshot, ErrorKind, UplinkConfig};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    /// Minimal managed object backed by a real schema.
    #[derive(Default)]
    pub(crate) struct TestObject {
        pub config: UplinkConfig,
        pub teardowns: Arc<AtomicUsize>,
        pub on_teardown: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl TestObject {
        pub fn with_timeout(ms: u64) -> Self {
            Self {
                config: UplinkConfig {
                    dial_timeout_ms: ms,
                    ..Default::default()
                },
                ..Default::default()
            }
        }
    }

    impl Managed for TestObject {
        fn type_tag(&self) -> TypeTag {
            TypeTag::UplinkConfig
        }

        fn snapshot(&self) -> Result<Vec<u8>> {
            Snapshot::encode(&self.config)
        }

        fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
            self.config = snapshot.decode()?;
            Ok(())
        }

        fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
            Ok(Self {
                config: snapshot.decode()?,
                ..Default::default()
            })
        }

        fn teardown(&mut self) {
            if let Some(rx) = self.on_teardown.take() {
                let _ = rx.lock().unwrap().recv();
            }
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_then_resolve() {
        let registry = HandleRegistry::new();
        let handle = registry.register(TestObject::with_timeout(5)).unwrap();

        assert!(handle.is_valid());
        let object = registry.resolve(handle).unwrap();
        assert_eq!(read_object(&object).config.dial_timeout_ms, 5);
        assert_eq!(registry.ref_count(handle).unwrap(), 1);
        assert_eq!(registry.type_of(handle).unwrap(), TypeTag::UplinkConfig);
    }

    #[test]
    fn null_and_unknown_handles_are_invalid() {
        let registry: HandleRegistry<TestObject> = HandleRegistry::new();
        let err = registry.resolve(Handle::INVALID).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        assert!(err.to_string().contains("null handle"));

        let err = registry.resolve(Handle::new(17, 1)).err().unwrap();
        assert!(err.to_string().contains("unknown slot"));
    }

    #[test]
    fn released_handle_stops_resolving_even_after_reuse() {
        let registry = HandleRegistry::new();
        let old = registry.register(TestObject::with_timeout(1)).unwrap();
        assert_eq!(registry.release(old).unwrap(), 0);

        let err = registry.resolve(old).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);

        let new = registry.register(TestObject::with_timeout(2)).unwrap();
        assert_eq!(new.id, old.id, "freed slot should be reused");
        assert_ne!(new.generation, old.generation);

        let err = registry.resolve(old).err().unwrap();
        assert!(err.to_string().contains("stale generation"));
        let object = registry.resolve(new).unwrap();
        assert_eq!(read_object(&object).config.dial_timeout_ms, 2);
    }

    #[test]
    fn double_release_is_an_error() {
        let registry = HandleRegistry::new();
        let handle = registry.register(TestObject::default()).unwrap();
        registry.release(handle).unwrap();

        let err = registry.release(handle).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        assert_eq!(registry.stats().released_total, 1);
    }

    #[test]
    fn retains_and_releases_balance() {
        let registry = HandleRegistry::new();
        let handle = registry.register(TestObject::default()).unwrap();

        for n in 1..=5 {
            assert_eq!(registry.retain(handle).unwrap(), 1 + n);
        }
        for remaining in (1..=5).rev() {
            assert_eq!(registry.release(handle).unwrap(), remaining);
            assert!(registry.resolve(handle).is_ok());
        }
        assert_eq!(registry.release(handle).unwrap(), 0);
        assert!(registry.resolve(handle).is_err());
    }

    #[test]
    fn teardown_runs_once_on_final_release() {
        let registry = HandleRegistry::new();
        let object = TestObject::default();
        let teardowns = Arc::clone(&object.teardowns);
        let handle = registry.register(object).unwrap();
        registry.retain(handle).unwrap();

        registry.release(handle).unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        registry.release(handle).unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slot_is_not_reused_while_teardown_runs() {
        let registry = Arc::new(HandleRegistry::new());
        let (tx, rx) = mpsc::channel();
        let object = TestObject {
            on_teardown: Some(Mutex::new(rx)),
            ..Default::default()
        };
        let teardowns = Arc::clone(&object.teardowns);
        let old = registry.register(object).unwrap();

        let releaser = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.release(old))
        };

        // Wait until the release has unpublished the handle.
        while registry.resolve(old).is_ok() {
            thread::sleep(Duration::from_millis(1));
        }
        let during = registry.register(TestObject::default()).unwrap();
        assert_ne!(during.id, old.id);
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        assert_eq!(releaser.join().unwrap().unwrap(), 0);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);

        let after = registry.register(TestObject::default()).unwrap();
        assert_eq!(after.id, old.id);
    }

    #[test]
    fn full_registry_is_resource_exhausted_and_tears_down() {
        let registry = HandleRegistry::with_capacity(2);
        registry.register(TestObject::default()).unwrap();
        let second = registry.register(TestObject::default()).unwrap();

        let rejected = TestObject::default();
        let teardowns = Arc::clone(&rejected.teardowns);
        let err = registry.register(rejected).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 2);

        registry.release(second).unwrap();
        assert!(registry.register(TestObject::default()).is_ok());
    }

    #[test]
    fn resolve_as_checks_type() {
        let registry = HandleRegistry::new();
        let handle = registry.register(TestObject::default()).unwrap();
        assert!(registry.resolve_as(handle, TypeTag::UplinkConfig).is_ok());

        let err = registry.resolve_as(handle, TypeTag::ApiKey).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn drain_frees_everything() {
        let registry = HandleRegistry::new();
        let object = TestObject::default();
        let teardowns = Arc::clone(&object.teardowns);
        let a = registry.register(object).unwrap();
        registry.retain(a).unwrap();
        let b = registry.register(TestObject::default()).unwrap();

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());
        assert!(registry.resolve(a).is_err());
        assert!(registry.resolve(b).is_err());
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(registry.drain(), 0);
    }

    #[test]
    fn concurrent_retain_release_never_frees_early() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 1_000;

        let registry = Arc::new(HandleRegistry::new());
        let handle = registry.register(TestObject::default()).unwrap();
        let barrier = Arc::new(Barrier::new(THREADS));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        registry.retain(handle).unwrap();
                        assert!(registry.resolve(handle).is_ok());
                        assert!(registry.release(handle).unwrap() >= 1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.ref_count(handle).unwrap(), 1);
        assert_eq!(registry.release(handle).unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn generation_never_wraps_to_zero() {
        assert_eq!(next_generation(1), 2);
        assert_eq!(next_generation(u32::MAX), 1);
    }

    #[test]
    fn stats_track_totals() {
        let registry = HandleRegistry::with_capacity(10);
        let a = registry.register(TestObject::default()).unwrap();
        registry.register(TestObject::default()).unwrap();
        registry.release(a).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.registered_total, 2);
        assert_eq!(stats.released_total, 1);
    }

    #[test]
    fn snapshot_schema_is_used_by_test_object() {
        let object = TestObject::with_timeout(9);
        let bytes = object.snapshot().unwrap();
        let config: UplinkConfig = snapshot::decode(&bytes).unwrap();
        assert_eq!(config.dial_timeout_ms, 9);
    }
}
