//! In-memory storage network.
//!
//! Keeps sessions and buckets in process and lets tests force failures.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bridge_types::{validate_bucket_name, ApiKey, Bucket, BucketConfig, ProjectOptions};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::network::{DialSettings, NetworkError, ProjectSession, StorageNetwork};

/// Bucket namespace: one per satellite and API key.
type BucketKey = (String, String, String);

/// Mock storage network.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// bridge owns another.
#[derive(Debug, Default, Clone)]
pub struct MockNetwork {
    inner: Arc<MockNetworkInner>,
}

#[derive(Debug, Default)]
struct MockNetworkInner {
    sessions: DashMap<Uuid, ProjectSession>,
    buckets: DashMap<BucketKey, Bucket>,
    denied_keys: DashSet<String>,
    unreachable: DashSet<String>,
    dial_latency: Mutex<Duration>,
    fail_next_open_project: Mutex<Option<NetworkError>>,
    fail_next_create_bucket: Mutex<Option<NetworkError>>,
    closed_total: std::sync::atomic::AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next `open_project()` to fail with `error`.
    pub fn fail_next_open_project(&self, error: NetworkError) {
        *lock(&self.inner.fail_next_open_project) = Some(error);
    }

    /// Cause the next `create_bucket()` to fail with `error`.
    pub fn fail_next_create_bucket(&self, error: NetworkError) {
        *lock(&self.inner.fail_next_create_bucket) = Some(error);
    }

    /// Reject every future `open_project()` that uses `api_key`.
    pub fn deny_api_key(&self, api_key: &ApiKey) {
        self.inner.denied_keys.insert(api_key.fingerprint());
    }

    /// Make `satellite` unreachable.
    pub fn mark_unreachable(&self, satellite: &str) {
        self.inner.unreachable.insert(satellite.to_string());
    }

    /// Delay every dial by `latency`; dials slower than the client's dial
    /// timeout fail as unreachable.
    pub fn set_dial_latency(&self, latency: Duration) {
        *lock(&self.inner.dial_latency) = latency;
    }

    /// Sessions that are currently open.
    pub fn open_sessions(&self) -> Vec<ProjectSession> {
        self.inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of sessions closed so far.
    pub fn closed_sessions(&self) -> u64 {
        self.inner
            .closed_total
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Names of all buckets created on `satellite`, sorted.
    pub fn buckets(&self, satellite: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .buckets
            .iter()
            .filter(|entry| entry.key().0 == satellite)
            .map(|entry| entry.key().2.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StorageNetwork for MockNetwork {
    async fn open_project(
        &self,
        dial: &DialSettings,
        satellite: &str,
        api_key: &ApiKey,
        _options: &ProjectOptions,
    ) -> Result<ProjectSession, NetworkError> {
        let latency = *lock(&self.inner.dial_latency);
        if !latency.is_zero()
            && tokio::time::timeout(dial.dial_timeout, tokio::time::sleep(latency))
                .await
                .is_err()
        {
            return Err(NetworkError::Unreachable(format!(
                "{satellite}: dial timed out after {:?}",
                dial.dial_timeout
            )));
        }

        // Check for forced failure
        if let Some(error) = lock(&self.inner.fail_next_open_project).take() {
            return Err(error);
        }

        if satellite.trim().is_empty() || self.inner.unreachable.contains(satellite) {
            return Err(NetworkError::Unreachable(satellite.to_string()));
        }
        if self.inner.denied_keys.contains(&api_key.fingerprint()) {
            return Err(NetworkError::Unauthorized(format!(
                "api key {} rejected by {satellite}",
                api_key.fingerprint()
            )));
        }

        let session = ProjectSession::new(satellite, api_key);
        tracing::debug!("Mock session {} opened on {}", session.id, satellite);
        self.inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn create_bucket(
        &self,
        session: &ProjectSession,
        name: &str,
        config: &BucketConfig,
    ) -> Result<Bucket, NetworkError> {
        if !self.inner.sessions.contains_key(&session.id) {
            return Err(NetworkError::SessionClosed);
        }

        // Check for forced failure
        if let Some(error) = lock(&self.inner.fail_next_create_bucket).take() {
            return Err(error);
        }

        validate_bucket_name(name).map_err(|reason| NetworkError::InvalidBucketName {
            name: name.to_string(),
            reason,
        })?;

        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let key = (
            session.satellite.clone(),
            session.key_fingerprint.clone(),
            name.to_string(),
        );

        match self.inner.buckets.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(NetworkError::BucketExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let bucket = Bucket::new(name, created, &config.with_defaults());
                slot.insert(bucket.clone());
                tracing::debug!("Mock bucket {} created in session {}", name, session.id);
                Ok(bucket)
            }
        }
    }

    fn close_project(&self, session: &ProjectSession) {
        if self.inner.sessions.remove(&session.id).is_some() {
            self.inner
                .closed_total
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::debug!("Mock session {} closed", session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::UplinkConfig;

    const SATELLITE: &str = "127.0.0.1:7777";

    fn dial() -> DialSettings {
        DialSettings::from_config(&UplinkConfig {
            dial_timeout_ms: 20_000,
            request_timeout_ms: 20_000,
            ..Default::default()
        })
    }

    fn key() -> ApiKey {
        ApiKey::from_bytes(b"mock-network-key").unwrap()
    }

    async fn open(network: &MockNetwork) -> ProjectSession {
        network
            .open_project(&dial(), SATELLITE, &key(), &ProjectOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_and_close_project() {
        let network = MockNetwork::new();
        let session = open(&network).await;

        assert_eq!(session.satellite, SATELLITE);
        assert_eq!(network.open_sessions(), vec![session.clone()]);

        network.close_project(&session);
        network.close_project(&session);
        assert!(network.open_sessions().is_empty());
        assert_eq!(network.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn denied_key_is_unauthorized() {
        let network = MockNetwork::new();
        network.deny_api_key(&key());

        let err = network
            .open_project(&dial(), SATELLITE, &key(), &ProjectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unreachable_satellites() {
        let network = MockNetwork::new();
        network.mark_unreachable("down:7777");

        for satellite in ["", "down:7777"] {
            let err = network
                .open_project(&dial(), satellite, &key(), &ProjectOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, NetworkError::Unreachable(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_dial_times_out() {
        let network = MockNetwork::new();
        network.set_dial_latency(Duration::from_secs(30));

        let err = network
            .open_project(&dial(), SATELLITE, &key(), &ProjectOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dial timed out"));

        network.set_dial_latency(Duration::from_secs(1));
        assert!(network
            .open_project(&dial(), SATELLITE, &key(), &ProjectOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn forced_failures_apply_once() {
        let network = MockNetwork::new();
        network.fail_next_open_project(NetworkError::Other("boom".into()));

        let err = network
            .open_project(&dial(), SATELLITE, &key(), &ProjectOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::Other("boom".into()));

        let session = open(&network).await;
        network.fail_next_create_bucket(NetworkError::Other("disk full".into()));
        assert!(network
            .create_bucket(&session, "photos", &BucketConfig::default())
            .await
            .is_err());
        assert!(network
            .create_bucket(&session, "photos", &BucketConfig::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn create_bucket_fills_defaults() {
        let network = MockNetwork::new();
        let session = open(&network).await;

        let bucket = network
            .create_bucket(&session, "photos", &BucketConfig::default())
            .await
            .unwrap();
        let expected = BucketConfig::default().with_defaults();
        assert_eq!(bucket.name, "photos");
        assert_eq!(bucket.redundancy_scheme, expected.redundancy_scheme);
        assert_eq!(bucket.segment_size, expected.segment_size);
        assert!(bucket.created > 0);
        assert_eq!(network.buckets(SATELLITE), vec!["photos".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_bucket_is_rejected() {
        let network = MockNetwork::new();
        let session = open(&network).await;
        network
            .create_bucket(&session, "photos", &BucketConfig::default())
            .await
            .unwrap();

        // Same project through a second session.
        let other = open(&network).await;
        let err = network
            .create_bucket(&other, "photos", &BucketConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::BucketExists("photos".into()));
    }

    #[tokio::test]
    async fn invalid_bucket_name_is_rejected() {
        let network = MockNetwork::new();
        let session = open(&network).await;

        for name in ["", "ab", "Photos", "-photos", "photos_2"] {
            let err = network
                .create_bucket(&session, name, &BucketConfig::default())
                .await
                .unwrap_err();
            assert!(
                matches!(err, NetworkError::InvalidBucketName { .. }),
                "{name:?} should be rejected"
            );
        }
        assert!(network.buckets(SATELLITE).is_empty());
    }

    #[tokio::test]
    async fn closed_session_cannot_create_buckets() {
        let network = MockNetwork::new();
        let session = open(&network).await;
        network.close_project(&session);

        let err = network
            .create_bucket(&session, "photos", &BucketConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::SessionClosed);
    }
}
