//! # In-Memory Stores
//!
//! In-process stand-ins for the API server and its watch caches.
//!
//! `InMemoryReleasePayloads` keeps two views: the live objects served by the
//! client, and a cache served by the lister. Status writes only touch the live
//! view until [`InMemoryReleasePayloads::sync_cache`] is called, which mirrors how
//! a watch event lags behind a write.

use super::{JobLister, ReleasePayloadClient, ReleasePayloadLister, StoreError};
use crate::crd::ReleasePayload;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type ObjectKey = (String, String);

fn object_key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn key_of(payload: &ReleasePayload) -> ObjectKey {
    object_key(
        payload.metadata.namespace.as_deref().unwrap_or_default(),
        payload.metadata.name.as_deref().unwrap_or_default(),
    )
}

/// ReleasePayloads held in memory, with resource-version checked status writes
#[derive(Debug, Default)]
pub struct InMemoryReleasePayloads {
    live: Mutex<BTreeMap<ObjectKey, ReleasePayload>>,
    cache: Mutex<BTreeMap<ObjectKey, ReleasePayload>>,
    resource_version: AtomicU64,
    status_updates: AtomicUsize,
    pending_conflicts: AtomicUsize,
}

impl InMemoryReleasePayloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a payload in both the live view and the cache
    ///
    /// Assigns a fresh resource version.
    pub fn insert(&self, mut payload: ReleasePayload) {
        payload.metadata.resource_version = Some(self.next_resource_version());
        let key = key_of(&payload);
        self.live_map().insert(key.clone(), payload.clone());
        self.cache_map().insert(key, payload);
    }

    /// Remove a payload from both views
    pub fn delete(&self, namespace: &str, name: &str) {
        let key = object_key(namespace, name);
        self.live_map().remove(&key);
        self.cache_map().remove(&key);
    }

    /// Replace the cache with the current live objects
    pub fn sync_cache(&self) {
        let live = self.live_map().clone();
        *self.cache_map() = live;
    }

    /// Current live object, bypassing the cache
    pub fn live(&self, namespace: &str, name: &str) -> Option<ReleasePayload> {
        self.live_map().get(&object_key(namespace, name)).cloned()
    }

    /// Number of status writes that were persisted
    pub fn status_updates(&self) -> usize {
        self.status_updates.load(Ordering::SeqCst)
    }

    /// Make the next `count` status writes fail with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn live_map(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjectKey, ReleasePayload>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_map(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjectKey, ReleasePayload>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReleasePayloadLister for InMemoryReleasePayloads {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ReleasePayload>> {
        self.cache_map()
            .get(&object_key(namespace, name))
            .cloned()
            .map(Arc::new)
    }

    fn list(&self) -> Vec<Arc<ReleasePayload>> {
        self.cache_map().values().cloned().map(Arc::new).collect()
    }
}

#[async_trait]
impl ReleasePayloadClient for InMemoryReleasePayloads {
    async fn get(&self, namespace: &str, name: &str) -> Result<ReleasePayload, StoreError> {
        self.live(namespace, name).ok_or_else(|| StoreError::NotFound {
            kind: "ReleasePayload",
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn update_status(&self, payload: &ReleasePayload) -> Result<ReleasePayload, StoreError> {
        let key = key_of(payload);
        let conflict = || StoreError::Conflict {
            kind: "ReleasePayload",
            namespace: key.0.clone(),
            name: key.1.clone(),
        };

        if self.take_injected_conflict() {
            return Err(conflict());
        }

        let mut live = self.live_map();
        let Some(current) = live.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind: "ReleasePayload",
                namespace: key.0.clone(),
                name: key.1.clone(),
            });
        };

        if current.metadata.resource_version != payload.metadata.resource_version {
            return Err(conflict());
        }

        current.status.clone_from(&payload.status);
        current.metadata.resource_version = Some(self.next_resource_version());
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        Ok(current.clone())
    }
}

/// Jobs held in memory
#[derive(Debug, Default)]
pub struct InMemoryJobs {
    jobs: Mutex<BTreeMap<ObjectKey, Arc<Job>>>,
}

impl InMemoryJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a Job
    pub fn insert(&self, job: Job) {
        let key = object_key(
            job.metadata.namespace.as_deref().unwrap_or_default(),
            job.metadata.name.as_deref().unwrap_or_default(),
        );
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(job));
    }

    pub fn delete(&self, namespace: &str, name: &str) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&object_key(namespace, name));
    }
}

impl JobLister for InMemoryJobs {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Job>> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&object_key(namespace, name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ReleaseCreationJobStatus, ReleasePayloadSpec, ReleasePayloadStatus};

    fn payload() -> ReleasePayload {
        let mut payload = ReleasePayload::new("4.11.0-0.nightly", ReleasePayloadSpec::default());
        payload.metadata.namespace = Some("ocp".to_string());
        payload
    }

    #[tokio::test]
    async fn test_update_status_bumps_resource_version() {
        let store = InMemoryReleasePayloads::new();
        store.insert(payload());

        let mut current = ReleasePayloadClient::get(&store, "ocp", "4.11.0-0.nightly")
            .await
            .unwrap();
        let mut status = ReleasePayloadStatus::default();
        status.release_creation_job_result.status = Some(ReleaseCreationJobStatus::Success);
        current.status = Some(status);

        let updated = store.update_status(&current).await.unwrap();
        assert_ne!(
            updated.metadata.resource_version,
            current.metadata.resource_version
        );
        assert_eq!(store.status_updates(), 1);

        // A second write with the old resource version is rejected
        let err = store.update_status(&current).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.status_updates(), 1);
    }

    #[tokio::test]
    async fn test_cache_lags_until_synced() {
        let store = InMemoryReleasePayloads::new();
        store.insert(payload());

        let mut current = ReleasePayloadClient::get(&store, "ocp", "4.11.0-0.nightly")
            .await
            .unwrap();
        current.status = Some(ReleasePayloadStatus::default());
        current
            .status
            .as_mut()
            .unwrap()
            .release_creation_job_result
            .message = "updated".to_string();
        store.update_status(&current).await.unwrap();

        let cached = ReleasePayloadLister::get(&store, "ocp", "4.11.0-0.nightly").unwrap();
        assert!(cached.status.is_none());

        store.sync_cache();
        let cached = ReleasePayloadLister::get(&store, "ocp", "4.11.0-0.nightly").unwrap();
        assert_eq!(cached.job_result().unwrap().message, "updated");
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = InMemoryReleasePayloads::new();
        store.insert(payload());
        store.inject_conflicts(1);

        let current = ReleasePayloadClient::get(&store, "ocp", "4.11.0-0.nightly")
            .await
            .unwrap();
        assert!(store.update_status(&current).await.unwrap_err().is_conflict());
        assert!(store.update_status(&current).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_of_deleted_payload_is_not_found() {
        let store = InMemoryReleasePayloads::new();
        store.insert(payload());
        let current = ReleasePayloadClient::get(&store, "ocp", "4.11.0-0.nightly")
            .await
            .unwrap();
        store.delete("ocp", "4.11.0-0.nightly");

        assert!(store.update_status(&current).await.unwrap_err().is_not_found());
    }
}
