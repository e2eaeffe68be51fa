//! # Resource Stores
//!
//! Read and write seams between the reconciler and the Kubernetes API.
//!
//! - [`ReleasePayloadLister`] and [`JobLister`] read from watch-populated caches.
//!   They are eventually consistent and safe to share between workers.
//! - [`ReleasePayloadClient`] talks to the API server directly and is the only
//!   mutation point. Status writes are guarded by the resource version.
//!
//! `kubernetes` holds the reflector-backed implementations used in production,
//! `memory` holds in-process implementations used by tests.

pub mod kubernetes;
pub mod memory;

use crate::crd::ReleasePayload;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the live release payload client
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist (anymore)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    /// The object changed since it was read
    #[error("conflict updating {kind} {namespace}/{name}: the object has been modified")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    /// Transport or API failure
    #[error("API request failed: {0}")]
    Api(#[from] kube::Error),
    /// Request body could not be built
    #[error("failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Cached, read-only view of ReleasePayloads
pub trait ReleasePayloadLister: Send + Sync {
    /// Look up a payload; `None` when it is not in the cache
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ReleasePayload>>;

    /// Every cached payload
    fn list(&self) -> Vec<Arc<ReleasePayload>>;
}

/// Cached, read-only view of batch Jobs
pub trait JobLister: Send + Sync {
    /// Look up a Job; `None` when it is not in the cache
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Job>>;
}

/// Live access to ReleasePayloads
#[async_trait]
pub trait ReleasePayloadClient: Send + Sync {
    /// Read the current object from the API server
    async fn get(&self, namespace: &str, name: &str) -> Result<ReleasePayload, StoreError>;

    /// Persist `payload.status`
    ///
    /// Fails with [`StoreError::Conflict`] when `payload.metadata.resourceVersion`
    /// is no longer current.
    async fn update_status(&self, payload: &ReleasePayload) -> Result<ReleasePayload, StoreError>;
}

/// Keys of every cached payload whose coordinates name `job_name`
///
/// Used to translate Job watch events into ReleasePayload work items. Only the
/// name is compared: Jobs are always looked up in the configured job namespace.
pub fn payload_keys_for_job(payloads: &dyn ReleasePayloadLister, job_name: &str) -> Vec<String> {
    let mut keys: Vec<String> = payloads
        .list()
        .iter()
        .filter(|p| p.job_coordinates().name == job_name)
        .map(|p| p.key())
        .collect();
    keys.sort();
    keys
}
