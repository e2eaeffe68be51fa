//! # Kubernetes Stores
//!
//! Reflector-backed listers and the live ReleasePayload client.

use super::{JobLister, ReleasePayloadClient, ReleasePayloadLister, StoreError};
use crate::constants::CONTROLLER_NAME;
use crate::crd::ReleasePayload;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use kube_runtime::reflector::{ObjectRef, Store};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// ReleasePayload lister over a reflector store
#[derive(Clone)]
pub struct ReflectorReleasePayloadLister {
    store: Store<ReleasePayload>,
}

impl ReflectorReleasePayloadLister {
    pub fn new(store: Store<ReleasePayload>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ReflectorReleasePayloadLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectorReleasePayloadLister")
            .field("cached", &self.store.len())
            .finish()
    }
}

impl ReleasePayloadLister for ReflectorReleasePayloadLister {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ReleasePayload>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }

    fn list(&self) -> Vec<Arc<ReleasePayload>> {
        self.store.state()
    }
}

/// Job lister over a reflector store
#[derive(Clone)]
pub struct ReflectorJobLister {
    store: Store<Job>,
}

impl ReflectorJobLister {
    pub fn new(store: Store<Job>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ReflectorJobLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectorJobLister")
            .field("cached", &self.store.len())
            .finish()
    }
}

impl JobLister for ReflectorJobLister {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Job>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }
}

/// Live ReleasePayload client
#[derive(Clone)]
pub struct KubeReleasePayloadClient {
    client: Client,
}

impl KubeReleasePayloadClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ReleasePayload> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl fmt::Debug for KubeReleasePayloadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeReleasePayloadClient").finish_non_exhaustive()
    }
}

/// Translate API status codes into store errors
fn classify(error: kube::Error, namespace: &str, name: &str) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: "ReleasePayload",
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: "ReleasePayload",
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => StoreError::Api(other),
    }
}

/// Merge patch for the status subresource
///
/// Carrying `metadata.resourceVersion` makes the API server reject the patch
/// with 409 when the object changed since it was read.
fn status_patch(payload: &ReleasePayload) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::json!({
        "metadata": {
            "resourceVersion": payload.metadata.resource_version,
        },
        "status": serde_json::to_value(&payload.status)?,
    }))
}

#[async_trait]
impl ReleasePayloadClient for KubeReleasePayloadClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<ReleasePayload, StoreError> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, namespace, name))
    }

    async fn update_status(&self, payload: &ReleasePayload) -> Result<ReleasePayload, StoreError> {
        let namespace = payload.metadata.namespace.as_deref().unwrap_or_default();
        let name = payload.metadata.name.as_deref().unwrap_or_default();
        let patch = status_patch(payload)?;

        debug!(
            "Patching status of ReleasePayload {}/{} at resourceVersion {:?}",
            namespace, name, payload.metadata.resource_version
        );

        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| classify(e, namespace, name))
    }
}
