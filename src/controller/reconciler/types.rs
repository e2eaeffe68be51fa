//! # Reconciler Types
//!
//! The reconciler context, its error type and the trait the scheduler drives.

use crate::controller::events::EventRecorder;
use crate::store::{JobLister, ReleasePayloadClient, ReleasePayloadLister, StoreError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from one reconciliation pass
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The work item is not a `namespace/name` key
    #[error("invalid resource key {0:?}: expected namespace/name")]
    InvalidKey(String),
    /// No release creation job has been assigned to the payload yet
    #[error("release creation job coordinates not set for ReleasePayload {key}")]
    CoordinatesNotSet { key: String },
    /// The payload changed between the live read and the status write
    #[error("ReleasePayload {key} was modified concurrently")]
    Conflict { key: String },
    /// Cached coordinates disagree with the live object
    #[error("cached ReleasePayload {key} is stale: job coordinates changed")]
    StaleCache { key: String },
    /// The reconcile pass panicked
    #[error("reconcile of {key} panicked: {message}")]
    Panicked { key: String, message: String },
    /// Transport or API failure
    #[error("failed to access ReleasePayload {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcilerError {
    /// Label used for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::InvalidKey(_) => "invalid_key",
            ReconcilerError::CoordinatesNotSet { .. } => "not_ready",
            ReconcilerError::Conflict { .. } => "conflict",
            ReconcilerError::StaleCache { .. } => "stale_cache",
            ReconcilerError::Panicked { .. } => "panic",
            ReconcilerError::Store { .. } => "store",
        }
    }

    /// Whether the key should be requeued with backoff
    ///
    /// A malformed key can never succeed; everything else, including missing
    /// coordinates, is retried until it converges.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcilerError::InvalidKey(_))
    }

    /// The payload is waiting for job coordinates to be assigned
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ReconcilerError::CoordinatesNotSet { .. })
    }
}

/// One reconciliation pass for a queue key
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self, key: &str) -> Result<(), ReconcilerError>;
}

/// Reconciler context
///
/// Holds read-only caches, the live client and the event sink. It owns no
/// state of its own, so a single instance is shared by every worker.
pub struct Reconciler {
    pub(crate) payloads: Arc<dyn ReleasePayloadLister>,
    pub(crate) payload_client: Arc<dyn ReleasePayloadClient>,
    pub(crate) jobs: Arc<dyn JobLister>,
    pub(crate) job_namespace: String,
    pub(crate) recorder: Arc<dyn EventRecorder>,
}

impl Reconciler {
    pub fn new(
        payloads: Arc<dyn ReleasePayloadLister>,
        payload_client: Arc<dyn ReleasePayloadClient>,
        jobs: Arc<dyn JobLister>,
        job_namespace: impl Into<String>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            payloads,
            payload_client,
            jobs,
            job_namespace: job_namespace.into(),
            recorder,
        }
    }

    /// Namespace Jobs are looked up in
    pub fn job_namespace(&self) -> &str {
        &self.job_namespace
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("job_namespace", &self.job_namespace)
            .finish_non_exhaustive()
    }
}
