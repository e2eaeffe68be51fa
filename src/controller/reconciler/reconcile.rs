//! # Reconciliation Logic
//!
//! One pass for a ReleasePayload key: read both caches, map the Job onto a
//! result and write it only when it differs.

use crate::controller::events::StatusEvent;
use crate::controller::job_status::JobObservation;
use crate::controller::reconciler::status::{
    needs_update, update_release_creation_job_result, StatusUpdate,
};
use crate::controller::reconciler::types::{Reconcile, Reconciler, ReconcilerError};
use crate::observability;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Split a `namespace/name` queue key
pub fn split_key(key: &str) -> Result<(&str, &str), ReconcilerError> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace, name))
        }
        _ => Err(ReconcilerError::InvalidKey(key.to_string())),
    }
}

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(&self, key: &str) -> Result<(), ReconcilerError> {
        let span = tracing::span!(
            tracing::Level::INFO,
            "reconcile",
            resource.key = key,
            resource.kind = "ReleasePayload"
        );

        let start = Instant::now();
        observability::metrics::increment_reconciliations();
        let result = reconcile_internal(self, key).instrument(span).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result
    }
}

async fn reconcile_internal(reconciler: &Reconciler, key: &str) -> Result<(), ReconcilerError> {
    let (namespace, name) = split_key(key)?;

    let Some(payload) = reconciler.payloads.get(namespace, name) else {
        // Deleted; nothing left to converge
        debug!("ReleasePayload {} not found in cache, skipping", key);
        return Ok(());
    };

    let coordinates = payload.job_coordinates();
    if coordinates.is_empty() {
        return Err(ReconcilerError::CoordinatesNotSet {
            key: key.to_string(),
        });
    }

    // Jobs are always looked up in the configured namespace; the coordinates
    // only contribute the name.
    let job = reconciler
        .jobs
        .get(&reconciler.job_namespace, &coordinates.name);
    let observation = JobObservation::observe(job.as_deref());
    let status = observation.status();
    let message = observation.message();

    if !needs_update(payload.job_result(), status, &message) {
        debug!(
            "Skipping status update for {} - already {} ({})",
            key, status, message
        );
        return Ok(());
    }

    info!(
        "🔄 Updating release creation job result for {}: job={}/{}, status={}, message={:?}",
        key, reconciler.job_namespace, coordinates.name, status, message
    );

    match update_release_creation_job_result(
        reconciler,
        key,
        namespace,
        name,
        &coordinates,
        status,
        &message,
    )
    .await?
    {
        StatusUpdate::Updated(updated) => {
            info!("✅ ReleasePayload {} release creation job status is now {}", key, status);
            observability::metrics::increment_status_updates(status.as_str());
            reconciler
                .recorder
                .record(&updated, StatusEvent::for_transition(status, &message))
                .await;
        }
        StatusUpdate::Unchanged | StatusUpdate::Deleted => {}
    }

    Ok(())
}
