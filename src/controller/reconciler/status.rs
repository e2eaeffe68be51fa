//! # Status Management
//!
//! Writes the release creation job result to the live ReleasePayload.

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{
    ReleaseCreationJobCoordinates, ReleaseCreationJobResult, ReleaseCreationJobStatus,
    ReleasePayload,
};
use tracing::debug;

/// Result of a status write attempt
#[derive(Debug)]
pub enum StatusUpdate {
    /// The new result was persisted
    Updated(ReleasePayload),
    /// The live object already carries the desired result
    Unchanged,
    /// The payload no longer exists
    Deleted,
}

/// Whether `current` differs from the desired status and message
///
/// A missing result, or one without a status, always needs a write.
pub fn needs_update(
    current: Option<&ReleaseCreationJobResult>,
    status: ReleaseCreationJobStatus,
    message: &str,
) -> bool {
    match current {
        Some(result) => result.status != Some(status) || result.message != message,
        None => true,
    }
}

/// Read-modify-write of `status.releaseCreationJobResult`
///
/// Reads the live object rather than the cache, so the write is based on the
/// latest resource version. The coordinates are left untouched; if they no
/// longer match what the decision was based on the pass fails with
/// [`ReconcilerError::StaleCache`].
pub async fn update_release_creation_job_result(
    reconciler: &Reconciler,
    key: &str,
    namespace: &str,
    name: &str,
    coordinates: &ReleaseCreationJobCoordinates,
    status: ReleaseCreationJobStatus,
    message: &str,
) -> Result<StatusUpdate, ReconcilerError> {
    let mut live = match reconciler.payload_client.get(namespace, name).await {
        Ok(payload) => payload,
        Err(e) if e.is_not_found() => {
            debug!(
                "ReleasePayload {} was deleted during reconciliation, skipping status update",
                key
            );
            return Ok(StatusUpdate::Deleted);
        }
        Err(source) => {
            return Err(ReconcilerError::Store {
                key: key.to_string(),
                source,
            })
        }
    };

    if live.job_coordinates() != *coordinates {
        return Err(ReconcilerError::StaleCache {
            key: key.to_string(),
        });
    }

    // CRITICAL: Check if status actually changed before updating
    // The cache may lag behind a write made by an earlier pass
    if !needs_update(live.job_result(), status, message) {
        debug!(
            "Skipping status update for {} - live status already {} ({})",
            key, status, message
        );
        return Ok(StatusUpdate::Unchanged);
    }

    let result = &mut live
        .status
        .get_or_insert_with(Default::default)
        .release_creation_job_result;
    result.status = Some(status);
    result.message = message.to_string();

    match reconciler.payload_client.update_status(&live).await {
        Ok(updated) => Ok(StatusUpdate::Updated(updated)),
        Err(e) if e.is_not_found() => {
            debug!(
                "ReleasePayload {} was deleted during reconciliation, skipping status update",
                key
            );
            Ok(StatusUpdate::Deleted)
        }
        Err(e) if e.is_conflict() => Err(ReconcilerError::Conflict {
            key: key.to_string(),
        }),
        Err(source) => Err(ReconcilerError::Store {
            key: key.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Option<ReleaseCreationJobStatus>, message: &str) -> ReleaseCreationJobResult {
        ReleaseCreationJobResult {
            coordinates: ReleaseCreationJobCoordinates::default(),
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_missing_result_needs_update() {
        assert!(needs_update(None, ReleaseCreationJobStatus::Unknown, "m"));
    }

    #[test]
    fn test_empty_status_needs_update_even_for_matching_message() {
        let current = result(None, "m");
        assert!(needs_update(Some(&current), ReleaseCreationJobStatus::Success, "m"));
    }

    #[test]
    fn test_message_change_needs_update() {
        let current = result(Some(ReleaseCreationJobStatus::Unknown), "");
        assert!(needs_update(Some(&current), ReleaseCreationJobStatus::Unknown, "m"));
    }

    #[test]
    fn test_identical_result_needs_no_update() {
        let current = result(Some(ReleaseCreationJobStatus::Failed), "r: m");
        assert!(!needs_update(Some(&current), ReleaseCreationJobStatus::Failed, "r: m"));
    }
}
