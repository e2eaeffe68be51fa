//! # Error Policy
//!
//! Decides what happens to a key after a failed reconciliation.
//!
//! Retryable errors go back on the queue through the rate limiter, so a single
//! failing payload backs off exponentially while the token bucket caps the
//! overall retry rate. Keys that can never succeed are forgotten.

use crate::controller::reconciler::ReconcilerError;
use crate::observability;
use crate::workqueue::WorkQueue;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of [`handle_reconciliation_error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Queued again after the given delay
    Requeue(Duration),
    /// Dropped from the queue and the rate limiter
    Drop,
}

/// Apply the retry policy to a failed key
///
/// The caller still owns the key and must call [`WorkQueue::done`] afterwards.
pub fn handle_reconciliation_error(
    key: &str,
    error: &ReconcilerError,
    queue: &WorkQueue<String>,
) -> ErrorAction {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.key = key,
        reason = error.reason(),
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(error.reason());

    if !error.is_retryable() {
        error!("Dropping {:?}: {}", key, error);
        queue.forget(&key.to_string());
        return ErrorAction::Drop;
    }

    if error.is_not_ready() {
        warn!("ReleasePayload {} is not ready: {}", key, error);
    } else {
        error!("Reconciliation error for {}: {}", key, error);
    }

    let retries = queue.num_requeues(&key.to_string());
    let delay = queue.add_rate_limited(key.to_string());
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "Retrying {} in {:?} (previous retries: {}, next attempt at {})",
        key,
        delay,
        retries,
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues_total(error.reason());
    ErrorAction::Requeue(delay)
}
