//! # Queue Metrics
//!
//! Depth and add counters per work queue.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{IntCounterVec, IntGaugeVec};
use std::sync::LazyLock;

static QUEUE_DEPTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "release_creation_status_workqueue_depth",
            "Current number of items ready for processing",
        ),
        &["name"],
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static QUEUE_ADDS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "release_creation_status_workqueue_adds_total",
            "Total number of items accepted by the work queue",
        ),
        &["name"],
    )
    .expect("Failed to create QUEUE_ADDS_TOTAL metric - this should never happen")
});

/// Register queue metrics with the registry
pub(crate) fn register_queue_metrics() -> Result<()> {
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(QUEUE_ADDS_TOTAL.clone()))?;
    Ok(())
}

pub fn set_queue_depth(name: &str, depth: usize) {
    QUEUE_DEPTH
        .with_label_values(&[name])
        .set(i64::try_from(depth).unwrap_or(i64::MAX));
}

pub fn increment_queue_adds(name: &str) {
    QUEUE_ADDS_TOTAL.with_label_values(&[name]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_queue_depth() {
        set_queue_depth("depth-test", 3);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["depth-test"]).get(), 3);
        set_queue_depth("depth-test", 0);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["depth-test"]).get(), 0);
    }

    #[test]
    fn test_increment_queue_adds() {
        let before = QUEUE_ADDS_TOTAL.with_label_values(&["adds-test"]).get();
        increment_queue_adds("adds-test");
        assert_eq!(
            QUEUE_ADDS_TOTAL.with_label_values(&["adds-test"]).get(),
            before + 1
        );
    }
}
