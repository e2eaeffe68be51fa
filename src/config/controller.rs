//! # Reconciliation Configuration
//!
//! Namespaces, worker count and retry tuning.

use super::env_var_or_default;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the release creation Jobs run in
    pub job_namespace: String,
    /// Namespace to watch ReleasePayloads in; `None` watches all namespaces
    pub release_namespace: Option<String>,
    /// Number of parallel reconciliation workers
    pub workers: usize,
    /// First retry delay for a failing key (milliseconds)
    pub backoff_base_ms: u64,
    /// Retry delay ceiling for a failing key (seconds)
    pub backoff_max_secs: u64,
    /// Overall requeue rate across all keys
    pub queue_qps: u32,
    /// Overall requeue burst across all keys
    pub queue_burst: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            job_namespace: DEFAULT_JOB_NAMESPACE.to_string(),
            release_namespace: None,
            workers: DEFAULT_WORKERS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            queue_qps: DEFAULT_QUEUE_QPS,
            queue_burst: DEFAULT_QUEUE_BURST,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            job_namespace: env_var_or_default("JOB_NAMESPACE", DEFAULT_JOB_NAMESPACE.to_string()),
            release_namespace: std::env::var("RELEASE_NAMESPACE")
                .ok()
                .filter(|ns| !ns.is_empty()),
            workers: env_var_or_default("WORKERS", DEFAULT_WORKERS).max(1),
            backoff_base_ms: env_var_or_default("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            queue_qps: env_var_or_default("QUEUE_QPS", DEFAULT_QUEUE_QPS),
            queue_burst: env_var_or_default("QUEUE_BURST", DEFAULT_QUEUE_BURST),
        }
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}
