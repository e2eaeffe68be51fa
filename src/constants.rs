//! # Constants
//!
//! Default values shared by configuration, the work queue and the reconciler.

/// Name used for the field manager, the event reporter and the queue metrics
pub const CONTROLLER_NAME: &str = "release-creation-status-controller";

/// Namespace the release creation Jobs run in
pub const DEFAULT_JOB_NAMESPACE: &str = "ci-release";

/// Number of parallel reconciliation workers
pub const DEFAULT_WORKERS: usize = 2;

/// Per-item exponential backoff base delay (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Per-item exponential backoff ceiling (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// Overall token bucket refill rate (tokens per second)
pub const DEFAULT_QUEUE_QPS: u32 = 10;

/// Overall token bucket size
pub const DEFAULT_QUEUE_BURST: u32 = 100;

/// HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind before giving up
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server to bind
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "release_creation_status_controller=info";
