//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliations, status updates and requeues
//! - `queue_metrics` - Work queue depth and adds

pub mod controller_metrics;
pub mod queue_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use queue_metrics::*;
pub use registry::*;
