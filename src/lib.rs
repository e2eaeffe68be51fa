//! Release Creation Status Controller Library
//!
//! Keeps `status.releaseCreationJobResult` of every `ReleasePayload` in step with
//! the batch Job that builds the release.
//! Tests are included in the module files and under `tests/`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;
pub mod workqueue;

// Re-export CRD types for convenience
pub use crd::*;
