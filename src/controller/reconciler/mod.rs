//! # Reconciler
//!
//! Converges `status.releaseCreationJobResult` of a ReleasePayload onto the
//! observed state of its release creation Job.

pub mod reconcile;
pub mod status;
pub mod types;

pub use reconcile::split_key;
pub use status::{needs_update, update_release_creation_job_result, StatusUpdate};
pub use types::{Reconcile, Reconciler, ReconcilerError};
