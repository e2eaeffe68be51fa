//! # Controller
//!
//! Job status mapping, event recording, the reconciler and the probe server.

pub mod events;
pub mod job_status;
pub mod reconciler;
pub mod server;
