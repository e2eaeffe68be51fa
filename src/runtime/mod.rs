//! # Runtime Module
//!
//! Runtime components: initialization, watch loop, scheduler and error
//! handling.

pub mod error_policy;
pub mod initialization;
pub mod scheduler;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use scheduler::*;
pub use watch_loop::*;
