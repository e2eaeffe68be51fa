//! # Work Queue
//!
//! Generic rate-limited delay queue keyed by item identity, independent of any
//! watch library.
//!
//! ## Sub-modules
//!
//! - `backoff` - Rate limiters (per-item exponential backoff, token bucket)
//! - `queue` - Deduplicating FIFO with delayed adds and in-flight tracking

pub mod backoff;
pub mod queue;

pub use backoff::{
    default_controller_rate_limiter, ItemExponentialBackoff, MaxOfRateLimiter, RateLimiter,
    TokenBucket,
};
pub use queue::WorkQueue;
