//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Watch lost:
//!     → backoff.rs (unbounded attempts, capped exponential delay + jitter)
//!     → new watcher, full relist
//!
//! Reload trigger failed:
//!     → retries.rs (bounded attempts, same backoff curve)
//!     → give up, keep the written configuration
//! ```
//!
//! # Design Decisions
//! - One backoff curve shared by reconnects and notifier retries
//! - Jittered backoff prevents reconnect storms against the API server

pub mod backoff;
pub mod retries;
