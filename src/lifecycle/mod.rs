//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve config → Check preconditions → Build SyncContext
//!
//! Run (runner.rs):
//!     Connect source → spawn applier, controller, watchers, refreshers → wait
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → watchers, controller, applier and
//!     background refreshers stop → Exit 0
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and exits nonzero
//! - Nothing is global; every component receives what it needs from SyncContext
//! - The cluster connection is checked before any watch begins

pub mod runner;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use runner::{run, RunError};
pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{build_context, check_preconditions, StartupError, SyncContext};
