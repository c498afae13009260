//! Reload notification subsystem.
//!
//! # Data Flow
//! ```text
//! notifier spec string (startup)
//!     → from_spec() → one Notifier strategy
//!         - signal:<SIGNAL>:<process name | /path/to/pidfile>
//!         - command:<shell command line>
//!         - http:[METHOD:]<url>
//!         - log:
//!
//! After a committed write of changed content:
//!     → notify_with_retry() (bounded attempts, jittered backoff)
//!     → success, or give up and keep the written configuration
//! ```
//!
//! # Design Decisions
//! - Exactly one strategy per process
//! - Exhausted retries never roll the configuration back

pub mod command;
pub mod http;
pub mod signal;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::resilience::retries::{retry, Exhausted, RetryPolicy};

pub use command::CommandNotifier;
pub use http::HttpNotifier;
pub use signal::SignalNotifier;

/// Errors building or invoking a notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier specification is empty")]
    EmptySpec,

    #[error("invalid notifier specification {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("no running process named {0:?}")]
    ProcessNotFound(String),

    #[error("failed to read pid file {path}: {reason}")]
    PidFile { path: String, reason: String },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to run reload command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("reload command {0}")]
    CommandFailed(String),

    #[error("reload timed out after {0} seconds")]
    Timeout(u64),

    #[error("reload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reload endpoint answered {0}")]
    HttpStatus(u16),

    #[error("notifier task failed: {0}")]
    Task(String),
}

impl NotifyError {
    fn invalid(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// Action that makes the downstream proxy reload its configuration.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    async fn notify(&self) -> Result<(), NotifyError>;
}

/// Only logs; useful for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn describe(&self) -> String {
        "log".to_string()
    }

    async fn notify(&self) -> Result<(), NotifyError> {
        tracing::info!("Configuration changed, reload requested (log notifier)");
        Ok(())
    }
}

/// Build the notifier selected by a specification string.
pub fn from_spec(spec: &str) -> Result<Arc<dyn Notifier>, NotifyError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(NotifyError::EmptySpec);
    }

    let (kind, rest) = spec.split_once(':').unwrap_or((spec, ""));
    let notifier: Arc<dyn Notifier> = match kind {
        "signal" => Arc::new(SignalNotifier::parse(rest).map_err(|r| NotifyError::invalid(spec, r))?),
        "command" => Arc::new(CommandNotifier::parse(rest).map_err(|r| NotifyError::invalid(spec, r))?),
        "http" => Arc::new(HttpNotifier::parse(rest).map_err(|r| NotifyError::invalid(spec, r))?),
        "log" | "debug" => Arc::new(LogNotifier),
        other => {
            return Err(NotifyError::invalid(
                spec,
                format!("unknown notifier kind {other:?} (expected signal, command, http or log)"),
            ))
        }
    };
    Ok(notifier)
}

/// Invoke the notifier, retrying failures according to `policy`.
/// Returns the number of attempts used.
pub async fn notify_with_retry(
    notifier: &dyn Notifier,
    policy: &RetryPolicy,
) -> Result<u32, Exhausted<NotifyError>> {
    let mut attempts = 0;
    retry(policy, "notify", || {
        attempts += 1;
        notifier.notify()
    })
    .await?;
    Ok(attempts)
}
