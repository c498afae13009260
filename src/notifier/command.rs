//! Reload by running an external command.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::notifier::{Notifier, NotifyError};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs a shell command line; a nonzero exit status is a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNotifier {
    command: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let command = spec.trim();
        if command.is_empty() {
            return Err("missing command".to_string());
        }
        Ok(Self {
            command: command.to_string(),
            timeout: COMMAND_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    fn describe(&self) -> String {
        format!("command {:?}", self.command)
    }

    async fn notify(&self) -> Result<(), NotifyError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .kill_on_drop(true)
            .spawn()
            .map_err(NotifyError::Spawn)?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(NotifyError::Spawn)?,
            Err(_) => return Err(NotifyError::Timeout(self.timeout.as_secs())),
        };

        if status.success() {
            tracing::info!(command = %self.command, "Reload command succeeded");
            Ok(())
        } else {
            Err(NotifyError::CommandFailed(status.to_string()))
        }
    }
}
