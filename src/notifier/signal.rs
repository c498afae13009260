//! Reload by sending a signal to the proxy process.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessesToUpdate, System};

use crate::notifier::{Notifier, NotifyError};

/// Process to signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalTarget {
    /// Every running process with this exact name.
    ProcessName(String),
    /// The pid stored in this file.
    PidFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalNotifier {
    signal: Signal,
    target: SignalTarget,
}

impl SignalNotifier {
    /// Parse `<SIGNAL>:<target>`. The signal may omit the `SIG` prefix.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (name, target) = spec
            .split_once(':')
            .ok_or_else(|| "expected <SIGNAL>:<process name or pid file>".to_string())?;

        let name = name.trim().to_ascii_uppercase();
        let name = if name.starts_with("SIG") { name } else { format!("SIG{name}") };
        let signal = Signal::from_str(&name).map_err(|_| format!("unknown signal {name}"))?;

        let target = target.trim();
        if target.is_empty() {
            return Err("missing signal target".to_string());
        }
        let target = if target.starts_with('/') {
            SignalTarget::PidFile(PathBuf::from(target))
        } else {
            SignalTarget::ProcessName(target.to_string())
        };

        Ok(Self { signal, target })
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn target(&self) -> &SignalTarget {
        &self.target
    }
}

fn pids_for(target: &SignalTarget) -> Result<Vec<i32>, NotifyError> {
    match target {
        SignalTarget::PidFile(path) => {
            let pid_file_err = |reason: String| NotifyError::PidFile {
                path: path.display().to_string(),
                reason,
            };
            let content = std::fs::read_to_string(path).map_err(|e| pid_file_err(e.to_string()))?;
            let pid = content
                .trim()
                .parse::<i32>()
                .map_err(|e| pid_file_err(format!("invalid pid {:?}: {e}", content.trim())))?;
            // kill(2) treats 0 and negative values as process groups.
            if pid <= 0 {
                return Err(pid_file_err("pid must be positive".to_string()));
            }
            Ok(vec![pid])
        }
        SignalTarget::ProcessName(name) => {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::All, true);
            let pids: Vec<i32> = system
                .processes_by_exact_name(OsStr::new(name))
                .filter_map(|p| i32::try_from(p.pid().as_u32()).ok())
                .collect();
            if pids.is_empty() {
                return Err(NotifyError::ProcessNotFound(name.clone()));
            }
            Ok(pids)
        }
    }
}

#[async_trait]
impl Notifier for SignalNotifier {
    fn describe(&self) -> String {
        match &self.target {
            SignalTarget::ProcessName(name) => format!("signal {} to process {name}", self.signal),
            SignalTarget::PidFile(path) => format!("signal {} to pid in {}", self.signal, path.display()),
        }
    }

    async fn notify(&self) -> Result<(), NotifyError> {
        let target = self.target.clone();
        let pids = tokio::task::spawn_blocking(move || pids_for(&target))
            .await
            .map_err(|e| NotifyError::Task(e.to_string()))??;

        for pid in pids {
            kill(Pid::from_raw(pid), self.signal).map_err(|source| NotifyError::Signal { pid, source })?;
            tracing::info!(pid, signal = %self.signal, "Sent reload signal");
        }
        Ok(())
    }
}
