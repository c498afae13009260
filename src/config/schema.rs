//! Configuration schema definitions.
//!
//! This module defines the complete startup configuration of the synchronizer.
//! All types derive Serde traits for deserialization from the settings file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resilience::backoff::BackoffConfig;
use crate::resilience::retries::RetryPolicy;
use crate::sanity::EphemeralPortsRange;

/// Root configuration for the synchronizer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Cluster API access and DNS naming.
    pub cluster: ClusterConfig,

    /// Template input and rendered output.
    pub output: OutputConfig,

    /// Reload trigger.
    pub notifier: NotifierConfig,

    /// Sanity validators.
    pub sanity: SanityConfig,

    /// Reconcile pacing.
    pub reconcile: ReconcileConfig,

    /// Watch reconnect backoff.
    pub watch: BackoffConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Cluster API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// API server URL; overrides the kubeconfig cluster address.
    pub api_server: Option<String>,

    /// Path to a kubeconfig file. In-cluster or default discovery when unset.
    pub kubeconfig: Option<PathBuf>,

    /// Cluster DNS domain suffix.
    pub domain: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: None,
            kubeconfig: None,
            domain: "local".to_string(),
        }
    }
}

/// Template and output file paths.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination of the rendered load balancer configuration.
    pub config_path: PathBuf,

    /// Template rendered on every reconcile.
    pub template_path: PathBuf,

    /// Reload the template when the file changes.
    pub watch_template: bool,
}

/// Notifier specification and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NotifierConfig {
    /// e.g. `signal:HUP:haproxy`, `command:/usr/local/bin/reload`, `http:POST:http://...`
    pub spec: String,

    pub retry: RetryPolicy,
}

/// Sanity validator settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SanityConfig {
    pub ephemeral_ports: EphemeralPortsConfig,
    pub lb_address: LbAddressConfig,
}

/// Ephemeral port band settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EphemeralPortsConfig {
    pub enabled: bool,
    pub low: u16,
    pub high: u16,

    /// Read `low`/`high` from the kernel at startup instead.
    pub from_procfs: bool,
}

impl Default for EphemeralPortsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            low: 32768,
            high: 60999,
            from_procfs: false,
        }
    }
}

impl EphemeralPortsConfig {
    /// The statically configured range.
    pub fn range(&self) -> EphemeralPortsRange {
        if self.enabled {
            EphemeralPortsRange::new(self.low, self.high)
        } else {
            EphemeralPortsRange::disabled()
        }
    }
}

/// Load balancer bind address settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LbAddressConfig {
    /// Require requested addresses to exist on a local interface.
    pub check_local_bind: bool,

    /// Interface address cache lifetime in seconds.
    pub refresh_secs: u64,
}

impl Default for LbAddressConfig {
    fn default() -> Self {
        Self {
            check_local_bind: false,
            refresh_secs: 30,
        }
    }
}

/// Reconcile pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Quiet window after the first change before a reconcile runs.
    pub debounce_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit JSON log lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Status endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve `/healthz` and `/status`.
    pub enabled: bool,

    /// Status server bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
