//! Startup orchestration.
//!
//! # Responsibilities
//! - Enforce the fatal preconditions before anything touches the cluster
//! - Build every shared component exactly once into a `SyncContext`
//! - Create the cluster client from kubeconfig, in-cluster env or an API URL
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Preconditions run in a fixed order so the first reported problem is stable

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use thiserror::Error;

use crate::config::schema::{ClusterConfig, EphemeralPortsConfig, SyncConfig};
use crate::notifier::{self, Notifier, NotifyError};
use crate::render::{ConfigTemplate, RenderError, SharedTemplate};
use crate::sanity::ephemeral_ports::PROCFS_PORT_RANGE;
use crate::sanity::{
    EphemeralPortsRange, InterfaceAddressCache, LoadBalancerAddress, SanityGate, SystemInterfaces,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("template {0} does not exist")]
    TemplateMissing(PathBuf),

    #[error("notifier specification is empty")]
    EmptyNotifier,

    #[error("cannot open output {path} for writing: {source}")]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Notifier(#[from] NotifyError),

    #[error(transparent)]
    Template(#[from] RenderError),

    #[error("failed to read ephemeral port range from {path}: {source}")]
    PortRange {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("invalid API server URL {url:?}: {reason}")]
    ApiServer { url: String, reason: String },

    #[error("failed to create cluster client: {0}")]
    Client(#[from] kube::Error),
}

/// Everything the running synchronizer shares, built once at startup.
pub struct SyncContext {
    pub config: SyncConfig,
    pub client: Client,
    pub notifier: Arc<dyn Notifier>,
    pub gate: Arc<SanityGate>,
    pub addresses: Arc<InterfaceAddressCache>,
    pub template: SharedTemplate,
}

/// Fatal preconditions, checked in order: template, notifier, output.
pub fn check_preconditions(config: &SyncConfig) -> Result<(), StartupError> {
    let template = &config.output.template_path;
    if !template.exists() {
        return Err(StartupError::TemplateMissing(template.clone()));
    }

    if config.notifier.spec.trim().is_empty() {
        return Err(StartupError::EmptyNotifier);
    }

    check_output_writable(&config.output.config_path)
}

/// Open for create+write without truncating; a probe file is removed again.
fn check_output_writable(path: &Path) -> Result<(), StartupError> {
    let existed = path.exists();
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|source| StartupError::OutputNotWritable {
            path: path.to_path_buf(),
            source,
        })?;
    if !existed {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove output probe file");
        }
    }
    Ok(())
}

/// The configured range, or the kernel's when `from_procfs` is set.
pub fn ephemeral_range(config: &EphemeralPortsConfig, procfs: &Path) -> Result<EphemeralPortsRange, StartupError> {
    if !config.enabled {
        return Ok(EphemeralPortsRange::disabled());
    }
    if !config.from_procfs {
        return Ok(config.range());
    }
    let range = EphemeralPortsRange::from_procfs(procfs).map_err(|source| StartupError::PortRange {
        path: procfs.to_path_buf(),
        source,
    })?;
    tracing::info!(low = range.low, high = range.high, "Using kernel ephemeral port range");
    Ok(range)
}

/// Assemble the validator chain in evaluation order.
pub fn sanity_gate(range: EphemeralPortsRange, check_local_bind: bool, addresses: Arc<InterfaceAddressCache>) -> SanityGate {
    SanityGate::new()
        .with(range)
        .with(LoadBalancerAddress::new(check_local_bind, addresses))
}

/// Create the cluster client.
pub async fn connect_client(cluster: &ClusterConfig) -> Result<Client, StartupError> {
    let mut config = match (&cluster.kubeconfig, &cluster.api_server) {
        (Some(path), _) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| StartupError::Kubeconfig(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| StartupError::Kubeconfig(e.to_string()))?
        }
        (None, Some(url)) => Config::new(parse_url(url)?),
        (None, None) => Config::infer()
            .await
            .map_err(|e| StartupError::Kubeconfig(e.to_string()))?,
    };

    if let Some(url) = &cluster.api_server {
        config.cluster_url = parse_url(url)?;
    }
    config.connect_timeout = Some(CONNECT_TIMEOUT);

    tracing::info!(url = %config.cluster_url, "Using cluster API server");
    Ok(Client::try_from(config)?)
}

fn parse_url<T: std::str::FromStr>(url: &str) -> Result<T, StartupError>
where
    T::Err: std::fmt::Display,
{
    url.parse().map_err(|e: T::Err| StartupError::ApiServer {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Check preconditions and build the shared context.
pub async fn build_context(config: SyncConfig) -> Result<SyncContext, StartupError> {
    check_preconditions(&config)?;

    let notifier = notifier::from_spec(&config.notifier.spec)?;
    tracing::info!(notifier = %notifier.describe(), "Notifier selected");

    let template = ConfigTemplate::load(&config.output.template_path)?.into_shared();

    let range = ephemeral_range(&config.sanity.ephemeral_ports, Path::new(PROCFS_PORT_RANGE))?;
    let lb = &config.sanity.lb_address;
    let addresses = Arc::new(InterfaceAddressCache::new(
        SystemInterfaces,
        Duration::from_secs(lb.refresh_secs.max(1)),
    ));
    let gate = Arc::new(sanity_gate(range, lb.check_local_bind, addresses.clone()));
    tracing::info!(checks = ?gate.check_names(), "Sanity checks registered");

    let client = connect_client(&config.cluster).await?;

    Ok(SyncContext {
        config,
        client,
        notifier,
        gate,
        addresses,
        template,
    })
}
