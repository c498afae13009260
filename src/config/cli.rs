//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

/// Keep a load balancer configuration in sync with cluster services.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "kube-lb-sync", version)]
#[command(about = "Render load balancer configuration from Kubernetes services", long_about = None)]
pub struct CliArgs {
    /// Kubernetes API server URL
    #[arg(long)]
    pub apiserver: Option<String>,

    /// Path to kubernetes client configuration
    #[arg(long)]
    pub kubecfg: Option<PathBuf>,

    /// DNS domain for the cluster
    #[arg(long)]
    pub domain: Option<String>,

    /// Configuration path to generate
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Configuration source template
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Reload notifier, e.g. signal:HUP:haproxy or command:/usr/local/bin/reload
    #[arg(long)]
    pub notify: Option<String>,

    /// Settings file (TOML) with the remaining options
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "kube-lb-sync",
            "--domain",
            "cluster.example",
            "--config",
            "/etc/haproxy/haproxy.cfg",
            "--template",
            "/etc/haproxy/haproxy.cfg.tmpl",
            "--notify",
            "signal:HUP:haproxy",
        ])
        .unwrap();

        assert_eq!(args.domain.as_deref(), Some("cluster.example"));
        assert_eq!(args.config, Some(PathBuf::from("/etc/haproxy/haproxy.cfg")));
        assert_eq!(args.notify.as_deref(), Some("signal:HUP:haproxy"));
        assert!(args.apiserver.is_none());
        assert!(args.settings.is_none());
    }
}
