//! kube-lb-sync
//!
//! Keeps a load balancer configuration file in sync with the services of a
//! Kubernetes cluster and tells the proxy to reload when it changes.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                            KUBE-LB-SYNC                              │
//!   │                                                                      │
//!   │  ┌─────────────┐  SourceEvent  ┌────────────┐  snapshot  ┌─────────┐ │
//!   │  │   cluster   │──────────────▶│ controller │───────────▶│ applier │ │
//!   │  │ list+watch  │  (one queue)  │ + registry │  (watch)   │         │ │
//!   │  └─────────────┘               └────────────┘            └────┬────┘ │
//!   │                                                               │      │
//!   │        ┌──────────────┬───────────────┬───────────────────────┘      │
//!   │        ▼              ▼               ▼                              │
//!   │  ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐       │
//!   │  │  sanity  │──▶│  render  │──▶│ atomic write │──▶│ notifier │───────┼──▶ proxy
//!   │  │   gate   │   │ template │   │ (if changed) │   │ + retry  │       │    reload
//!   │  └──────────┘   └──────────┘   └──────────────┘   └──────────┘       │
//!   │                                                                      │
//!   │  Cross-cutting: config, lifecycle, observability, resilience, admin  │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use kube_lb_sync::config::{self, CliArgs};
use kube_lb_sync::lifecycle::{self, Shutdown};
use kube_lb_sync::observability::{init_logging, init_metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config = match config::resolve(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", false);
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    init_logging(&config.observability.log_level, config.observability.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kube-lb-sync starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let ctx = match lifecycle::build_context(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    if let Err(e) = lifecycle::run(ctx, Shutdown::new()).await {
        tracing::error!(error = %e, "Synchronizer failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
