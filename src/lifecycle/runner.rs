//! Wires the running tasks together and waits for shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cluster::{KubeSource, SourceError};
use crate::controller::{run_applier, ApplyHandle, Controller, Reconciler, StatusBoard};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::lifecycle::startup::SyncContext;
use crate::render::watcher::TemplateWatcher;

/// Bound of the cluster event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to watch template: {0}")]
    TemplateWatch(#[from] notify::Error),

    #[error("invalid admin address {0:?}")]
    AdminAddress(String),
}

/// Run until SIGINT/SIGTERM or until the controller stops.
pub async fn run(ctx: SyncContext, shutdown: Shutdown) -> Result<(), RunError> {
    let SyncContext {
        config,
        client,
        notifier,
        gate,
        addresses,
        template,
    } = ctx;

    let status = Arc::new(StatusBoard::new());
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if config.admin.enabled {
        let addr: SocketAddr = config
            .admin
            .bind_address
            .parse()
            .map_err(|_| RunError::AdminAddress(config.admin.bind_address.clone()))?;
        let admin_status = status.clone();
        let admin_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = crate::admin::run_admin(addr, admin_status, admin_shutdown).await {
                tracing::error!(error = %e, "Status endpoint failed");
            }
        }));
    }

    let source = KubeSource::connect(client, config.watch).await?;

    let lb = &config.sanity.lb_address;
    if lb.check_local_bind {
        let interval = Duration::from_secs(lb.refresh_secs.max(1));
        tasks.push(tokio::spawn(addresses.clone().run_refresher(interval, shutdown.subscribe())));
    }

    let (apply, requests) = ApplyHandle::channel();
    let reconciler = Reconciler::new(
        gate,
        template.clone(),
        notifier,
        config.output.config_path.clone(),
        config.cluster.domain.clone(),
    )
    .with_retry(config.notifier.retry)
    .seed_from_output();
    tasks.push(tokio::spawn(run_applier(
        reconciler,
        requests,
        status.clone(),
        shutdown.subscribe(),
    )));

    // Dropping the watcher stops it, so it lives until run() returns.
    let _template_watcher = if config.output.watch_template {
        let apply = apply.clone();
        Some(TemplateWatcher::new(&config.output.template_path, template).run(move || apply.rerun())?)
    } else {
        None
    };

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let controller = Controller::new(
        Duration::from_millis(config.reconcile.debounce_ms),
        apply,
        status,
    );
    let mut controller_task = tokio::spawn(controller.run(events_rx, shutdown.subscribe()));
    tasks.extend(source.spawn(events_tx, &shutdown));

    tracing::info!(
        output = %config.output.config_path.display(),
        template = %config.output.template_path.display(),
        domain = %config.cluster.domain,
        "Synchronizer running"
    );

    let controller_done = tokio::select! {
        signal = wait_for_signal() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to install signal handlers");
            }
            false
        }
        _ = &mut controller_task => {
            tracing::warn!("Controller stopped unexpectedly");
            true
        }
    };

    shutdown.trigger();
    if !controller_done {
        tasks.push(controller_task);
    }
    drain(tasks).await;
    Ok(())
}

async fn drain(tasks: Vec<JoinHandle<()>>) {
    let all = futures_util::future::join_all(tasks);
    if tokio::time::timeout(DRAIN_TIMEOUT, all).await.is_err() {
        tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Tasks did not stop in time");
    }
}
