//! Single-flight applier.
//!
//! The controller publishes the newest snapshot into a `watch` channel. The
//! applier task reconciles whatever value is current when it becomes free, so
//! snapshots published during a slow write or reload collapse into one pass.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::controller::reconciler::Reconciler;
use crate::controller::status::StatusBoard;
use crate::registry::RegistrySnapshot;

/// Sending side held by the controller and the template watcher.
#[derive(Clone)]
pub struct ApplyHandle {
    tx: Arc<watch::Sender<Option<RegistrySnapshot>>>,
}

impl ApplyHandle {
    pub fn channel() -> (Self, watch::Receiver<Option<RegistrySnapshot>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Replace any pending snapshot with `snapshot`.
    pub fn request(&self, snapshot: RegistrySnapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    /// Reconcile the current snapshot again, e.g. after a template reload.
    pub fn rerun(&self) {
        self.tx.send_modify(|_| {});
    }
}

/// Run reconciles until shutdown. At most one is in flight at any time.
pub async fn run_applier(
    mut reconciler: Reconciler,
    mut requests: watch::Receiver<Option<RegistrySnapshot>>,
    status: Arc<StatusBoard>,
    mut shutdown: broadcast::Receiver<()>,
) {
    status.seed_hash(reconciler.last_applied().map(str::to_string));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("Applier received shutdown signal");
                return;
            }
            changed = requests.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let Some(snapshot) = requests.borrow_and_update().clone() else {
            continue;
        };

        let result = reconciler.reconcile(&snapshot).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Reconcile failed, will retry on the next change");
        }
        status.record(&result);
    }
}
