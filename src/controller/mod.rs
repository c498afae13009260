//! Reconcile controller.
//!
//! # Data Flow
//! ```text
//! SourceEvent queue (ordered per kind)
//!     → Controller (sole writer of ServiceRegistry)
//!         - Change      → upsert / remove
//!         - Relisted    → replace_all for that kind
//!         - Disconnected→ Resyncing until that kind relists
//!     → debounce window from the first unflushed change
//!     → ApplyHandle::request(snapshot)       (latest value wins)
//!     → applier task → Reconciler::reconcile
//!         validate_all → render → hash compare → atomic write → notify
//!     → StatusBoard (served by the admin endpoint)
//! ```
//!
//! # Design Decisions
//! - No reconcile until both kinds completed their first list
//! - Ingestion never waits on writes or reloads; the applier runs separately
//! - Nothing is queued behind a slow apply, only the newest snapshot is kept

pub mod apply;
pub mod reconciler;
pub mod status;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::cluster::{ChangeType, ResourceKind, SourceEvent, WatchEvent};
use crate::observability::metrics;
use crate::registry::ServiceRegistry;

pub use apply::{run_applier, ApplyHandle};
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler, Rejection};
pub use status::{ReconcileStatus, StatusBoard};

/// Lifecycle of the watch connection as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// Probing the cluster API.
    #[default]
    Connecting,
    /// Waiting for the first full list of every kind.
    Syncing,
    /// Incremental updates.
    Watching,
    /// A watch was lost and that kind has not relisted yet.
    Resyncing,
}

/// Event loop owning the registry.
pub struct Controller {
    registry: ServiceRegistry,
    state: ControllerState,
    relisted: HashSet<ResourceKind>,
    debounce: Duration,
    apply: ApplyHandle,
    status: Arc<StatusBoard>,
}

impl Controller {
    pub fn new(debounce: Duration, apply: ApplyHandle, status: Arc<StatusBoard>) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            state: ControllerState::Connecting,
            relisted: HashSet::new(),
            debounce,
            apply,
            status,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Consume events until the queue closes or shutdown fires.
    pub async fn run(mut self, mut events: mpsc::Receiver<SourceEvent>, mut shutdown: broadcast::Receiver<()>) {
        self.transition(ControllerState::Syncing);

        let mut dirty = false;
        let mut deadline: Option<Instant> = None;

        loop {
            let flush_at = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Controller received shutdown signal");
                    return;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("Event queue closed, controller stopping");
                        return;
                    };
                    let was_syncing = self.state == ControllerState::Syncing;
                    dirty |= self.handle(event);

                    if was_syncing && self.state != ControllerState::Syncing {
                        // Initial lists are complete: apply them as one batch.
                        self.flush();
                        dirty = false;
                        deadline = None;
                    } else if dirty && deadline.is_none() && self.reconcile_allowed() {
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
                _ = flush_at => {
                    self.flush();
                    dirty = false;
                    deadline = None;
                }
            }
        }
    }

    /// Apply one event to the registry. Returns whether the registry changed.
    pub fn handle(&mut self, event: SourceEvent) -> bool {
        match event {
            SourceEvent::Change(WatchEvent { kind, change, object }) => {
                let changed = match change {
                    ChangeType::Deleted => self.registry.remove(kind, object.id()),
                    ChangeType::Added | ChangeType::Modified => self.registry.upsert(object),
                };
                tracing::debug!(%kind, ?change, changed, "Applied cluster event");
                changed
            }
            SourceEvent::Relisted { kind, objects } => {
                tracing::info!(%kind, count = objects.len(), "Replacing registry contents from full list");
                self.registry.replace_all(kind, objects);
                self.relisted.insert(kind);
                if self.all_relisted() && self.state != ControllerState::Watching {
                    self.transition(ControllerState::Watching);
                }
                true
            }
            SourceEvent::Disconnected { kind } => {
                self.relisted.remove(&kind);
                if self.state == ControllerState::Watching {
                    self.transition(ControllerState::Resyncing);
                }
                false
            }
        }
    }

    fn all_relisted(&self) -> bool {
        ResourceKind::ALL.iter().all(|k| self.relisted.contains(k))
    }

    fn reconcile_allowed(&self) -> bool {
        matches!(self.state, ControllerState::Watching | ControllerState::Resyncing)
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            tracing::info!(from = ?self.state, to = ?next, "Controller state changed");
            self.state = next;
            self.status.set_state(next);
        }
    }

    /// Hand the current registry view to the applier.
    fn flush(&mut self) {
        let snapshot = self.registry.snapshot();
        metrics::set_known_services(snapshot.len());
        self.status.set_known_services(snapshot.len());
        tracing::debug!(services = snapshot.len(), "Requesting reconcile");
        self.apply.request(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::{
        ClusterObject, EndpointSet, ResourceVersion, Service, ServiceId, ServicePort, ServiceType,
    };

    fn service(name: &str, rv: &str) -> ClusterObject {
        ClusterObject::Service(Service {
            id: ServiceId::new("default", name),
            service_type: ServiceType::ClusterIP,
            ports: vec![ServicePort::tcp("http", 80)],
            load_balancer_ip: None,
            version: ResourceVersion::new(rv),
        })
    }

    fn relisted(kind: ResourceKind, objects: Vec<ClusterObject>) -> SourceEvent {
        SourceEvent::Relisted { kind, objects }
    }

    fn controller() -> (Controller, tokio::sync::watch::Receiver<Option<crate::registry::RegistrySnapshot>>) {
        let (apply, rx) = ApplyHandle::channel();
        let controller = Controller::new(Duration::from_millis(20), apply, Arc::new(StatusBoard::new()));
        (controller, rx)
    }

    #[test]
    fn test_state_transitions() {
        let (mut c, _rx) = controller();
        c.transition(ControllerState::Syncing);

        c.handle(relisted(ResourceKind::Service, vec![service("a", "1")]));
        assert_eq!(c.state(), ControllerState::Syncing);
        c.handle(relisted(ResourceKind::Endpoints, vec![]));
        assert_eq!(c.state(), ControllerState::Watching);

        c.handle(SourceEvent::Disconnected { kind: ResourceKind::Endpoints });
        assert_eq!(c.state(), ControllerState::Resyncing);
        c.handle(relisted(ResourceKind::Endpoints, vec![]));
        assert_eq!(c.state(), ControllerState::Watching);
        assert_eq!(c.status.load().state, ControllerState::Watching);
    }

    #[test]
    fn test_delete_and_stale_updates() {
        let (mut c, _rx) = controller();
        assert!(c.handle(SourceEvent::Change(WatchEvent::new(ChangeType::Added, service("a", "5")))));
        assert!(!c.handle(SourceEvent::Change(WatchEvent::new(ChangeType::Modified, service("a", "4")))));
        assert!(c.handle(SourceEvent::Change(WatchEvent::new(ChangeType::Deleted, service("a", "6")))));
        assert_eq!(c.registry.service_count(), 0);

        let endpoints = ClusterObject::Endpoints(EndpointSet {
            id: ServiceId::new("default", "a"),
            endpoints: vec![],
            version: ResourceVersion::new("7"),
        });
        assert!(c.handle(SourceEvent::Change(WatchEvent::new(ChangeType::Added, endpoints))));
    }

    #[tokio::test]
    async fn test_initial_sync_is_one_batch() {
        let (c, mut rx) = controller();
        let (tx, events) = mpsc::channel(16);
        let shutdown = crate::lifecycle::Shutdown::new();
        let task = tokio::spawn(c.run(events, shutdown.subscribe()));

        tx.send(SourceEvent::Change(WatchEvent::new(ChangeType::Added, service("early", "1"))))
            .await
            .unwrap();
        tx.send(relisted(ResourceKind::Service, vec![service("a", "1"), service("b", "1")]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.borrow().is_none(), "no reconcile before every kind listed");

        tx.send(relisted(ResourceKind::Endpoints, vec![])).await.unwrap();
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone().unwrap();
        assert_eq!(snapshot.len(), 2);

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_is_debounced() {
        let (c, mut rx) = controller();
        let (tx, events) = mpsc::channel(64);
        let shutdown = crate::lifecycle::Shutdown::new();
        let task = tokio::spawn(c.run(events, shutdown.subscribe()));

        tx.send(relisted(ResourceKind::Service, vec![])).await.unwrap();
        tx.send(relisted(ResourceKind::Endpoints, vec![])).await.unwrap();
        rx.changed().await.unwrap();
        rx.borrow_and_update();

        for i in 0..10 {
            let name = format!("svc-{i}");
            tx.send(SourceEvent::Change(WatchEvent::new(ChangeType::Added, service(&name, "1"))))
                .await
                .unwrap();
        }

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone().unwrap();
        assert_eq!(snapshot.len(), 10);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!rx.has_changed().unwrap());

        shutdown.trigger();
        task.await.unwrap();
    }
}
