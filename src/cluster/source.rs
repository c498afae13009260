//! Cluster API list+watch source.
//!
//! # Responsibilities
//! - Probe the API server once at startup (the only fatal failure)
//! - Run one watcher per resource kind and funnel events into one queue
//! - Turn `Init..InitDone` into a single `Relisted` batch
//! - Reconnect forever with jittered backoff, always through a full relist

use std::collections::HashSet;
use std::fmt::Debug;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints as KubeEndpoints, Service as KubeService};
use kube::api::ListParams;
use kube::runtime::watcher::{self, watcher, Event};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::cluster::convert::{self, ConvertError};
use crate::cluster::types::{
    ChangeType, ClusterObject, EndpointSet, ResourceKind, ResourceVersion, Service, ServiceId,
    ServiceType, SourceEvent, WatchEvent,
};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffConfig;

/// Errors raised by the cluster source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The API server could not be reached on the first connection.
    #[error("initial list of {kind} failed: {source}")]
    InitialConnect {
        kind: ResourceKind,
        #[source]
        source: kube::Error,
    },
}

/// A cluster object type the source knows how to watch.
trait Watched:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
    const KIND: ResourceKind;

    /// `Ok(None)` means the object must be treated as absent.
    fn to_object(&self) -> Result<Option<ClusterObject>, ConvertError>;

    /// Minimal record standing in for an object that disappeared.
    fn tombstone(id: ServiceId, version: ResourceVersion) -> ClusterObject;
}

impl Watched for KubeService {
    const KIND: ResourceKind = ResourceKind::Service;

    fn to_object(&self) -> Result<Option<ClusterObject>, ConvertError> {
        Ok(convert::service(self)?.map(ClusterObject::Service))
    }

    fn tombstone(id: ServiceId, version: ResourceVersion) -> ClusterObject {
        ClusterObject::Service(Service {
            id,
            service_type: ServiceType::ClusterIP,
            ports: Vec::new(),
            load_balancer_ip: None,
            version,
        })
    }
}

impl Watched for KubeEndpoints {
    const KIND: ResourceKind = ResourceKind::Endpoints;

    fn to_object(&self) -> Result<Option<ClusterObject>, ConvertError> {
        Ok(Some(ClusterObject::Endpoints(convert::endpoints(self)?)))
    }

    fn tombstone(id: ServiceId, version: ResourceVersion) -> ClusterObject {
        ClusterObject::Endpoints(EndpointSet {
            id,
            endpoints: Vec::new(),
            version,
        })
    }
}

/// Connected source of cluster events.
pub struct KubeSource {
    client: Client,
    backoff: BackoffConfig,
}

impl KubeSource {
    /// Verify the API server answers list calls for both kinds.
    pub async fn connect(client: Client, backoff: BackoffConfig) -> Result<Self, SourceError> {
        probe::<KubeService>(&client).await?;
        probe::<KubeEndpoints>(&client).await?;
        tracing::info!("Connected to cluster API");
        Ok(Self { client, backoff })
    }

    /// Start the watchers. Events of each kind keep their order in `events`.
    pub fn spawn(self, events: mpsc::Sender<SourceEvent>, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(watch_kind(
                Api::<KubeService>::all(self.client.clone()),
                events.clone(),
                self.backoff,
                shutdown.subscribe(),
            )),
            tokio::spawn(watch_kind(
                Api::<KubeEndpoints>::all(self.client),
                events,
                self.backoff,
                shutdown.subscribe(),
            )),
        ]
    }
}

async fn probe<K: Watched>(client: &Client) -> Result<(), SourceError> {
    let api: Api<K> = Api::all(client.clone());
    api.list(&ListParams::default().limit(1))
        .await
        .map_err(|source| SourceError::InitialConnect {
            kind: K::KIND,
            source,
        })?;
    Ok(())
}

/// Per-kind bookkeeping across events of one watcher.
struct KindState {
    kind: ResourceKind,
    known: HashSet<ServiceId>,
    pending: Option<Vec<ClusterObject>>,
}

impl KindState {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            known: HashSet::new(),
            pending: None,
        }
    }

    /// Translate one watcher event. Returns the event to forward, if any.
    fn translate<K: Watched>(&mut self, event: Event<K>) -> Option<SourceEvent> {
        match event {
            Event::Init => {
                tracing::debug!(kind = %self.kind, "Relist started");
                self.pending = Some(Vec::new());
                None
            }
            Event::InitApply(obj) => {
                if let Some(object) = convert_or_warn(&obj) {
                    self.pending.get_or_insert_with(Vec::new).push(object);
                }
                None
            }
            Event::InitDone => {
                let objects = self.pending.take().unwrap_or_default();
                self.known = objects.iter().map(|o| o.id().clone()).collect();
                tracing::info!(kind = %self.kind, count = objects.len(), "Relist complete");
                Some(SourceEvent::Relisted {
                    kind: self.kind,
                    objects,
                })
            }
            Event::Apply(obj) => {
                let id = convert::object_id(obj.meta()).ok()?;
                match obj.to_object() {
                    Ok(Some(object)) => {
                        let change = if self.known.insert(id) {
                            ChangeType::Added
                        } else {
                            ChangeType::Modified
                        };
                        Some(SourceEvent::Change(WatchEvent::new(change, object)))
                    }
                    Ok(None) => self.deleted::<K>(id, &obj),
                    Err(e) => {
                        tracing::warn!(kind = %self.kind, object = %id, error = %e, "Skipping unconvertible object");
                        None
                    }
                }
            }
            Event::Delete(obj) => {
                let id = convert::object_id(obj.meta()).ok()?;
                self.deleted::<K>(id, &obj)
            }
        }
    }

    fn deleted<K: Watched>(&mut self, id: ServiceId, obj: &K) -> Option<SourceEvent> {
        if !self.known.remove(&id) {
            return None;
        }
        let version = ResourceVersion(obj.meta().resource_version.clone().unwrap_or_default());
        Some(SourceEvent::Change(WatchEvent::new(
            ChangeType::Deleted,
            K::tombstone(id, version),
        )))
    }
}

fn convert_or_warn<K: Watched>(obj: &K) -> Option<ClusterObject> {
    match obj.to_object() {
        Ok(object) => object,
        Err(e) => {
            tracing::warn!(
                kind = %K::KIND,
                name = ?obj.meta().name,
                namespace = ?obj.meta().namespace,
                error = %e,
                "Skipping unconvertible object"
            );
            None
        }
    }
}

async fn watch_kind<K: Watched>(
    api: Api<K>,
    events: mpsc::Sender<SourceEvent>,
    backoff: BackoffConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut state = KindState::new(K::KIND);
    let mut attempt: u32 = 0;

    loop {
        // A fresh watcher always begins with a full list.
        let stream = watcher(api.clone(), watcher::Config::default());
        let mut stream = std::pin::pin!(stream);

        let error = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(kind = %K::KIND, "Watcher received shutdown signal");
                    return;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        let relisted = matches!(event, Event::InitDone);
                        if let Some(out) = state.translate(event) {
                            if let SourceEvent::Change(change) = &out {
                                metrics::record_cluster_event(change.kind.as_str(), change.change);
                            }
                            if events.send(out).await.is_err() {
                                tracing::debug!(kind = %K::KIND, "Event queue closed, stopping watcher");
                                return;
                            }
                        }
                        if relisted {
                            attempt = 0;
                        }
                    }
                    Some(Err(e)) => break e.to_string(),
                    None => break "watch stream ended".to_string(),
                }
            }
        };

        state.pending = None;
        if events
            .send(SourceEvent::Disconnected { kind: K::KIND })
            .await
            .is_err()
        {
            return;
        }

        attempt = attempt.saturating_add(1);
        let delay = backoff.delay(attempt);
        metrics::record_watch_reconnect(K::KIND.as_str());
        tracing::warn!(
            kind = %K::KIND,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Watch lost, reconnecting"
        );

        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
