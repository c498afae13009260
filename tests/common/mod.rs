//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use kube_lb_sync::cluster::{
    ChangeType, ClusterObject, Endpoint, EndpointSet, ResourceKind, ResourceVersion, Service, ServiceId,
    ServicePort, ServiceType, SourceEvent, WatchEvent,
};
use kube_lb_sync::controller::{run_applier, ApplyHandle, Controller, Reconciler, StatusBoard};
use kube_lb_sync::lifecycle::Shutdown;
use kube_lb_sync::notifier::{Notifier, NotifyError};
use kube_lb_sync::render::{ConfigTemplate, SharedTemplate};
use kube_lb_sync::resilience::retries::RetryPolicy;
use kube_lb_sync::sanity::{EphemeralPortsRange, SanityGate};

pub const HAPROXY_TEMPLATE: &str = "\
# generated for {{ domain }}
{% for svc in services %}
backend {{ svc.qualified_name }}
{% for port in svc.ports %}
{% for b in port.backends %}
  server {{ b.address }}:{{ b.port }} check
{% endfor %}
{% endfor %}
{% endfor %}
";

/// Notifier counting calls, failing the first `failures` of them.
#[derive(Default)]
pub struct CountingNotifier {
    pub calls: AtomicU32,
    pub failures: u32,
    pub delay: Duration,
}

impl CountingNotifier {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    fn describe(&self) -> String {
        "counting".to_string()
    }

    async fn notify(&self) -> Result<(), NotifyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(NotifyError::CommandFailed("exit status: 1".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

pub fn service(name: &str, version: &str, ports: &[u16]) -> ClusterObject {
    ClusterObject::Service(Service {
        id: ServiceId::new("default", name),
        service_type: ServiceType::ClusterIP,
        ports: ports.iter().map(|p| ServicePort::tcp("http", *p)).collect(),
        load_balancer_ip: None,
        version: ResourceVersion::new(version),
    })
}

pub fn endpoints(name: &str, version: &str, addresses: &[&str]) -> ClusterObject {
    ClusterObject::Endpoints(EndpointSet {
        id: ServiceId::new("default", name),
        endpoints: addresses
            .iter()
            .map(|a| Endpoint {
                address: a.parse().unwrap(),
                port: 8080,
                port_name: "http".to_string(),
            })
            .collect(),
        version: ResourceVersion::new(version),
    })
}

pub fn added(object: ClusterObject) -> SourceEvent {
    SourceEvent::Change(WatchEvent::new(ChangeType::Added, object))
}

pub fn modified(object: ClusterObject) -> SourceEvent {
    SourceEvent::Change(WatchEvent::new(ChangeType::Modified, object))
}

pub fn deleted(object: ClusterObject) -> SourceEvent {
    SourceEvent::Change(WatchEvent::new(ChangeType::Deleted, object))
}

pub fn relisted(kind: ResourceKind, objects: Vec<ClusterObject>) -> SourceEvent {
    SourceEvent::Relisted { kind, objects }
}

/// Controller and applier wired together over an in-memory event queue.
pub struct Pipeline {
    pub events: mpsc::Sender<SourceEvent>,
    pub status: Arc<StatusBoard>,
    pub apply: ApplyHandle,
    pub template: SharedTemplate,
    pub shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn start(dir: &Path, notifier: Arc<dyn Notifier>, gate: SanityGate) -> Self {
        let template = ConfigTemplate::from_source(&dir.join("haproxy.cfg.tmpl"), HAPROXY_TEMPLATE)
            .unwrap()
            .into_shared();
        let reconciler = Reconciler::new(
            Arc::new(gate),
            template.clone(),
            notifier,
            dir.join("haproxy.cfg"),
            "cluster.local",
        )
        .with_retry(fast_retry(3))
        .seed_from_output();

        let shutdown = Shutdown::new();
        let status = Arc::new(StatusBoard::new());
        let (apply, requests) = ApplyHandle::channel();
        let (events, events_rx) = mpsc::channel(256);

        let controller = Controller::new(Duration::from_millis(30), apply.clone(), status.clone());
        let tasks = vec![
            tokio::spawn(run_applier(reconciler, requests, status.clone(), shutdown.subscribe())),
            tokio::spawn(controller.run(events_rx, shutdown.subscribe())),
        ];

        Self {
            events,
            status,
            apply,
            template,
            shutdown,
            tasks,
        }
    }

    pub async fn send(&self, event: SourceEvent) {
        self.events.send(event).await.unwrap();
    }

    /// Deliver the initial list of both kinds.
    pub async fn sync(&self, services: Vec<ClusterObject>, endpoints: Vec<ClusterObject>) {
        self.send(relisted(ResourceKind::Service, services)).await;
        self.send(relisted(ResourceKind::Endpoints, endpoints)).await;
    }

    /// Wait until `reconciles` passes have finished.
    pub async fn wait_reconciles(&self, reconciles: u64) {
        let status = self.status.clone();
        wait_for(move || status.load().reconciles >= reconciles).await;
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

pub fn ports_gate(low: u16, high: u16) -> SanityGate {
    SanityGate::new().with(EphemeralPortsRange::new(low, high))
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Start a programmable mock reload endpoint.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let status = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    503 => "503 Service Unavailable",
                    _ => "500 Internal Server Error",
                };
                let response = format!("HTTP/1.1 {status_text}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
