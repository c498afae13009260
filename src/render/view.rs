//! Template view model.
//!
//! Templates only ever see these types, never registry records. Field names
//! here are the external template contract; `version` changes when they do.

use serde::Serialize;

use crate::cluster::types::{Endpoint, ServicePort, TargetPort};
use crate::registry::{RegistrySnapshot, ServiceEntry};

/// Version of the template contract.
pub const VIEW_VERSION: u32 = 1;

/// Root object handed to the template engine.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateContext {
    pub version: u32,
    pub domain: String,
    pub services: Vec<ServiceView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceView {
    pub namespace: String,
    pub name: String,
    /// `namespace-name`, usable as an identifier in proxy configs.
    pub qualified_name: String,
    /// `name.namespace.svc.<domain>`
    pub fqdn: String,
    #[serde(rename = "type")]
    pub service_type: &'static str,
    pub load_balancer_ip: Option<String>,
    pub ports: Vec<PortView>,
    /// Every distinct backend of the service, across ports.
    pub backends: Vec<BackendView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PortView {
    pub name: String,
    pub port: u16,
    pub target_port: TargetPort,
    pub node_port: Option<u16>,
    pub protocol: String,
    /// Backends serving this port.
    pub backends: Vec<BackendView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackendView {
    pub address: String,
    pub port: u16,
}

impl From<&Endpoint> for BackendView {
    fn from(e: &Endpoint) -> Self {
        Self {
            address: e.address.to_string(),
            port: e.port,
        }
    }
}

impl TemplateContext {
    pub fn build(snapshot: &RegistrySnapshot, domain: &str) -> Self {
        Self {
            version: VIEW_VERSION,
            domain: domain.to_string(),
            services: snapshot.iter().map(|e| service_view(e, domain)).collect(),
        }
    }
}

fn service_view(entry: &ServiceEntry, domain: &str) -> ServiceView {
    let service = &entry.service;
    let single_port = service.ports.len() == 1;

    let ports = service
        .ports
        .iter()
        .map(|port| PortView {
            name: port.name.clone(),
            port: port.port,
            target_port: port.target_port.clone(),
            node_port: port.node_port,
            protocol: port.protocol.clone(),
            backends: port_backends(port, &entry.endpoints, single_port),
        })
        .collect();

    let mut backends: Vec<BackendView> = entry.endpoints.iter().map(BackendView::from).collect();
    backends.sort();
    backends.dedup();

    ServiceView {
        namespace: service.id.namespace.clone(),
        name: service.id.name.clone(),
        qualified_name: format!("{}-{}", service.id.namespace, service.id.name),
        fqdn: format!("{}.{}.svc.{}", service.id.name, service.id.namespace, domain),
        service_type: service.service_type.as_str(),
        load_balancer_ip: service.load_balancer_ip.clone(),
        ports,
        backends,
    }
}

/// Endpoint ports are matched to service ports by name. A single-port
/// service owns every endpoint port.
fn port_backends(port: &ServicePort, endpoints: &[Endpoint], single_port: bool) -> Vec<BackendView> {
    let mut backends: Vec<BackendView> = endpoints
        .iter()
        .filter(|e| single_port || e.port_name == port.name)
        .map(BackendView::from)
        .collect();
    backends.sort();
    backends.dedup();
    backends
}
