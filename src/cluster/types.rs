//! Domain records produced by the cluster source.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Identity of a service: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceId {
    pub namespace: String,
    pub name: String,
}

impl ServiceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Service exposure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    /// Parse the cluster API's type string. A missing type means ClusterIP.
    /// Returns `None` for types this system does not front (e.g. ExternalName).
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.unwrap_or("ClusterIP") {
            "ClusterIP" => Some(Self::ClusterIP),
            "NodePort" => Some(Self::NodePort),
            "LoadBalancer" => Some(Self::LoadBalancer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterIP => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }
}

/// Backend port a service port forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TargetPort {
    Number(u16),
    Named(String),
}

/// A single declared service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePort {
    /// Port name, empty for the single unnamed port of a service.
    pub name: String,
    /// Port exposed by the service.
    pub port: u16,
    pub target_port: TargetPort,
    /// Host port allocated for NodePort and LoadBalancer services.
    pub node_port: Option<u16>,
    pub protocol: String,
}

impl ServicePort {
    pub fn tcp(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            target_port: TargetPort::Number(port),
            node_port: None,
            protocol: "TCP".to_string(),
        }
    }
}

/// Opaque per-object version token from the cluster API.
///
/// Tokens are treated as monotonically increasing per identity. When both
/// tokens are numeric they are compared as numbers, otherwise any different
/// token counts as newer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceVersion(pub String);

impl ResourceVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_newer_than(&self, other: &ResourceVersion) -> bool {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(new), Ok(old)) => new > old,
            _ => self.0 != other.0,
        }
    }
}

/// A service definition as observed from the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: ServiceId,
    pub service_type: ServiceType,
    pub ports: Vec<ServicePort>,
    /// Requested load-balancer bind address, kept as the raw string the
    /// cluster reported so validators can reject malformed values.
    pub load_balancer_ip: Option<String>,
    pub version: ResourceVersion,
}

/// One concrete backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
    /// Name of the service port this backend port belongs to.
    pub port_name: String,
}

/// Backends currently serving a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    pub id: ServiceId,
    pub endpoints: Vec<Endpoint>,
    pub version: ResourceVersion,
}

/// The two resource kinds watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Service,
    Endpoints,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Service, ResourceKind::Endpoints];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Endpoints => "endpoints",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// Either kind of watched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterObject {
    Service(Service),
    Endpoints(EndpointSet),
}

impl ClusterObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Service(_) => ResourceKind::Service,
            Self::Endpoints(_) => ResourceKind::Endpoints,
        }
    }

    pub fn id(&self) -> &ServiceId {
        match self {
            Self::Service(s) => &s.id,
            Self::Endpoints(e) => &e.id,
        }
    }
}

/// An incremental change to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ResourceKind,
    pub change: ChangeType,
    pub object: ClusterObject,
}

impl WatchEvent {
    pub fn new(change: ChangeType, object: ClusterObject) -> Self {
        Self {
            kind: object.kind(),
            change,
            object,
        }
    }
}

/// Events delivered to the controller over the ordered queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Incremental change observed on an established watch.
    Change(WatchEvent),
    /// Complete list of one kind, replacing everything known about it.
    Relisted {
        kind: ResourceKind,
        objects: Vec<ClusterObject>,
    },
    /// The watch on one kind was lost; a relist follows once reconnected.
    Disconnected { kind: ResourceKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_version_ordering() {
        assert!(ResourceVersion::new("11").is_newer_than(&ResourceVersion::new("9")));
        assert!(!ResourceVersion::new("9").is_newer_than(&ResourceVersion::new("11")));
        assert!(!ResourceVersion::new("9").is_newer_than(&ResourceVersion::new("9")));
        // Opaque tokens: only equality is meaningful
        assert!(ResourceVersion::new("abc").is_newer_than(&ResourceVersion::new("abd")));
        assert!(!ResourceVersion::new("abc").is_newer_than(&ResourceVersion::new("abc")));
    }

    #[test]
    fn test_service_type_parse() {
        assert_eq!(ServiceType::parse(None), Some(ServiceType::ClusterIP));
        assert_eq!(ServiceType::parse(Some("LoadBalancer")), Some(ServiceType::LoadBalancer));
        assert_eq!(ServiceType::parse(Some("NodePort")), Some(ServiceType::NodePort));
        assert_eq!(ServiceType::parse(Some("ExternalName")), None);
    }

    #[test]
    fn test_service_id_display() {
        assert_eq!(ServiceId::new("test", "service1").to_string(), "test/service1");
    }
}
