//! Conversion from cluster API objects to domain records.

use std::net::IpAddr;

use k8s_openapi::api::core::v1::{Endpoints as KubeEndpoints, Service as KubeService};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use thiserror::Error;

use crate::cluster::types::{
    Endpoint, EndpointSet, ResourceVersion, Service, ServiceId, ServicePort, ServiceType,
    TargetPort,
};

/// Errors turning a cluster object into a domain record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("object has no name")]
    MissingName,

    #[error("{field} {value} is not a valid port number")]
    PortOutOfRange { field: &'static str, value: i32 },
}

/// Identity of any namespaced object.
pub fn object_id(meta: &ObjectMeta) -> Result<ServiceId, ConvertError> {
    let name = meta.name.clone().ok_or(ConvertError::MissingName)?;
    let namespace = meta.namespace.clone().unwrap_or_else(|| "default".to_string());
    Ok(ServiceId::new(namespace, name))
}

fn version(meta: &ObjectMeta) -> ResourceVersion {
    ResourceVersion(meta.resource_version.clone().unwrap_or_default())
}

fn port_number(field: &'static str, value: i32) -> Result<u16, ConvertError> {
    u16::try_from(value).map_err(|_| ConvertError::PortOutOfRange { field, value })
}

/// Convert a Service. `Ok(None)` means the service type is not fronted by
/// the load balancer and the object must be treated as absent.
pub fn service(svc: &KubeService) -> Result<Option<Service>, ConvertError> {
    let id = object_id(&svc.metadata)?;
    let Some(spec) = svc.spec.as_ref() else {
        return Ok(Some(Service {
            id,
            service_type: ServiceType::ClusterIP,
            ports: Vec::new(),
            load_balancer_ip: None,
            version: version(&svc.metadata),
        }));
    };

    let Some(service_type) = ServiceType::parse(spec.type_.as_deref()) else {
        return Ok(None);
    };

    let mut ports = Vec::new();
    for p in spec.ports.iter().flatten() {
        let port = port_number("port", p.port)?;
        let target_port = match &p.target_port {
            Some(IntOrString::Int(n)) => TargetPort::Number(port_number("targetPort", *n)?),
            Some(IntOrString::String(s)) => TargetPort::Named(s.clone()),
            None => TargetPort::Number(port),
        };
        let node_port = p
            .node_port
            .map(|n| port_number("nodePort", n))
            .transpose()?;
        ports.push(ServicePort {
            name: p.name.clone().unwrap_or_default(),
            port,
            target_port,
            node_port,
            protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
        });
    }

    let load_balancer_ip = spec
        .load_balancer_ip
        .clone()
        .filter(|ip| !ip.is_empty());

    Ok(Some(Service {
        id,
        service_type,
        ports,
        load_balancer_ip,
        version: version(&svc.metadata),
    }))
}

/// Convert an Endpoints object. Only ready addresses become backends;
/// an address that does not parse is skipped.
pub fn endpoints(ep: &KubeEndpoints) -> Result<EndpointSet, ConvertError> {
    let id = object_id(&ep.metadata)?;
    let mut endpoints = Vec::new();

    for subset in ep.subsets.iter().flatten() {
        for address in subset.addresses.iter().flatten() {
            let Ok(ip) = address.ip.parse::<IpAddr>() else {
                tracing::warn!(endpoints = %id, address = %address.ip, "Skipping unparsable endpoint address");
                continue;
            };
            for port in subset.ports.iter().flatten() {
                endpoints.push(Endpoint {
                    address: ip,
                    port: port_number("port", port.port)?,
                    port_name: port.name.clone().unwrap_or_default(),
                });
            }
        }
    }
    endpoints.sort();
    endpoints.dedup();

    Ok(EndpointSet {
        id,
        endpoints,
        version: version(&ep.metadata),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointPort, EndpointSubset, ServicePort as KubeServicePort,
        ServiceSpec,
    };

    fn meta(name: &str, rv: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("test".to_string()),
            resource_version: Some(rv.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_convert_load_balancer_service() {
        let svc = KubeService {
            metadata: meta("service1", "3"),
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                load_balancer_ip: Some("127.0.0.1".to_string()),
                ports: Some(vec![KubeServicePort {
                    name: Some("http".to_string()),
                    port: 80,
                    target_port: Some(IntOrString::String("web".to_string())),
                    node_port: Some(30080),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let converted = service(&svc).unwrap().unwrap();
        assert_eq!(converted.id, ServiceId::new("test", "service1"));
        assert_eq!(converted.service_type, ServiceType::LoadBalancer);
        assert_eq!(converted.load_balancer_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(converted.version, ResourceVersion::new("3"));
        assert_eq!(converted.ports[0].target_port, TargetPort::Named("web".to_string()));
        assert_eq!(converted.ports[0].node_port, Some(30080));
        assert_eq!(converted.ports[0].protocol, "TCP");
    }

    #[test]
    fn test_external_name_is_absent() {
        let svc = KubeService {
            metadata: meta("external", "1"),
            spec: Some(ServiceSpec {
                type_: Some("ExternalName".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(service(&svc).unwrap(), None);
    }

    #[test]
    fn test_port_out_of_range_rejected() {
        let svc = KubeService {
            metadata: meta("bad", "1"),
            spec: Some(ServiceSpec {
                ports: Some(vec![KubeServicePort {
                    port: 70000,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            service(&svc).unwrap_err(),
            ConvertError::PortOutOfRange { field: "port", value: 70000 }
        );
    }

    #[test]
    fn test_convert_endpoints_skips_not_ready() {
        let ep = KubeEndpoints {
            metadata: meta("service1", "7"),
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![
                    EndpointAddress { ip: "10.0.0.2".to_string(), ..Default::default() },
                    EndpointAddress { ip: "10.0.0.1".to_string(), ..Default::default() },
                ]),
                not_ready_addresses: Some(vec![EndpointAddress {
                    ip: "10.0.0.9".to_string(),
                    ..Default::default()
                }]),
                ports: Some(vec![EndpointPort {
                    name: Some("http".to_string()),
                    port: 8080,
                    ..Default::default()
                }]),
            }]),
        };

        let set = endpoints(&ep).unwrap();
        let addrs: Vec<String> = set.endpoints.iter().map(|e| e.address.to_string()).collect();
        assert_eq!(addrs, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(set.endpoints.iter().all(|e| e.port == 8080 && e.port_name == "http"));
    }

    #[test]
    fn test_convert_endpoints_skips_bad_address() {
        let ep = KubeEndpoints {
            metadata: meta("service1", "8"),
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![
                    EndpointAddress { ip: "10.0.0.3".to_string(), ..Default::default() },
                    EndpointAddress { ip: "not-an-ip".to_string(), ..Default::default() },
                ]),
                ports: Some(vec![EndpointPort {
                    name: Some("http".to_string()),
                    port: 8080,
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
        };

        let set = endpoints(&ep).unwrap();
        let addrs: Vec<String> = set.endpoints.iter().map(|e| e.address.to_string()).collect();
        assert_eq!(addrs, vec!["10.0.0.3"]);
        assert_eq!(set.version, ResourceVersion::new("8"));
    }
}
