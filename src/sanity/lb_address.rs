//! Load-balancer bind address check.

use std::net::IpAddr;
use std::sync::Arc;

use crate::cluster::types::{Service, ServiceType};
use crate::sanity::interfaces::InterfaceAddressCache;
use crate::sanity::SanityCheck;

/// Validates the address a LoadBalancer service asks to be bound on.
///
/// - Non-LoadBalancer services always pass, whatever their address field holds.
/// - An unparsable address always fails.
/// - With `check_local_bind`, the address must belong to one of the host's
///   interfaces according to a fresh interface snapshot.
pub struct LoadBalancerAddress {
    check_local_bind: bool,
    addresses: Arc<InterfaceAddressCache>,
}

impl LoadBalancerAddress {
    pub fn new(check_local_bind: bool, addresses: Arc<InterfaceAddressCache>) -> Self {
        Self {
            check_local_bind,
            addresses,
        }
    }
}

impl SanityCheck for LoadBalancerAddress {
    fn name(&self) -> &'static str {
        "lb-bind-address"
    }

    fn validate(&self, service: &Service) -> Result<(), String> {
        if service.service_type != ServiceType::LoadBalancer {
            return Ok(());
        }
        let Some(requested) = service.load_balancer_ip.as_deref() else {
            return Ok(());
        };

        let ip: IpAddr = requested
            .parse()
            .map_err(|_| format!("load balancer IP {requested:?} is not a valid address"))?;

        if !self.check_local_bind {
            return Ok(());
        }

        let snapshot = self
            .addresses
            .current()
            .map_err(|e| format!("cannot verify load balancer IP {ip}: {e}"))?;

        if snapshot.contains(&ip) {
            Ok(())
        } else {
            Err(format!("load balancer IP {ip} is not configured on any local interface"))
        }
    }
}
