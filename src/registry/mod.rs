//! In-memory service registry.
//!
//! # Data Flow
//! ```text
//! controller (single writer)
//!     → upsert_service / upsert_endpoints / remove / replace_all
//!     → snapshot() → RegistrySnapshot (Arc, sorted, detached)
//!     → applier task (validate → render → write → notify)
//! ```
//!
//! # Design Decisions
//! - Services and endpoint sets are merged by identity and may arrive in any order
//! - Endpoint sets without a service are held back, never rendered
//! - A service without endpoints renders with an empty backend list
//! - Stale versions are ignored; relists replace a whole kind at once

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cluster::types::{ClusterObject, Endpoint, EndpointSet, ResourceKind, Service, ServiceId};

/// A service merged with its current backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service: Service,
    pub endpoints: Vec<Endpoint>,
}

/// Immutable, sorted view of the registry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    services: Arc<BTreeMap<ServiceId, ServiceEntry>>,
}

impl RegistrySnapshot {
    pub fn get(&self, id: &ServiceId) -> Option<&ServiceEntry> {
        self.services.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    service: Option<Service>,
    endpoints: Option<EndpointSet>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.service.is_none() && self.endpoints.is_none()
    }
}

/// The single mutable record of all known services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    slots: HashMap<ServiceId, Slot>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a service. Returns false when the update is stale.
    pub fn upsert_service(&mut self, service: Service) -> bool {
        let slot = self.slots.entry(service.id.clone()).or_default();
        if let Some(current) = &slot.service {
            if !service.version.is_newer_than(&current.version) {
                tracing::debug!(service = %service.id, version = %service.version.0, "Ignoring stale service update");
                return false;
            }
        }
        slot.service = Some(service);
        true
    }

    /// Insert or update an endpoint set. Returns false when the update is stale.
    pub fn upsert_endpoints(&mut self, endpoints: EndpointSet) -> bool {
        let slot = self.slots.entry(endpoints.id.clone()).or_default();
        if let Some(current) = &slot.endpoints {
            if !endpoints.version.is_newer_than(&current.version) {
                tracing::debug!(service = %endpoints.id, version = %endpoints.version.0, "Ignoring stale endpoints update");
                return false;
            }
        }
        slot.endpoints = Some(endpoints);
        true
    }

    /// Apply an added or modified object.
    pub fn upsert(&mut self, object: ClusterObject) -> bool {
        match object {
            ClusterObject::Service(s) => self.upsert_service(s),
            ClusterObject::Endpoints(e) => self.upsert_endpoints(e),
        }
    }

    /// Forget one kind of record for `id`. Returns true if something was removed.
    pub fn remove(&mut self, kind: ResourceKind, id: &ServiceId) -> bool {
        let Some(slot) = self.slots.get_mut(id) else {
            return false;
        };
        let removed = match kind {
            ResourceKind::Service => slot.service.take().is_some(),
            ResourceKind::Endpoints => slot.endpoints.take().is_some(),
        };
        if slot.is_empty() {
            self.slots.remove(id);
        }
        removed
    }

    /// Replace every record of `kind` with a fresh list. Records absent from
    /// the list are dropped, versions are taken as-is.
    pub fn replace_all(&mut self, kind: ResourceKind, objects: Vec<ClusterObject>) {
        for slot in self.slots.values_mut() {
            match kind {
                ResourceKind::Service => slot.service = None,
                ResourceKind::Endpoints => slot.endpoints = None,
            }
        }
        for object in objects {
            if object.kind() != kind {
                tracing::warn!(expected = %kind, got = %object.kind(), "Ignoring mismatched object in relist");
                continue;
            }
            let slot = self.slots.entry(object.id().clone()).or_default();
            match object {
                ClusterObject::Service(s) => slot.service = Some(s),
                ClusterObject::Endpoints(e) => slot.endpoints = Some(e),
            }
        }
        self.slots.retain(|_, slot| !slot.is_empty());
    }

    /// Number of services visible in snapshots.
    pub fn service_count(&self) -> usize {
        self.slots.values().filter(|s| s.service.is_some()).count()
    }

    /// Detached view containing every service with its merged backends.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let services = self
            .slots
            .iter()
            .filter_map(|(id, slot)| {
                let service = slot.service.clone()?;
                let endpoints = slot
                    .endpoints
                    .as_ref()
                    .map(|e| e.endpoints.clone())
                    .unwrap_or_default();
                Some((id.clone(), ServiceEntry { service, endpoints }))
            })
            .collect();
        RegistrySnapshot {
            services: Arc::new(services),
        }
    }
}
