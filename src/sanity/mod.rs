//! Sanity checks gating every reconcile.
//!
//! # Data Flow
//! ```text
//! RegistrySnapshot
//!     → SanityGate::validate_all
//!         → every registered SanityCheck × every service
//!     → ValidationResult::Accepted | Rejected(violations)
//!     → Rejected aborts render/write/notify for this cycle
//! ```
//!
//! # Design Decisions
//! - Checks are independent; the gate knows nothing about individual rules
//! - All violations are collected, not just the first
//! - Fail closed: a check that cannot decide rejects

pub mod ephemeral_ports;
pub mod interfaces;
pub mod lb_address;

use std::fmt;

use serde::Serialize;

use crate::cluster::types::{Service, ServiceId};
use crate::registry::RegistrySnapshot;

pub use ephemeral_ports::EphemeralPortsRange;
pub use interfaces::{AddressProvider, InterfaceAddressCache, InterfaceAddressSnapshot, SystemInterfaces};
pub use lb_address::LoadBalancerAddress;

/// A single rule applied to each service.
pub trait SanityCheck: Send + Sync {
    /// Short rule name used in logs and violations.
    fn name(&self) -> &'static str;

    /// Approve the service or explain why it is unsafe.
    fn validate(&self, service: &Service) -> Result<(), String>;
}

/// One reason a service was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub service: ServiceId,
    pub check: &'static str,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.service, self.check, self.reason)
    }
}

/// Outcome of validating a whole snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted,
    /// Never empty.
    Rejected(Vec<Violation>),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted)
    }

    fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            ValidationResult::Accepted
        } else {
            ValidationResult::Rejected(violations)
        }
    }
}

/// Ordered set of checks that must all pass.
#[derive(Default)]
pub struct SanityGate {
    checks: Vec<Box<dyn SanityCheck>>,
}

impl SanityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check. Checks run in registration order.
    pub fn register(&mut self, check: impl SanityCheck + 'static) -> &mut Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn with(mut self, check: impl SanityCheck + 'static) -> Self {
        self.register(check);
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Validate a single service against every check.
    pub fn validate(&self, service: &Service) -> ValidationResult {
        ValidationResult::from_violations(self.violations_for(service))
    }

    /// Validate every service in the snapshot against every check.
    pub fn validate_all(&self, snapshot: &RegistrySnapshot) -> ValidationResult {
        let violations = snapshot
            .iter()
            .flat_map(|entry| self.violations_for(&entry.service))
            .collect();
        ValidationResult::from_violations(violations)
    }

    fn violations_for(&self, service: &Service) -> Vec<Violation> {
        self.checks
            .iter()
            .filter_map(|check| {
                check.validate(service).err().map(|reason| Violation {
                    service: service.id.clone(),
                    check: check.name(),
                    reason,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::{ClusterObject, ResourceKind, ResourceVersion, ServicePort, ServiceType};
    use crate::registry::ServiceRegistry;

    struct RejectNamed(&'static str);

    impl SanityCheck for RejectNamed {
        fn name(&self) -> &'static str {
            "reject-named"
        }

        fn validate(&self, service: &Service) -> Result<(), String> {
            if service.id.name == self.0 {
                Err(format!("{} is not allowed", self.0))
            } else {
                Ok(())
            }
        }
    }

    struct AlwaysReject;

    impl SanityCheck for AlwaysReject {
        fn name(&self) -> &'static str {
            "always"
        }

        fn validate(&self, _service: &Service) -> Result<(), String> {
            Err("no".to_string())
        }
    }

    fn snapshot(names: &[&str]) -> RegistrySnapshot {
        let mut registry = ServiceRegistry::new();
        let objects = names
            .iter()
            .map(|n| {
                ClusterObject::Service(Service {
                    id: ServiceId::new("test", *n),
                    service_type: ServiceType::NodePort,
                    ports: vec![ServicePort::tcp("http", 80)],
                    load_balancer_ip: None,
                    version: ResourceVersion::new("1"),
                })
            })
            .collect();
        registry.replace_all(ResourceKind::Service, objects);
        registry.snapshot()
    }

    #[test]
    fn test_empty_gate_accepts() {
        assert!(SanityGate::new().validate_all(&snapshot(&["a", "b"])).is_accepted());
    }

    #[test]
    fn test_every_check_runs_on_every_service() {
        let gate = SanityGate::new().with(RejectNamed("b")).with(AlwaysReject);
        let ValidationResult::Rejected(violations) = gate.validate_all(&snapshot(&["a", "b"])) else {
            panic!("expected rejection");
        };

        let summary: Vec<(String, &str)> = violations
            .iter()
            .map(|v| (v.service.name.clone(), v.check))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a".to_string(), "always"),
                ("b".to_string(), "reject-named"),
                ("b".to_string(), "always"),
            ]
        );
    }

    #[test]
    fn test_check_names_keep_registration_order() {
        let mut gate = SanityGate::new();
        gate.register(AlwaysReject).register(RejectNamed("x"));
        assert_eq!(gate.check_names(), vec!["always", "reject-named"]);
    }
}
