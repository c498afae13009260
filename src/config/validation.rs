//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function of the config; file system checks belong to startup

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::SyncConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("template path is not set")]
    MissingTemplate,

    #[error("output config path is not set")]
    MissingOutput,

    #[error("notifier specification is empty")]
    MissingNotifier,

    #[error("ephemeral port range is inverted ({low} > {high})")]
    InvertedPortRange { low: u16, high: u16 },

    #[error("notifier retry needs at least one attempt")]
    ZeroRetryAttempts,

    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("cluster domain is empty")]
    EmptyDomain,
}

pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.output.template_path.as_os_str().is_empty() {
        errors.push(ValidationError::MissingTemplate);
    }
    if config.output.config_path.as_os_str().is_empty() {
        errors.push(ValidationError::MissingOutput);
    }
    if config.notifier.spec.trim().is_empty() {
        errors.push(ValidationError::MissingNotifier);
    }
    if config.cluster.domain.trim().is_empty() {
        errors.push(ValidationError::EmptyDomain);
    }

    let ports = &config.sanity.ephemeral_ports;
    if ports.enabled && !ports.from_procfs && ports.low > ports.high {
        errors.push(ValidationError::InvertedPortRange {
            low: ports.low,
            high: ports.high,
        });
    }

    if config.notifier.retry.max_attempts == 0 {
        errors.push(ValidationError::ZeroRetryAttempts);
    }

    if config.observability.metrics_enabled {
        check_addr(&mut errors, "metrics", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_addr(&mut errors, "admin", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
