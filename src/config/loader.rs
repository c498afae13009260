//! Configuration loading from disk and flags.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::cli::CliArgs;
use crate::config::schema::SyncConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML settings file without validating it.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Flags take precedence over the settings file.
pub fn apply_overrides(config: &mut SyncConfig, args: &CliArgs) {
    if let Some(url) = &args.apiserver {
        config.cluster.api_server = Some(url.clone());
    }
    if let Some(path) = &args.kubecfg {
        config.cluster.kubeconfig = Some(path.clone());
    }
    if let Some(domain) = &args.domain {
        config.cluster.domain = domain.clone();
    }
    if let Some(path) = &args.config {
        config.output.config_path = path.clone();
    }
    if let Some(path) = &args.template {
        config.output.template_path = path.clone();
    }
    if let Some(spec) = &args.notify {
        config.notifier.spec = spec.clone();
    }
}

/// Build the effective configuration: settings file, then flags, then validation.
pub fn resolve(args: &CliArgs) -> Result<SyncConfig, ConfigError> {
    let mut config = match &args.settings {
        Some(path) => load_config(path)?,
        None => SyncConfig::default(),
    };
    apply_overrides(&mut config, args);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
