//! Configuration rendering subsystem.
//!
//! # Data Flow
//! ```text
//! RegistrySnapshot + domain
//!     → view.rs (explicit, versioned view model)
//!     → engine.rs (minijinja, strict undefined)
//!     → RenderedConfig { content, hash }
//!     → compare with last applied hash
//!     → writer.rs (temp file in target dir → fsync → rename)
//!
//! Template file changed:
//!     watcher.rs → reload → swap SharedTemplate → request reconcile
//! ```
//!
//! # Design Decisions
//! - Rendering is pure; only writer.rs touches the filesystem
//! - Template errors are handled like sanity-check failures (fail closed)
//! - Identical content is never rewritten

pub mod engine;
pub mod view;
pub mod watcher;
pub mod writer;

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use engine::{ConfigTemplate, Renderer, SharedTemplate};
pub use view::TemplateContext;
pub use writer::{stage, write_atomic, StagedConfig, WriteError};

/// Errors producing configuration text.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(String),
}

/// Rendered configuration with its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub content: String,
    pub hash: String,
}

impl RenderedConfig {
    pub fn new(content: String) -> Self {
        let hash = content_hash(content.as_bytes());
        Self { content, hash }
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_tracks_content() {
        let a = RenderedConfig::new("listen 80\n".to_string());
        let b = RenderedConfig::new("listen 80\n".to_string());
        let c = RenderedConfig::new("listen 81\n".to_string());
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.hash.len(), 64);
    }
}
