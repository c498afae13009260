//! Atomic persistence of rendered configuration.
//!
//! Content is staged in a temporary file next to the destination, flushed to
//! disk, then renamed over the destination. Readers of the destination see
//! either the previous file or the new one, never a partial write.

use std::fs::{self, File, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::render::content_hash;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to stage configuration in {dir}: {source}")]
    Stage {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to replace {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fully written temporary file waiting to replace the destination.
///
/// Dropping it without calling [`StagedConfig::commit`] deletes the
/// temporary file and leaves the destination untouched.
#[derive(Debug)]
pub struct StagedConfig {
    file: NamedTempFile,
}

fn parent_dir(dest: &Path) -> PathBuf {
    match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Write `content` to a temporary file in the destination's directory.
pub fn stage(dest: &Path, content: &[u8]) -> Result<StagedConfig, WriteError> {
    let dir = parent_dir(dest);
    let stage_err = |source| WriteError::Stage {
        dir: dir.clone(),
        source,
    };

    let mut file = tempfile::Builder::new()
        .prefix(".kube-lb-sync-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(stage_err)?;
    file.write_all(content).map_err(stage_err)?;
    file.as_file().sync_all().map_err(stage_err)?;
    fs::set_permissions(file.path(), Permissions::from_mode(0o644)).map_err(stage_err)?;

    Ok(StagedConfig { file })
}

impl StagedConfig {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Rename the staged file over `dest`.
    pub fn commit(self, dest: &Path) -> Result<(), WriteError> {
        self.file.persist(dest).map_err(|e| WriteError::Commit {
            path: dest.to_path_buf(),
            source: e.error,
        })?;

        // Make the rename itself durable.
        if let Err(e) = File::open(parent_dir(dest)).and_then(|d| d.sync_all()) {
            tracing::debug!(path = %dest.display(), error = %e, "Directory sync after rename failed");
        }
        Ok(())
    }
}

/// Stage and commit in one step.
pub fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), WriteError> {
    stage(dest, content)?.commit(dest)
}

/// Hash of the file currently at `path`, if it can be read.
pub fn existing_hash(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| content_hash(&bytes))
}
