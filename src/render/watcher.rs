//! Template file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::render::engine::{ConfigTemplate, SharedTemplate};

/// Watches the template file and swaps in new versions.
pub struct TemplateWatcher {
    path: PathBuf,
    template: SharedTemplate,
}

impl TemplateWatcher {
    pub fn new(path: &Path, template: SharedTemplate) -> Self {
        Self {
            path: path.to_path_buf(),
            template,
        }
    }

    /// Start watching in a background thread. `on_reload` runs after every
    /// successful swap. The returned watcher must be kept alive.
    pub fn run<F>(self, on_reload: F) -> Result<RecommendedWatcher, notify::Error>
    where
        F: Fn() + Send + 'static,
    {
        let path = self.path.clone();
        let template = self.template;

        // Editors usually replace the file, so watch the directory.
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| p.file_name() == path.file_name());
                    if !relevant {
                        return;
                    }
                    tracing::info!(path = %path.display(), "Template change detected, reloading...");
                    match reload(&path, &template) {
                        Ok(true) => on_reload(),
                        Ok(false) => tracing::debug!("Template content unchanged"),
                        Err(e) => tracing::error!(
                            "Failed to reload template: {}. Keeping current template.",
                            e
                        ),
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Template watcher started");
        Ok(watcher)
    }
}

/// Load the template at `path` and publish it if it differs.
fn reload(path: &Path, template: &SharedTemplate) -> Result<bool, crate::render::RenderError> {
    let fresh = ConfigTemplate::load(path)?;
    if **template.load() == fresh {
        return Ok(false);
    }
    template.store(std::sync::Arc::new(fresh));
    Ok(true)
}
