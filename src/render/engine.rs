//! Template loading and rendering (minijinja).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use minijinja::{Environment, UndefinedBehavior};

use crate::render::view::TemplateContext;
use crate::render::{RenderError, RenderedConfig};

/// Template source shared between the renderer and the template watcher.
pub type SharedTemplate = Arc<ArcSwap<ConfigTemplate>>;

/// A configuration template read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTemplate {
    path: PathBuf,
    source: String,
}

impl ConfigTemplate {
    /// Read and syntax-check a template file.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let source = std::fs::read_to_string(path).map_err(|e| RenderError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_source(path, source)
    }

    /// Build from an in-memory source. `path` is only used as a label.
    pub fn from_source(path: &Path, source: impl Into<String>) -> Result<Self, RenderError> {
        let template = Self {
            path: path.to_path_buf(),
            source: source.into(),
        };
        environment()
            .template_from_str(&template.source)
            .map_err(|e| RenderError::Template(e.to_string()))?;
        Ok(template)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_shared(self) -> SharedTemplate {
        Arc::new(ArcSwap::from_pointee(self))
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    // Referencing a field the view model does not have is an error, not "".
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env
}

/// Pure transformation from view model to configuration text.
pub struct Renderer {
    env: Environment<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self { env: environment() }
    }

    pub fn render(&self, template: &ConfigTemplate, ctx: &TemplateContext) -> Result<RenderedConfig, RenderError> {
        let content = self
            .env
            .render_str(&template.source, ctx)
            .map_err(|e| RenderError::Template(e.to_string()))?;
        Ok(RenderedConfig::new(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::{ResourceVersion, Service, ServiceId, ServicePort, ServiceType};
    use crate::registry::ServiceRegistry;

    const HAPROXY: &str = "\
{% for svc in services %}
frontend {{ svc.qualified_name }}
{% for port in svc.ports %}
  bind *:{{ port.port }}
{% for b in port.backends %}
  server {{ b.address }}:{{ b.port }}
{% endfor %}
{% endfor %}
  # {{ svc.fqdn }}
{% endfor %}
";

    fn context() -> TemplateContext {
        let mut registry = ServiceRegistry::new();
        registry.upsert_service(Service {
            id: ServiceId::new("test", "web"),
            service_type: ServiceType::LoadBalancer,
            ports: vec![ServicePort::tcp("http", 80)],
            load_balancer_ip: None,
            version: ResourceVersion::new("1"),
        });
        TemplateContext::build(&registry.snapshot(), "local")
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = ConfigTemplate::from_source(Path::new("haproxy.tmpl"), HAPROXY).unwrap();
        let renderer = Renderer::new();
        let first = renderer.render(&template, &context()).unwrap();
        let second = renderer.render(&template, &context()).unwrap();

        assert_eq!(first, second);
        assert!(first.content.contains("frontend test-web"));
        assert!(first.content.contains("bind *:80"));
        assert!(first.content.contains("# web.test.svc.local"));
    }

    #[test]
    fn test_undefined_field_is_an_error() {
        let template =
            ConfigTemplate::from_source(Path::new("bad.tmpl"), "{{ services[0].selector }}").unwrap();
        let err = Renderer::new().render(&template, &context()).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn test_syntax_error_detected_on_load() {
        let err = ConfigTemplate::from_source(Path::new("broken.tmpl"), "{% for x in %}").unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigTemplate::load(Path::new("/nonexistent/kube-lb-sync.tmpl")).unwrap_err();
        assert!(matches!(err, RenderError::Read { .. }));
    }
}
