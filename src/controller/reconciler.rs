//! One reconcile pass: validate → render → compare → write → notify.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::notifier::{notify_with_retry, Notifier};
use crate::observability::metrics;
use crate::registry::RegistrySnapshot;
use crate::render::writer::{self, WriteError};
use crate::render::{RenderedConfig, Renderer, SharedTemplate, TemplateContext};
use crate::resilience::retries::RetryPolicy;
use crate::sanity::{SanityGate, ValidationResult, Violation};

/// Why a snapshot was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// At least one sanity check failed.
    Invalid(Vec<Violation>),
    /// The template could not be rendered against the snapshot.
    Render(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// New content was committed; `notified` is false when every reload attempt failed.
    Applied { hash: String, notified: bool },
    /// Rendered content equals the last applied content.
    Unchanged,
    /// Nothing was written; the previous configuration stays in effect.
    Rejected(Rejection),
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Rejected(_) => "rejected",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("write task failed: {0}")]
    Task(String),
}

/// Owns the write path and the last applied hash.
pub struct Reconciler {
    gate: Arc<SanityGate>,
    template: SharedTemplate,
    renderer: Renderer,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    output: PathBuf,
    domain: String,
    last_applied: Option<String>,
}

impl Reconciler {
    pub fn new(
        gate: Arc<SanityGate>,
        template: SharedTemplate,
        notifier: Arc<dyn Notifier>,
        output: impl Into<PathBuf>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            template,
            renderer: Renderer::new(),
            notifier,
            retry: RetryPolicy::default(),
            output: output.into(),
            domain: domain.into(),
            last_applied: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Treat the current destination content as already applied.
    pub fn seed_from_output(mut self) -> Self {
        self.last_applied = writer::existing_hash(&self.output);
        if let Some(hash) = &self.last_applied {
            tracing::info!(path = %self.output.display(), hash = %short(hash), "Existing configuration found");
        }
        self
    }

    pub fn last_applied(&self) -> Option<&str> {
        self.last_applied.as_deref()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub async fn reconcile(&mut self, snapshot: &RegistrySnapshot) -> Result<ReconcileOutcome, ReconcileError> {
        let result = self.run_pass(snapshot).await;
        match &result {
            Ok(outcome) => metrics::record_reconcile(outcome.label()),
            Err(_) => metrics::record_reconcile("failed"),
        }
        result
    }

    async fn run_pass(&mut self, snapshot: &RegistrySnapshot) -> Result<ReconcileOutcome, ReconcileError> {
        if let ValidationResult::Rejected(violations) = self.validate(snapshot).await? {
            for v in &violations {
                metrics::record_violation(v.check);
                tracing::warn!(service = %v.service, check = v.check, reason = %v.reason, "Service failed sanity check");
            }
            tracing::warn!(
                violations = violations.len(),
                "Configuration rejected, keeping previous configuration"
            );
            return Ok(ReconcileOutcome::Rejected(Rejection::Invalid(violations)));
        }

        let rendered = match self.render(snapshot) {
            Ok(rendered) => rendered,
            Err(reason) => {
                tracing::warn!(error = %reason, "Render failed, keeping previous configuration");
                return Ok(ReconcileOutcome::Rejected(Rejection::Render(reason)));
            }
        };

        if self.last_applied.as_deref() == Some(rendered.hash.as_str()) {
            tracing::debug!(hash = %short(&rendered.hash), "Configuration unchanged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        self.write(&rendered).await?;
        self.last_applied = Some(rendered.hash.clone());
        tracing::info!(
            path = %self.output.display(),
            hash = %short(&rendered.hash),
            services = snapshot.len(),
            "Configuration written"
        );

        let notified = match notify_with_retry(self.notifier.as_ref(), &self.retry).await {
            Ok(attempts) => {
                tracing::info!(notifier = %self.notifier.describe(), attempts, "Reload triggered");
                true
            }
            Err(exhausted) => {
                tracing::error!(
                    notifier = %self.notifier.describe(),
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Reload failed, new configuration stays in place"
                );
                false
            }
        };
        metrics::record_notify(notified);

        Ok(ReconcileOutcome::Applied {
            hash: rendered.hash,
            notified,
        })
    }

    fn render(&self, snapshot: &RegistrySnapshot) -> Result<RenderedConfig, String> {
        let context = TemplateContext::build(snapshot, &self.domain);
        let template = self.template.load();
        self.renderer
            .render(&template, &context)
            .map_err(|e| e.to_string())
    }

    /// Checks may enumerate interfaces, so they run on the blocking pool.
    async fn validate(&self, snapshot: &RegistrySnapshot) -> Result<ValidationResult, ReconcileError> {
        let gate = self.gate.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || gate.validate_all(&snapshot))
            .await
            .map_err(|e| ReconcileError::Task(e.to_string()))
    }

    async fn write(&self, rendered: &RenderedConfig) -> Result<(), ReconcileError> {
        let dest = self.output.clone();
        let content = rendered.content.clone();
        let result = tokio::task::spawn_blocking(move || writer::write_atomic(&dest, content.as_bytes()))
            .await
            .map_err(|e| ReconcileError::Task(e.to_string()))
            .and_then(|r| r.map_err(ReconcileError::from));
        metrics::record_write(result.is_ok());
        result
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
