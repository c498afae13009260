//! Published reconcile status.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::controller::reconciler::{ReconcileError, ReconcileOutcome, Rejection};
use crate::controller::ControllerState;
use crate::sanity::Violation;

/// Point-in-time view of the synchronizer, served by the admin endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileStatus {
    pub state: ControllerState,
    pub known_services: usize,
    pub last_applied_hash: Option<String>,
    pub reconciles: u64,
    pub applied: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub failed: u64,
    pub notify_failures: u64,
    /// Unix seconds of the last finished reconcile.
    pub last_reconcile_at: Option<u64>,
    pub last_error: Option<String>,
    pub last_violations: Vec<Violation>,
}

/// Lock-free holder of the latest [`ReconcileStatus`].
#[derive(Debug, Default)]
pub struct StatusBoard {
    current: ArcSwap<ReconcileStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<ReconcileStatus> {
        self.current.load_full()
    }

    fn update(&self, mut f: impl FnMut(&mut ReconcileStatus)) {
        self.current.rcu(|current| {
            let mut next = ReconcileStatus::clone(current);
            f(&mut next);
            next
        });
    }

    pub fn set_state(&self, state: ControllerState) {
        self.update(|s| s.state = state);
    }

    pub fn set_known_services(&self, count: usize) {
        self.update(|s| s.known_services = count);
    }

    pub fn seed_hash(&self, hash: Option<String>) {
        self.update(|s| s.last_applied_hash = hash.clone());
    }

    /// Fold one reconcile result into the counters.
    pub fn record(&self, result: &Result<ReconcileOutcome, ReconcileError>) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .ok();

        self.update(|s| {
            s.reconciles += 1;
            s.last_reconcile_at = now;
            match result {
                Ok(ReconcileOutcome::Applied { hash, notified }) => {
                    s.applied += 1;
                    s.last_applied_hash = Some(hash.clone());
                    s.last_violations.clear();
                    if *notified {
                        s.last_error = None;
                    } else {
                        s.notify_failures += 1;
                        s.last_error = Some("reload notification failed".to_string());
                    }
                }
                Ok(ReconcileOutcome::Unchanged) => {
                    s.unchanged += 1;
                    s.last_violations.clear();
                    s.last_error = None;
                }
                Ok(ReconcileOutcome::Rejected(Rejection::Invalid(violations))) => {
                    s.rejected += 1;
                    s.last_violations = violations.clone();
                    s.last_error = Some(format!("{} sanity violation(s)", violations.len()));
                }
                Ok(ReconcileOutcome::Rejected(Rejection::Render(reason))) => {
                    s.rejected += 1;
                    s.last_violations.clear();
                    s.last_error = Some(reason.clone());
                }
                Err(e) => {
                    s.failed += 1;
                    s.last_error = Some(e.to_string());
                }
            }
        });
    }
}
