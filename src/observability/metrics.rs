//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lbsync_cluster_events_total` (counter): watch changes by kind, change
//! - `lbsync_watch_reconnects_total` (counter): lost watches by kind
//! - `lbsync_reconciles_total` (counter): reconcile passes by outcome
//! - `lbsync_violations_total` (counter): sanity violations by check
//! - `lbsync_config_writes_total` (counter): committed writes by result
//! - `lbsync_notifications_total` (counter): reload triggers by result
//! - `lbsync_known_services` (gauge): services in the last snapshot

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::cluster::ChangeType;

/// Start the Prometheus scrape listener. Needs a running Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_cluster_event(kind: &'static str, change: ChangeType) {
    let change = match change {
        ChangeType::Added => "added",
        ChangeType::Modified => "modified",
        ChangeType::Deleted => "deleted",
    };
    counter!("lbsync_cluster_events_total", "kind" => kind, "change" => change).increment(1);
}

pub fn record_watch_reconnect(kind: &'static str) {
    counter!("lbsync_watch_reconnects_total", "kind" => kind).increment(1);
}

/// `outcome` is one of `applied`, `unchanged`, `rejected`, `failed`.
pub fn record_reconcile(outcome: &'static str) {
    counter!("lbsync_reconciles_total", "outcome" => outcome).increment(1);
}

pub fn record_violation(check: &'static str) {
    counter!("lbsync_violations_total", "check" => check).increment(1);
}

pub fn record_write(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("lbsync_config_writes_total", "result" => result).increment(1);
}

pub fn record_notify(ok: bool) {
    let result = if ok { "ok" } else { "exhausted" };
    counter!("lbsync_notifications_total", "result" => result).increment(1);
}

pub fn set_known_services(count: usize) {
    gauge!("lbsync_known_services").set(count as f64);
}
