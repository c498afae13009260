//! Kubernetes service → load balancer configuration synchronizer library

pub mod admin;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod notifier;
pub mod observability;
pub mod registry;
pub mod render;
pub mod resilience;
pub mod sanity;

pub use config::schema::SyncConfig;
pub use controller::{Controller, Reconciler, ReconcileOutcome};
pub use lifecycle::{Shutdown, SyncContext};
