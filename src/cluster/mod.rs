//! Cluster state ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! kube watcher (Service)    ─┐
//!                            ├─▶ convert.rs (k8s-openapi → domain types)
//! kube watcher (Endpoints)  ─┘       → source.rs (classify Added/Modified/Deleted,
//!                                      buffer Init..InitDone into one Relisted batch)
//!                                    → single ordered mpsc queue of SourceEvent
//!                                    → controller
//!
//! On watch error:
//!     drop the stream → backoff with jitter → new watcher → full relist
//! ```
//!
//! # Design Decisions
//! - The controller never sees kube types, only `types.rs` records
//! - Every reconnect starts from a full list so stale entries can be discarded
//! - Only the very first connection failure is fatal

pub mod convert;
pub mod source;
pub mod types;

pub use source::{KubeSource, SourceError};
pub use types::{
    ChangeType, ClusterObject, Endpoint, EndpointSet, ResourceKind, ResourceVersion, Service,
    ServiceId, ServicePort, ServiceType, SourceEvent, TargetPort, WatchEvent,
};
