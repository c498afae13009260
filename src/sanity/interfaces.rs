//! Cached enumeration of the host's interface addresses.
//!
//! # Design Decisions
//! - A snapshot (address set + capture time) is built whole and never mutated
//! - Refreshes swap the shared `Arc` atomically; readers hold one `Arc` per use
//! - An expired snapshot is refreshed on read; a failed refresh is an error,
//!   never an empty "everything is absent" answer

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("failed to enumerate interface addresses: {0}")]
    Enumerate(String),
}

/// Addresses configured on the host at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddressSnapshot {
    pub addresses: HashSet<IpAddr>,
    pub captured_at: Instant,
}

impl InterfaceAddressSnapshot {
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            captured_at: Instant::now(),
        }
    }

    pub fn contains(&self, address: &IpAddr) -> bool {
        self.addresses.contains(address)
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.captured_at.elapsed() < ttl
    }
}

/// Source of interface addresses.
pub trait AddressProvider: Send + Sync {
    fn interface_addresses(&self) -> Result<HashSet<IpAddr>, AddressError>;
}

/// Reads addresses from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl AddressProvider for SystemInterfaces {
    fn interface_addresses(&self) -> Result<HashSet<IpAddr>, AddressError> {
        let ifaddrs =
            nix::ifaddrs::getifaddrs().map_err(|e| AddressError::Enumerate(e.to_string()))?;

        let mut addresses = HashSet::new();
        for ifaddr in ifaddrs {
            let Some(storage) = ifaddr.address else {
                continue;
            };
            if let Some(v4) = storage.as_sockaddr_in() {
                addresses.insert(IpAddr::V4(v4.ip()));
            } else if let Some(v6) = storage.as_sockaddr_in6() {
                addresses.insert(IpAddr::V6(v6.ip()));
            }
        }
        Ok(addresses)
    }
}

/// Shared, TTL-bound cache of the host's addresses.
pub struct InterfaceAddressCache {
    provider: Box<dyn AddressProvider>,
    ttl: Duration,
    current: ArcSwapOption<InterfaceAddressSnapshot>,
}

impl InterfaceAddressCache {
    /// Empty cache; the first read enumerates.
    pub fn new(provider: impl AddressProvider + 'static, ttl: Duration) -> Self {
        Self {
            provider: Box::new(provider),
            ttl,
            current: ArcSwapOption::empty(),
        }
    }

    /// Cache pre-seeded with a snapshot.
    pub fn with_snapshot(
        provider: impl AddressProvider + 'static,
        ttl: Duration,
        snapshot: InterfaceAddressSnapshot,
    ) -> Self {
        let cache = Self::new(provider, ttl);
        cache.current.store(Some(Arc::new(snapshot)));
        cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last published snapshot, whatever its age.
    pub fn load(&self) -> Option<Arc<InterfaceAddressSnapshot>> {
        self.current.load_full()
    }

    /// Enumerate now and publish the result.
    pub fn refresh(&self) -> Result<Arc<InterfaceAddressSnapshot>, AddressError> {
        let addresses = self.provider.interface_addresses()?;
        let snapshot = Arc::new(InterfaceAddressSnapshot {
            addresses,
            captured_at: Instant::now(),
        });
        self.current.store(Some(snapshot.clone()));
        tracing::debug!(count = snapshot.addresses.len(), "Interface addresses refreshed");
        Ok(snapshot)
    }

    /// A snapshot no older than the TTL, refreshing if needed.
    pub fn current(&self) -> Result<Arc<InterfaceAddressSnapshot>, AddressError> {
        match self.load() {
            Some(snapshot) if snapshot.is_fresh(self.ttl) => Ok(snapshot),
            _ => self.refresh(),
        }
    }

    /// Refresh on a fixed interval until shutdown, independent of reconciles.
    pub async fn run_refresher(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_secs = interval.as_secs(), "Interface address refresher starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cache = self.clone();
                    let result = tokio::task::spawn_blocking(move || cache.refresh()).await;
                    match result {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::warn!(error = %e, "Interface address refresh failed"),
                        Err(e) => tracing::warn!(error = %e, "Interface address refresh task panicked"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Interface address refresher received shutdown signal");
                    break;
                }
            }
        }
    }
}
