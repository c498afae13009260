//! Ephemeral port range check.
//!
//! Services bound on the host must stay out of the kernel's ephemeral port
//! band, or outbound connections from the host may collide with them.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::types::Service;
use crate::sanity::SanityCheck;

/// Where Linux publishes its local port range.
pub const PROCFS_PORT_RANGE: &str = "/proc/sys/net/ipv4/ip_local_port_range";

/// Rejects services declaring any port inside `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EphemeralPortsRange {
    pub enabled: bool,
    pub low: u16,
    pub high: u16,
}

impl EphemeralPortsRange {
    pub fn new(low: u16, high: u16) -> Self {
        Self {
            enabled: true,
            low,
            high,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Read the host's range from a procfs-style file ("32768\t60999").
    pub fn from_procfs(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut fields = content.split_whitespace().map(str::parse::<u16>);
        match (fields.next(), fields.next()) {
            (Some(Ok(low)), Some(Ok(high))) if low <= high => Ok(Self::new(low, high)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected port range format in {}: {:?}", path.display(), content.trim()),
            )),
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.low..=self.high).contains(&port)
    }
}

impl SanityCheck for EphemeralPortsRange {
    fn name(&self) -> &'static str {
        "ephemeral-ports"
    }

    fn validate(&self, service: &Service) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        let offending: Vec<String> = service
            .ports
            .iter()
            .map(|p| p.port)
            .filter(|port| self.contains(*port))
            .map(|port| port.to_string())
            .collect();

        if offending.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "port(s) {} within ephemeral range {}-{}",
                offending.join(", "),
                self.low,
                self.high
            ))
        }
    }
}
