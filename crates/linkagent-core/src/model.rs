//! Port, link and host records for the local device

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Hosts are not re-probed, so they age out much more slowly than links
pub const HOST_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// A switch port as reported by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Device-assigned port identifier
    pub id: String,
    /// Numeric port index used for packet-in/packet-out
    pub number: u32,
    /// Operational status (e.g. "UP", "DOWN")
    pub status: String,
    /// Device-reported change counter for the status
    pub last_change: u64,
}

impl Port {
    pub fn new(id: impl Into<String>, number: u32, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number,
            status: status.into(),
            last_change: 0,
        }
    }

    /// Whether the port is operationally up
    pub fn is_up(&self) -> bool {
        self.status.eq_ignore_ascii_case("up")
    }
}

/// An ingress link: local `ingress_port` hears probes sent by
/// `egress_device` out of its `egress_port`
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub ingress_port: u32,
    pub egress_port: u32,
    pub egress_device: String,
    /// When this link identity was first observed
    pub created_at: DateTime<Utc>,
    /// Last observation, used for staleness
    #[serde(skip_serializing)]
    pub last_update: Instant,
}

impl Link {
    pub fn new(ingress_port: u32, egress_port: u32, egress_device: &str, now: Instant) -> Self {
        Self {
            ingress_port,
            egress_port,
            egress_device: egress_device.to_string(),
            created_at: Utc::now(),
            last_update: now,
        }
    }

    /// True when the remote end differs from the given one
    pub fn differs(&self, egress_port: u32, egress_device: &str) -> bool {
        self.egress_port != egress_port || self.egress_device != egress_device
    }

    /// Check if the link has not been observed within `max_age`
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.last_update) > max_age
    }
}

/// A host network interface attached to a local port
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub mac: String,
    pub ip: String,
    pub port: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub last_update: Instant,
}

impl Host {
    pub fn new(mac: &str, ip: &str, port: u32, now: Instant) -> Self {
        Self {
            mac: mac.to_string(),
            ip: ip.to_string(),
            port,
            created_at: Utc::now(),
            last_update: now,
        }
    }

    pub fn differs(&self, ip: &str, port: u32) -> bool {
        self.ip != ip || self.port != port
    }

    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.last_update) > max_age
    }
}
