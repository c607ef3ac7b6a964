//! Port status monitoring between enumeration passes

use linkagent_core::Port;
use std::collections::HashMap;

/// A port whose operational state changed since the previous pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChange {
    pub id: String,
    pub number: u32,
    /// Status before this pass; `None` for a newly seen port
    pub previous: Option<String>,
    /// Status now; `None` if the port disappeared
    pub current: Option<String>,
}

impl PortChange {
    /// Whether the port is up after this pass
    pub fn is_up(&self) -> bool {
        self.current.as_deref().is_some_and(is_up)
    }

    /// Whether the port stopped being usable for links
    pub fn went_down(&self) -> bool {
        let was_up = self.previous.as_deref().is_some_and(is_up);
        was_up && !self.is_up()
    }
}

fn is_up(status: &str) -> bool {
    status.eq_ignore_ascii_case("up")
}

#[derive(Debug, Clone)]
struct Observed {
    number: u32,
    status: String,
    last_change: u64,
}

/// Last-known port status, used to spot link changes without full rediscovery
#[derive(Debug, Default)]
pub struct PortMonitor {
    ports: HashMap<String, Observed>,
}

impl PortMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh enumeration and report what changed, sorted by port number
    pub fn observe(&mut self, ports: &[Port]) -> Vec<PortChange> {
        let mut changes = Vec::new();
        let mut next = HashMap::with_capacity(ports.len());

        for port in ports {
            match self.ports.get(&port.id) {
                Some(old) if old.status == port.status && old.last_change == port.last_change => {}
                old => changes.push(PortChange {
                    id: port.id.clone(),
                    number: port.number,
                    previous: old.map(|o| o.status.clone()),
                    current: Some(port.status.clone()),
                }),
            }
            next.insert(
                port.id.clone(),
                Observed {
                    number: port.number,
                    status: port.status.clone(),
                    last_change: port.last_change,
                },
            );
        }

        for (id, old) in &self.ports {
            if !next.contains_key(id) {
                changes.push(PortChange {
                    id: id.clone(),
                    number: old.number,
                    previous: Some(old.status.clone()),
                    current: None,
                });
            }
        }

        self.ports = next;
        changes.sort_by_key(|c| c.number);
        changes
    }
}
