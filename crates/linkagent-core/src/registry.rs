//! Port, link and host registries for the local device

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::model::{Host, Link, Port};

/// Outcome of a link observation
#[derive(Debug, Clone)]
pub enum LinkUpdate {
    /// No link was known on the ingress port
    Added,
    /// A link with a different remote end was replaced
    Replaced { previous: Link },
    /// Same remote end, timestamp refreshed
    Refreshed,
}

impl LinkUpdate {
    /// Whether the link identity changed and needs to be re-exported
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Refreshed)
    }
}

/// Outcome of a host observation
#[derive(Debug, Clone)]
pub enum HostUpdate {
    Added,
    Replaced { previous: Host },
    Refreshed,
}

impl HostUpdate {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Refreshed)
    }
}

/// Registries of everything observed on the local device
#[derive(Debug, Default)]
pub struct Registry {
    /// Ports indexed by device port ID
    ports: HashMap<String, Port>,
    /// Links indexed by local ingress port
    links: HashMap<u32, Link>,
    /// Hosts indexed by MAC address
    hosts: HashMap<String, Host>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link observation, replacing the entry when the remote end changed
    pub fn update_link(
        &mut self,
        ingress_port: u32,
        egress_port: u32,
        egress_device: &str,
        now: Instant,
    ) -> LinkUpdate {
        if let Some(link) = self.links.get_mut(&ingress_port) {
            if !link.differs(egress_port, egress_device) {
                link.last_update = now;
                return LinkUpdate::Refreshed;
            }
        }

        let link = Link::new(ingress_port, egress_port, egress_device, now);
        match self.links.insert(ingress_port, link) {
            Some(previous) => LinkUpdate::Replaced { previous },
            None => LinkUpdate::Added,
        }
    }

    /// Record a host observation, replacing the entry when its IP or port changed
    pub fn update_host(&mut self, mac: &str, ip: &str, port: u32, now: Instant) -> HostUpdate {
        if let Some(host) = self.hosts.get_mut(mac) {
            if !host.differs(ip, port) {
                host.last_update = now;
                return HostUpdate::Refreshed;
            }
        }

        match self.hosts.insert(mac.to_string(), Host::new(mac, ip, port, now)) {
            Some(previous) => HostUpdate::Replaced { previous },
            None => HostUpdate::Added,
        }
    }

    /// Remove links not observed within `max_age`, returning them
    pub fn prune_links(&mut self, now: Instant, max_age: Duration) -> Vec<Link> {
        let stale: Vec<u32> = self
            .links
            .iter()
            .filter(|(_, link)| link.is_stale(now, max_age))
            .map(|(port, _)| *port)
            .collect();

        let mut pruned: Vec<Link> = stale
            .into_iter()
            .filter_map(|port| self.links.remove(&port))
            .collect();
        pruned.sort_by_key(|l| l.ingress_port);
        pruned
    }

    /// Remove hosts not observed within `max_age`, returning them
    pub fn prune_hosts(&mut self, now: Instant, max_age: Duration) -> Vec<Host> {
        let stale: Vec<String> = self
            .hosts
            .iter()
            .filter(|(_, host)| host.is_stale(now, max_age))
            .map(|(mac, _)| mac.clone())
            .collect();

        let mut pruned: Vec<Host> = stale
            .into_iter()
            .filter_map(|mac| self.hosts.remove(&mac))
            .collect();
        pruned.sort_by(|a, b| a.mac.cmp(&b.mac));
        pruned
    }

    /// Remove the link on an ingress port, e.g. after the port went down
    pub fn remove_link(&mut self, ingress_port: u32) -> Option<Link> {
        self.links.remove(&ingress_port)
    }

    /// Replace the port registry with a fresh enumeration
    pub fn replace_ports(&mut self, ports: Vec<Port>) {
        self.ports = ports.into_iter().map(|p| (p.id.clone(), p)).collect();
    }

    pub fn get_link(&self, ingress_port: u32) -> Option<&Link> {
        self.links.get(&ingress_port)
    }

    pub fn get_host(&self, mac: &str) -> Option<&Host> {
        self.hosts.get(mac)
    }

    /// Snapshot of all links, sorted by ingress port
    pub fn links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self.links.values().cloned().collect();
        links.sort_by_key(|l| l.ingress_port);
        links
    }

    /// Snapshot of all hosts, sorted by MAC
    pub fn hosts(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self.hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.mac.cmp(&b.mac));
        hosts
    }

    /// Snapshot of all ports, sorted by port number
    pub fn ports(&self) -> Vec<Port> {
        let mut ports: Vec<Port> = self.ports.values().cloned().collect();
        ports.sort_by_key(|p| p.number);
        ports
    }

    /// Ports that are operationally up, sorted by port number
    pub fn active_ports(&self) -> Vec<Port> {
        let mut ports = self.ports();
        ports.retain(Port::is_up);
        ports
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}
