//! linkagent Discovery - Link and host discovery controller
//!
//! Drives a programmable switch through session bootstrap, mastership
//! arbitration and port enumeration, then:
//! - Emits LLDP probes out of every active port
//! - Learns ingress links from probes punted back by the device
//! - Learns attached hosts from ARP and DHCP client traffic
//! - Prunes links and hosts that stop being observed

pub mod adapter;
pub mod arp;
pub mod backoff;
pub mod controller;
pub mod export;
pub mod fsm;
pub mod listener;
pub mod lldp;
pub mod monitor;
pub mod scheduler;
pub mod session;
pub mod sim;

pub use arp::{parse_host, HostSighting};
pub use backoff::Backoff;
pub use controller::{Controller, ControllerOptions};
pub use export::TreeExporter;
pub use fsm::{next_state, Outcome};
pub use lldp::{build_probe, parse_probe, ProbeInfo};
pub use monitor::{PortChange, PortMonitor};
pub use session::{
    DeviceSession, Mastership, PacketIn, PipelineInfo, SessionError, SessionResult,
};
pub use sim::SimulatedSwitch;
