//! Device-control session boundary
//!
//! The wire protocol (P4Runtime-style control plus packet I/O) lives behind
//! [`DeviceSession`]. Every call is fallible and treated as transient by the
//! controller, which retries with backoff.

use async_trait::async_trait;
use linkagent_core::Port;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    #[error("Session not connected")]
    NotConnected,
    #[error("RPC failed: {0}")]
    Rpc(String),
    #[error("Packet stream closed")]
    StreamClosed,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// The device's forwarding-program description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineInfo {
    /// Program name
    pub name: String,
    /// Cookie identifying the installed program version
    pub cookie: u64,
}

/// Result of a mastership arbitration round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mastership {
    /// Exclusive write access granted
    Primary,
    /// Another controller holds a higher election ID
    Backup,
}

/// A frame punted to the controller by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    /// Port the frame arrived on
    pub ingress_port: u32,
    /// Raw Ethernet frame
    pub payload: Vec<u8>,
}

/// Control session to a programmable switch
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Establish the control connection
    async fn connect(&self) -> SessionResult<()>;

    /// Fetch the installed pipeline description
    async fn pipeline_info(&self) -> SessionResult<PipelineInfo>;

    /// Send our election ID and report the resulting role
    async fn arbitrate(&self, election_id: u128) -> SessionResult<Mastership>;

    /// Enumerate all device ports
    async fn ports(&self) -> SessionResult<Vec<Port>>;

    /// Install rules punting probe and host traffic to the controller
    async fn install_intercept_rules(&self) -> SessionResult<()>;

    /// Send a raw frame out of a port
    async fn packet_out(&self, port: u32, frame: Vec<u8>) -> SessionResult<()>;

    /// Open the stream of punted frames
    async fn packets(&self) -> SessionResult<mpsc::Receiver<PacketIn>>;
}
