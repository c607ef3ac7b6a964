//! In-memory switch implementing [`DeviceSession`]
//!
//! Ports can be wired to each other with cables: a frame sent out of one end
//! is punted back as a packet-in on the other, as if two ports of the same
//! switch were patched together. Tests use the failure counters to make the
//! next N calls of an operation fail.

use crate::session::{
    DeviceSession, Mastership, PacketIn, PipelineInfo, SessionError, SessionResult,
};
use async_trait::async_trait;
use linkagent_core::Port;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

const PACKET_IN_CAPACITY: usize = 1024;
/// Packet-out history kept for inspection; older frames are dropped
pub const SENT_LOG_CAPACITY: usize = 256;
const PIPELINE_NAME: &str = "linkagent-sim";

#[derive(Debug, Default)]
struct Failures {
    connect: u32,
    pipeline: u32,
    arbitrate: u32,
    ports: u32,
    install: u32,
}

/// Consume one pending failure; true if the call should fail
fn take(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[derive(Debug, Default)]
struct Calls {
    connect: u32,
    arbitrate: u32,
    install: u32,
}

#[derive(Debug)]
struct SimState {
    ports: BTreeMap<u32, Port>,
    cables: HashMap<u32, u32>,
    cookie: u64,
    mastership: Mastership,
    connected: bool,
    failures: Failures,
    calls: Calls,
    packet_tx: Option<mpsc::Sender<PacketIn>>,
    sent: VecDeque<(u32, Vec<u8>)>,
}

/// Simulated programmable switch
#[derive(Debug)]
pub struct SimulatedSwitch {
    state: Mutex<SimState>,
}

impl SimulatedSwitch {
    /// A switch with the given ports, all up
    pub fn new(ports: impl IntoIterator<Item = u32>) -> Self {
        let ports = ports
            .into_iter()
            .map(|n| (n, Port::new(format!("port-{}", n), n, "UP")))
            .collect();
        Self {
            state: Mutex::new(SimState {
                ports,
                cables: HashMap::new(),
                cookie: 1,
                mastership: Mastership::Primary,
                connected: false,
                failures: Failures::default(),
                calls: Calls::default(),
                packet_tx: None,
                sent: VecDeque::with_capacity(SENT_LOG_CAPACITY),
            }),
        }
    }

    /// Patch two local ports together
    pub fn connect_ports(&self, a: u32, b: u32) {
        let mut state = self.state.lock();
        state.cables.insert(a, b);
        state.cables.insert(b, a);
    }

    /// Change a port's operational status, bumping its change counter
    pub fn set_port_status(&self, number: u32, status: &str) {
        if let Some(port) = self.state.lock().ports.get_mut(&number) {
            port.status = status.to_string();
            port.last_change += 1;
        }
    }

    /// Unplug a port module; later enumerations no longer report it
    pub fn remove_port(&self, number: u32) {
        self.state.lock().ports.remove(&number);
    }

    /// Simulate a pipeline reload
    pub fn set_pipeline_cookie(&self, cookie: u64) {
        self.state.lock().cookie = cookie;
    }

    pub fn set_mastership(&self, mastership: Mastership) {
        self.state.lock().mastership = mastership;
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().failures.connect = n;
    }

    pub fn fail_next_pipeline_fetches(&self, n: u32) {
        self.state.lock().failures.pipeline = n;
    }

    pub fn fail_next_arbitrations(&self, n: u32) {
        self.state.lock().failures.arbitrate = n;
    }

    pub fn fail_next_port_enumerations(&self, n: u32) {
        self.state.lock().failures.ports = n;
    }

    pub fn fail_next_rule_installs(&self, n: u32) {
        self.state.lock().failures.install = n;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().calls.connect
    }

    pub fn arbitration_attempts(&self) -> u32 {
        self.state.lock().calls.arbitrate
    }

    pub fn rule_installs(&self) -> u32 {
        self.state.lock().calls.install
    }

    /// Most recent frames sent with packet-out, oldest first, as (port, frame)
    pub fn sent_packets(&self) -> Vec<(u32, Vec<u8>)> {
        self.state.lock().sent.iter().cloned().collect()
    }

    /// Punt a frame to the controller as if it arrived on `port`
    pub fn inject_packet(&self, port: u32, payload: Vec<u8>) -> SessionResult<()> {
        let state = self.state.lock();
        deliver(&state, port, payload)
    }
}

fn deliver(state: &SimState, ingress_port: u32, payload: Vec<u8>) -> SessionResult<()> {
    let tx = state.packet_tx.as_ref().ok_or(SessionError::StreamClosed)?;
    let packet = PacketIn {
        ingress_port,
        payload,
    };
    tx.try_send(packet).map_err(|e| match e {
        TrySendError::Closed(_) => SessionError::StreamClosed,
        TrySendError::Full(_) => SessionError::Rpc("packet-in queue full".into()),
    })
}

fn ensure_connected(state: &SimState) -> SessionResult<()> {
    if state.connected {
        Ok(())
    } else {
        Err(SessionError::NotConnected)
    }
}

#[async_trait]
impl DeviceSession for SimulatedSwitch {
    async fn connect(&self) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.calls.connect += 1;
        if take(&mut state.failures.connect) {
            return Err(SessionError::Unavailable("simulated connect failure".into()));
        }
        state.connected = true;
        Ok(())
    }

    async fn pipeline_info(&self) -> SessionResult<PipelineInfo> {
        let mut state = self.state.lock();
        ensure_connected(&state)?;
        if take(&mut state.failures.pipeline) {
            return Err(SessionError::Rpc("simulated pipeline fetch failure".into()));
        }
        Ok(PipelineInfo {
            name: PIPELINE_NAME.to_string(),
            cookie: state.cookie,
        })
    }

    async fn arbitrate(&self, _election_id: u128) -> SessionResult<Mastership> {
        let mut state = self.state.lock();
        ensure_connected(&state)?;
        state.calls.arbitrate += 1;
        if take(&mut state.failures.arbitrate) {
            return Err(SessionError::Rpc("simulated arbitration failure".into()));
        }
        Ok(state.mastership)
    }

    async fn ports(&self) -> SessionResult<Vec<Port>> {
        let mut state = self.state.lock();
        ensure_connected(&state)?;
        if take(&mut state.failures.ports) {
            return Err(SessionError::Rpc("simulated port enumeration failure".into()));
        }
        Ok(state.ports.values().cloned().collect())
    }

    async fn install_intercept_rules(&self) -> SessionResult<()> {
        let mut state = self.state.lock();
        ensure_connected(&state)?;
        state.calls.install += 1;
        if take(&mut state.failures.install) {
            return Err(SessionError::Rpc("simulated rule install failure".into()));
        }
        Ok(())
    }

    async fn packet_out(&self, port: u32, frame: Vec<u8>) -> SessionResult<()> {
        let mut state = self.state.lock();
        ensure_connected(&state)?;
        if !state.ports.get(&port).is_some_and(Port::is_up) {
            return Err(SessionError::Rpc(format!("port {} is not up", port)));
        }
        if state.sent.len() == SENT_LOG_CAPACITY {
            state.sent.pop_front();
        }
        state.sent.push_back((port, frame.clone()));

        if let Some(&peer) = state.cables.get(&port) {
            if state.ports.get(&peer).is_some_and(Port::is_up) {
                if let Err(e) = deliver(&state, peer, frame) {
                    trace!(port = peer, error = %e, "Packet-in dropped");
                }
            }
        }
        Ok(())
    }

    async fn packets(&self) -> SessionResult<mpsc::Receiver<PacketIn>> {
        let mut state = self.state.lock();
        ensure_connected(&state)?;
        let (tx, rx) = mpsc::channel(PACKET_IN_CAPACITY);
        state.packet_tx = Some(tx);
        Ok(rx)
    }
}
