//! Discovery controller
//!
//! A single worker task walks the device through bootstrap:
//!
//! ```text
//! Disconnected -> Connected -> PipelineAvailable -> Elected -> PortsDiscovered -> Configured
//! ```
//!
//! then stays in the steady-state loop while `Configured`. Failed steps are
//! retried with backoff. `stop()` and configuration updates race with the
//! worker, so every transition is a compare-and-set from the state the step
//! started in.
//!
//! State, tunables, registries and the port monitor live under one lock that
//! is never held across an `.await`.

use crate::backoff::Backoff;
use crate::export::TreeExporter;
use crate::fsm::{next_state, Outcome};
use crate::listener;
use crate::lldp::build_probe;
use crate::monitor::PortMonitor;
use crate::scheduler;
use crate::session::{DeviceSession, Mastership, PipelineInfo, SessionResult};
use chrono::Utc;
use linkagent_core::{
    load_or_default, Config, ConfigStore, ControllerState, ExportTree, Exportable, Host,
    HostUpdate, Link, LinkUpdate, Port, Registry, HOST_MAX_AGE,
};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Controller construction options
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Election ID sent during mastership arbitration; higher wins
    pub election_id: u128,
    /// Emit probes as soon as the controller becomes configured instead of
    /// waiting one emission period
    pub emit_on_configure: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            election_id: u128::try_from(Utc::now().timestamp()).unwrap_or_default(),
            emit_on_configure: true,
        }
    }
}

/// Everything guarded by the controller lock
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: ControllerState,
    pub(crate) config: Config,
    pub(crate) registry: Registry,
    pub(crate) monitor: PortMonitor,
    pub(crate) pipeline: Option<PipelineInfo>,
}

pub(crate) struct Inner {
    agent_id: String,
    session: Arc<dyn DeviceSession>,
    pub(crate) store: Arc<dyn ConfigStore>,
    options: ControllerOptions,
    pub(crate) shared: RwLock<Shared>,
    tree: ExportTree,
    state_tx: watch::Sender<ControllerState>,
    cancel: CancellationToken,
    started: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    listener_running: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Per-device link and host discovery controller
///
/// Cheap to clone; all clones drive the same worker.
#[derive(Clone)]
pub struct Controller {
    pub(crate) inner: Arc<Inner>,
}

impl Controller {
    /// Create a controller; tunables are loaded from `store` and exported
    pub fn new(
        agent_id: impl Into<String>,
        session: Arc<dyn DeviceSession>,
        store: Arc<dyn ConfigStore>,
        options: ControllerOptions,
    ) -> Self {
        let agent_id = agent_id.into();
        let config = load_or_default(store.as_ref()).sanitized();
        let tree = ExportTree::new();
        TreeExporter::new(&tree).mirror_config(&agent_id, &config);

        let (state_tx, _) = watch::channel(ControllerState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                agent_id,
                session,
                store,
                options,
                shared: RwLock::new(Shared {
                    state: ControllerState::Disconnected,
                    config,
                    registry: Registry::new(),
                    monitor: PortMonitor::new(),
                    pipeline: None,
                }),
                tree,
                state_tx,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                worker: Mutex::new(None),
                listener_running: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Spawn the worker; further calls do nothing
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(agent_id = %self.inner.agent_id, "Starting discovery controller");
        let controller = self.clone();
        *self.inner.worker.lock() = Some(tokio::spawn(async move { controller.run().await }));
    }

    /// Request shutdown; the worker and listener exit promptly
    pub fn stop(&self) {
        {
            let mut shared = self.inner.shared.write();
            if shared.state != ControllerState::Stopped {
                info!(from = %shared.state, "Stopping discovery controller");
            }
            shared.state = ControllerState::Stopped;
            self.inner.state_tx.send_replace(ControllerState::Stopped);
        }
        self.inner.cancel.cancel();
    }

    /// Wait for the worker and listener tasks to finish
    pub async fn join(&self) {
        let worker = self.inner.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!(error = %e, "Discovery worker terminated abnormally");
            }
        }
        let listener = self.inner.listener.lock().take();
        if let Some(handle) = listener {
            if let Err(e) = handle.await {
                warn!(error = %e, "Packet listener terminated abnormally");
            }
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ControllerState {
        self.inner.shared.read().state
    }

    /// Receiver that observes every state change
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.inner.state_tx.subscribe()
    }

    /// Set the state to `next` only if it currently is `cond`
    pub fn set_state_if(&self, cond: ControllerState, next: ControllerState) -> bool {
        let mut shared = self.inner.shared.write();
        if shared.state != cond {
            return false;
        }
        shared.state = next;
        self.inner.state_tx.send_replace(next);
        info!(from = %cond, to = %next, "State transition");
        true
    }

    /// Apply the transition for `outcome` of the step that ran in `from`
    pub(crate) fn transition(&self, from: ControllerState, outcome: Outcome) -> bool {
        let next = next_state(from, outcome);
        next != from && self.set_state_if(from, next)
    }

    /// Current links, sorted by ingress port
    pub fn links(&self) -> Vec<Link> {
        self.inner.shared.read().registry.links()
    }

    /// Current hosts, sorted by MAC
    pub fn hosts(&self) -> Vec<Host> {
        self.inner.shared.read().registry.hosts()
    }

    /// Ports from the last enumeration, sorted by number
    pub fn ports(&self) -> Vec<Port> {
        self.inner.shared.read().registry.ports()
    }

    pub fn link_count(&self) -> usize {
        self.inner.shared.read().registry.link_count()
    }

    pub fn host_count(&self) -> usize {
        self.inner.shared.read().registry.host_count()
    }

    pub fn config(&self) -> Config {
        self.inner.shared.read().config
    }

    /// Pipeline seen during the last bootstrap
    pub fn pipeline(&self) -> Option<PipelineInfo> {
        self.inner.shared.read().pipeline.clone()
    }

    /// Record a link observation on `ingress_port`
    pub fn update_link(
        &self,
        ingress_port: u32,
        egress_port: u32,
        egress_device: &str,
    ) -> LinkUpdate {
        let now = Instant::now();
        let mut shared = self.inner.shared.write();
        let update = shared
            .registry
            .update_link(ingress_port, egress_port, egress_device, now);

        if update.is_change() {
            if let Some(link) = shared.registry.get_link(ingress_port) {
                TreeExporter::new(&self.inner.tree).add_link(link);
            }
            match &update {
                LinkUpdate::Replaced { previous } => info!(
                    port = ingress_port,
                    egress_port,
                    egress_device,
                    previous_device = %previous.egress_device,
                    previous_port = previous.egress_port,
                    "Link replaced"
                ),
                _ => info!(port = ingress_port, egress_port, egress_device, "Link discovered"),
            }
        }
        update
    }

    /// Record a host observation on `port`
    pub fn update_host(&self, mac: &str, ip: &str, port: u32) -> HostUpdate {
        let now = Instant::now();
        let mut shared = self.inner.shared.write();
        let update = shared.registry.update_host(mac, ip, port, now);

        if update.is_change() {
            if let Some(host) = shared.registry.get_host(mac) {
                TreeExporter::new(&self.inner.tree).add_host(host);
            }
            info!(mac, ip, port, "Host discovered");
        }
        update
    }

    /// Evict links older than the configured maximum age
    pub fn prune_links(&self) -> Vec<Link> {
        let now = Instant::now();
        let mut shared = self.inner.shared.write();
        let max_age = shared.config.link_max_age();
        let pruned = shared.registry.prune_links(now, max_age);

        let exporter = TreeExporter::new(&self.inner.tree);
        for link in &pruned {
            exporter.remove_link(link.ingress_port);
            info!(
                port = link.ingress_port,
                egress_device = %link.egress_device,
                "Pruned stale link"
            );
        }
        pruned
    }

    /// Evict hosts not seen within [`HOST_MAX_AGE`]
    pub fn prune_hosts(&self) -> Vec<Host> {
        let now = Instant::now();
        let mut shared = self.inner.shared.write();
        let pruned = shared.registry.prune_hosts(now, HOST_MAX_AGE);

        let exporter = TreeExporter::new(&self.inner.tree);
        for host in &pruned {
            exporter.remove_host(&host.mac);
            info!(mac = %host.mac, "Pruned stale host");
        }
        pruned
    }

    /// Replace the port registry and drop links on ports that are not up
    pub(crate) fn apply_ports(&self, ports: Vec<Port>) {
        let mut shared = self.inner.shared.write();
        let changes = shared.monitor.observe(&ports);
        shared.registry.replace_ports(ports);

        let exporter = TreeExporter::new(&self.inner.tree);
        for change in changes {
            if change.went_down() {
                info!(port = change.number, id = %change.id, "Port went down");
            } else {
                debug!(port = change.number, status = ?change.current, "Port changed");
            }
            if !change.is_up() && shared.registry.remove_link(change.number).is_some() {
                exporter.remove_link(change.number);
            }
        }
    }

    /// Send one probe out of every active port; returns how many were sent
    pub(crate) async fn emit_probes(&self) -> usize {
        let ports = self.inner.shared.read().registry.active_ports();
        let mut sent = 0;
        for port in ports {
            let frame = build_probe(&self.inner.agent_id, port.number);
            let result = self.call("packet_out", self.inner.session.packet_out(port.number, frame));
            if result.await.is_some() {
                sent += 1;
            }
        }
        debug!(sent, "Emitted probes");
        sent
    }

    /// Re-enumerate ports
    pub(crate) async fn rediscover_ports(&self) -> bool {
        match self.call("ports", self.inner.session.ports()).await {
            Some(ports) => {
                self.apply_ports(ports);
                true
            }
            None => false,
        }
    }

    /// Compare the device pipeline with the one seen during bootstrap
    pub(crate) async fn validate_pipeline(&self) -> Outcome {
        let Some(current) = self.call("pipeline_info", self.inner.session.pipeline_info()).await
        else {
            return Outcome::Failure;
        };
        let known = self.pipeline();
        if known.as_ref() == Some(&current) {
            return Outcome::Success;
        }
        warn!(
            pipeline = %current.name,
            cookie = current.cookie,
            "Device pipeline changed; rediscovering"
        );
        Outcome::PipelineChanged
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Run a session call, giving up early on cancellation; failures are logged
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = SessionResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => None,
            result = fut => match result {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(operation, error = %e, "Device session call failed");
                    None
                }
            },
        }
    }

    async fn run(self) {
        let mut backoff = Backoff::new();
        loop {
            let state = self.state();
            let outcome = match state {
                ControllerState::Stopped => break,
                ControllerState::Disconnected => self.connect().await,
                ControllerState::Connected => self.fetch_pipeline().await,
                ControllerState::PipelineAvailable => self.arbitrate().await,
                ControllerState::Elected => self.discover_ports().await,
                ControllerState::PortsDiscovered => self.configure().await,
                ControllerState::Configured => {
                    scheduler::run(&self).await;
                    continue;
                }
                ControllerState::Reconfigured => self.reconfigure(),
            };

            if outcome == Outcome::Failure {
                if !backoff.wait(&self.inner.cancel).await {
                    break;
                }
                continue;
            }
            backoff.reset();
            self.transition(state, outcome);
        }
        info!("Discovery worker stopped");
    }

    async fn connect(&self) -> Outcome {
        match self.call("connect", self.inner.session.connect()).await {
            Some(()) => Outcome::Success,
            None => Outcome::Failure,
        }
    }

    async fn fetch_pipeline(&self) -> Outcome {
        let Some(pipeline) = self.call("pipeline_info", self.inner.session.pipeline_info()).await
        else {
            return Outcome::Failure;
        };
        info!(pipeline = %pipeline.name, cookie = pipeline.cookie, "Pipeline available");
        self.inner.shared.write().pipeline = Some(pipeline);
        Outcome::Success
    }

    async fn arbitrate(&self) -> Outcome {
        let election_id = self.inner.options.election_id;
        match self.call("arbitrate", self.inner.session.arbitrate(election_id)).await {
            Some(Mastership::Primary) => {
                info!(election_id = %election_id, "Elected primary");
                Outcome::Success
            }
            Some(Mastership::Backup) => {
                warn!(election_id = %election_id, "Another controller is primary");
                Outcome::Failure
            }
            None => Outcome::Failure,
        }
    }

    async fn discover_ports(&self) -> Outcome {
        let Some(ports) = self.call("ports", self.inner.session.ports()).await else {
            return Outcome::Failure;
        };
        info!(count = ports.len(), "Ports discovered");
        self.apply_ports(ports);
        Outcome::Success
    }

    async fn configure(&self) -> Outcome {
        if self
            .call("install_intercept_rules", self.inner.session.install_intercept_rules())
            .await
            .is_none()
        {
            return Outcome::Failure;
        }

        if !self.inner.listener_running.load(Ordering::SeqCst) {
            let Some(packets) = self.call("packets", self.inner.session.packets()).await else {
                return Outcome::Failure;
            };
            self.inner.listener_running.store(true, Ordering::SeqCst);
            let controller = self.clone();
            let handle = tokio::spawn(async move {
                listener::run(&controller, packets).await;
                controller.inner.listener_running.store(false, Ordering::SeqCst);
            });
            *self.inner.listener.lock() = Some(handle);
        }
        info!("Intercept rules installed");
        Outcome::Success
    }

    fn reconfigure(&self) -> Outcome {
        let mut shared = self.inner.shared.write();
        let sanitized = shared.config.sanitized();
        if sanitized != shared.config {
            warn!("Non-positive tunables replaced with defaults");
            shared.config = sanitized;
            TreeExporter::new(&self.inner.tree).mirror_config(&self.inner.agent_id, &sanitized);
        }
        info!(config = ?shared.config, "Configuration applied");
        Outcome::Success
    }
}

impl Exportable for Controller {
    fn tree(&self) -> &ExportTree {
        &self.inner.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedSwitch;
    use linkagent_core::{apply_config_set, MemoryConfigStore, TypedValue, Update};
    use std::time::Duration;

    fn controller_with(sim: &Arc<SimulatedSwitch>, config: Config) -> Controller {
        Controller::new(
            "deviceA",
            sim.clone(),
            Arc::new(MemoryConfigStore::with_config(config)),
            ControllerOptions::default(),
        )
    }

    async fn wait_for_state(controller: &Controller, state: ControllerState) {
        let mut rx = controller.subscribe_state();
        // Cover a transition that happened before we subscribed
        if controller.state() == state {
            return;
        }
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn test_identical_update_is_silent() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        let controller = controller_with(&sim, Config::default());
        let mut rx = controller.tree().subscribe();

        assert!(matches!(controller.update_link(1, 7, "deviceB"), LinkUpdate::Added));
        assert_eq!(rx.try_recv().unwrap().updates.len(), 3);

        assert!(matches!(controller.update_link(1, 7, "deviceB"), LinkUpdate::Refreshed));
        assert!(rx.try_recv().is_err());

        assert!(matches!(
            controller.update_link(1, 8, "deviceB"),
            LinkUpdate::Replaced { .. }
        ));
        let n = rx.try_recv().unwrap();
        assert!(n
            .updates
            .iter()
            .any(|u| u.path == "state/link[port=1]/egress-port" && u.value == TypedValue::Int(8)));
        assert_eq!(controller.links().len(), 1);
    }

    #[tokio::test]
    async fn test_links_sorted() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        let controller = controller_with(&sim, Config::default());
        for port in [5, 1, 3] {
            controller.update_link(port, 1, "deviceB");
        }
        let ports: Vec<u32> = controller.links().iter().map(|l| l.ingress_port).collect();
        assert_eq!(ports, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_set_state_if_conditional() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        let controller = controller_with(&sim, Config::default());

        assert!(controller.set_state_if(ControllerState::Disconnected, ControllerState::Elected));
        assert!(!controller.set_state_if(
            ControllerState::Configured,
            ControllerState::Reconfigured
        ));
        assert_eq!(controller.state(), ControllerState::Elected);

        // A config update outside Configured does not force reconfiguration
        apply_config_set(
            &controller,
            vec![Update::new("config/maxLinkAge", TypedValue::Int(45))],
        )
        .unwrap();
        assert_eq!(controller.state(), ControllerState::Elected);
        assert_eq!(controller.config().max_link_age, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_prune() {
        let sim = Arc::new(SimulatedSwitch::new([1, 2]));
        let controller = controller_with(&sim, Config::default());
        controller.start();
        wait_for_state(&controller, ControllerState::Configured).await;
        assert_eq!(controller.ports().len(), 2);

        controller.update_link(1, 7, "deviceB");
        assert_eq!(controller.links().len(), 1);
        assert_eq!(controller.tree().get_int("state/link[port=1]/egress-port"), Some(7));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(controller.links().is_empty());
        assert!(controller.tree().snapshot("state/link").is_empty());

        controller.stop();
        controller.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.fail_next_connects(3);
        let controller = controller_with(&sim, Config::default());
        controller.start();

        wait_for_state(&controller, ControllerState::Configured).await;
        assert_eq!(sim.connect_attempts(), 4);

        controller.stop();
        controller.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_mastership_retries() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.set_mastership(Mastership::Backup);
        let controller = controller_with(&sim, Config::default());
        controller.start();

        wait_for_state(&controller, ControllerState::PipelineAvailable).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.state(), ControllerState::PipelineAvailable);
        assert!(sim.arbitration_attempts() > 1);

        sim.set_mastership(Mastership::Primary);
        wait_for_state(&controller, ControllerState::Configured).await;

        controller.stop();
        controller.join().await;
    }

    async fn assert_stops_in(sim: Arc<SimulatedSwitch>, state: ControllerState) {
        let controller = controller_with(&sim, Config::default());
        controller.start();
        wait_for_state(&controller, state).await;

        controller.stop();
        tokio::time::timeout(Duration::from_secs(1), controller.join())
            .await
            .expect("worker did not stop");
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_any_state() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.fail_next_connects(u32::MAX);
        assert_stops_in(sim, ControllerState::Disconnected).await;

        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.fail_next_pipeline_fetches(u32::MAX);
        assert_stops_in(sim, ControllerState::Connected).await;

        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.fail_next_arbitrations(u32::MAX);
        assert_stops_in(sim, ControllerState::PipelineAvailable).await;

        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.fail_next_port_enumerations(u32::MAX);
        assert_stops_in(sim, ControllerState::Elected).await;

        let sim = Arc::new(SimulatedSwitch::new([1]));
        sim.fail_next_rule_installs(u32::MAX);
        assert_stops_in(sim, ControllerState::PortsDiscovered).await;

        let sim = Arc::new(SimulatedSwitch::new([1]));
        assert_stops_in(sim, ControllerState::Configured).await;
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        let controller = controller_with(&sim, Config::default());
        controller.stop();
        controller.start();
        controller.join().await;
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(sim.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_down_evicts_link() {
        let sim = Arc::new(SimulatedSwitch::new([1, 2]));
        let config = Config {
            max_link_age: 600,
            port_rediscovery_frequency: 3,
            ..Config::default()
        };
        let controller = controller_with(&sim, config);
        controller.start();
        wait_for_state(&controller, ControllerState::Configured).await;

        controller.update_link(1, 7, "deviceB");
        controller.update_link(2, 9, "deviceC");
        sim.set_port_status(2, "DOWN");

        tokio::time::sleep(Duration::from_secs(4)).await;
        let links = controller.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].ingress_port, 1);
        assert!(controller.tree().get_path("state/link[port=2]/egress-port").is_none());

        controller.stop();
        controller.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_port_evicts_link() {
        let sim = Arc::new(SimulatedSwitch::new([1, 2, 3]));
        let config = Config {
            max_link_age: 600,
            port_rediscovery_frequency: 3,
            ..Config::default()
        };
        let controller = controller_with(&sim, config);
        controller.start();
        wait_for_state(&controller, ControllerState::Configured).await;

        controller.update_link(1, 7, "deviceB");
        controller.update_link(3, 9, "deviceC");
        sim.remove_port(3);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(controller.link_count(), 1);
        assert_eq!(controller.links()[0].ingress_port, 1);
        assert!(controller.ports().iter().all(|p| p.number != 3));
        assert!(controller.tree().snapshot("state/link[port=3]").is_empty());

        controller.stop();
        controller.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_links_snapshot_under_concurrent_mutation() {
        const PORTS: u32 = 32;
        let sim = Arc::new(SimulatedSwitch::new(1..=PORTS));
        let controller = controller_with(&sim, Config::default());

        let mut writers = Vec::new();
        for w in 0..2u32 {
            let controller = controller.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..2_000u32 {
                    let port = (i * 7 + w * 13) % PORTS + 1;
                    let device = if i % 2 == 0 { "deviceB" } else { "deviceC" };
                    controller.update_link(port, i % 5, device);
                    if i % 64 == 0 {
                        controller.prune_links();
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        // Flapping ports evict links between observations
        let churn = {
            let controller = controller.clone();
            tokio::spawn(async move {
                for round in 0..200u32 {
                    let status = if round % 2 == 0 { "DOWN" } else { "UP" };
                    let ports = (1..=PORTS)
                        .map(|n| {
                            let status = if n % 3 == round % 3 { status } else { "UP" };
                            Port::new(format!("port-{}", n), n, status)
                        })
                        .collect();
                    controller.apply_ports(ports);
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..3 {
            let controller = controller.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..2_000 {
                    let ports: Vec<u32> =
                        controller.links().iter().map(|l| l.ingress_port).collect();
                    assert!(
                        ports.windows(2).all(|w| w[0] < w[1]),
                        "snapshot not strictly ascending: {:?}",
                        ports
                    );
                    assert!(ports.iter().all(|p| (1..=PORTS).contains(p)));
                    tokio::task::yield_now().await;
                }
            }));
        }

        for handle in writers.into_iter().chain(readers).chain([churn]) {
            handle.await.unwrap();
        }

        let links = controller.links();
        assert_eq!(links.len(), controller.link_count());
        let ports: Vec<u32> = links.iter().map(|l| l.ingress_port).collect();
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_change_rebootstraps() {
        let sim = Arc::new(SimulatedSwitch::new([1]));
        let config = Config {
            pipeline_validation_frequency: 3,
            ..Config::default()
        };
        let controller = controller_with(&sim, config);
        controller.start();
        wait_for_state(&controller, ControllerState::Configured).await;
        assert_eq!(controller.pipeline().map(|p| p.cookie), Some(1));

        sim.set_pipeline_cookie(2);
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(controller.state(), ControllerState::Configured);
        assert_eq!(controller.pipeline().map(|p| p.cookie), Some(2));
        assert_eq!(sim.arbitration_attempts(), 2);
        assert_eq!(sim.rule_installs(), 2);

        controller.stop();
        controller.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cabled_ports_discover_each_other() {
        let sim = Arc::new(SimulatedSwitch::new([1, 2, 3]));
        sim.connect_ports(1, 2);
        let controller = controller_with(&sim, Config::default());
        controller.start();
        wait_for_state(&controller, ControllerState::Configured).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let links = controller.links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].ingress_port, 1);
        assert_eq!(links[0].egress_port, 2);
        assert_eq!(links[0].egress_device, "deviceA");
        assert_eq!(links[1].ingress_port, 2);
        assert_eq!(links[1].egress_port, 1);

        // Probes keep the links fresh well past the maximum age
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(controller.links().len(), 2);

        controller.stop();
        controller.join().await;
    }
}
