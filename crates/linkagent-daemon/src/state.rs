//! Application state management

use linkagent_core::FileConfigStore;
use linkagent_discovery::{Controller, ControllerOptions, SimulatedSwitch};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Discovery controller
    pub controller: Controller,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Build the simulated switch and a controller for it; the controller is not started
    pub fn new(config: Config) -> Arc<Self> {
        let switch = Arc::new(SimulatedSwitch::new(config.simulator.ports.iter().copied()));
        for [a, b] in &config.simulator.cables {
            switch.connect_ports(*a, *b);
        }
        info!(
            ports = config.simulator.ports.len(),
            cables = config.simulator.cables.len(),
            "Simulated switch ready"
        );

        let store = Arc::new(FileConfigStore::new(&config.daemon.tunables_path));
        let options = ControllerOptions {
            emit_on_configure: config.daemon.emit_on_configure,
            ..ControllerOptions::default()
        };
        let controller = Controller::new(&config.daemon.agent_id, switch, store, options);

        Arc::new(Self { controller, config })
    }
}
