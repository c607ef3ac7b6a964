//! Configuration updates arriving through the export tree

use crate::controller::Controller;
use crate::export::{config_path, TreeExporter};
use linkagent_core::{Config, Configurable, ControllerState, Exportable};
use tracing::{info, warn};

impl Controller {
    /// Read the five tunables back from the `config/` subtree
    fn config_from_tree(&self, current: Config) -> Config {
        let tree = self.tree();
        let mut config = current;
        for key in Config::KEYS {
            match tree.get_int(&config_path(key)) {
                Some(value) => {
                    config.set(key, value);
                }
                None => warn!(key, "Tunable missing from tree or not an integer; keeping current"),
            }
        }
        config
    }
}

impl Configurable for Controller {
    fn update_config(&self) {
        let (current, config) = {
            let mut shared = self.inner.shared.write();
            let current = shared.config;
            let raw = self.config_from_tree(current);
            let config = raw.sanitized();
            if config != raw {
                warn!(config = ?raw, "Non-positive tunables replaced with defaults");
                TreeExporter::new(self.tree()).mirror_config(self.agent_id(), &config);
            }
            shared.config = config;
            (current, config)
        };

        if let Err(e) = self.inner.store.save(&config) {
            warn!(error = %e, "Failed to persist configuration");
        }
        if config != current {
            info!(config = ?config, "Configuration updated");
        }

        self.set_state_if(ControllerState::Configured, ControllerState::Reconfigured);
    }

    fn refresh_config(&self) {}
}
