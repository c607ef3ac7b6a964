//! Daemon configuration loading

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the API server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Chassis ID advertised in probes
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    /// File holding the controller tunables
    #[serde(default = "default_tunables_path")]
    pub tunables_path: String,
    /// Emit probes as soon as the controller is configured
    #[serde(default = "default_true")]
    pub emit_on_configure: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            agent_id: default_agent_id(),
            tunables_path: default_tunables_path(),
            emit_on_configure: true,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_agent_id() -> String {
    "linkagent".to_string()
}

fn default_tunables_path() -> String {
    "./linkagent-tunables.toml".to_string()
}

fn default_true() -> bool {
    true
}

/// Simulated switch the controller drives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Port numbers, all initially up
    #[serde(default = "default_ports")]
    pub ports: Vec<u32>,
    /// Pairs of ports patched to each other
    #[serde(default)]
    pub cables: Vec<[u32; 2]>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            cables: Vec::new(),
        }
    }
}

fn default_ports() -> Vec<u32> {
    vec![1, 2, 3, 4]
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.daemon.agent_id, "linkagent");
        assert!(config.daemon.emit_on_configure);
        assert_eq!(config.simulator.ports, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linkagent.toml");
        std::fs::write(
            &path,
            r#"
[daemon]
agent_id = "leaf-1"
emit_on_configure = false

[simulator]
ports = [1, 2]
cables = [[1, 2]]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.daemon.agent_id, "leaf-1");
        assert!(!config.daemon.emit_on_configure);
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.simulator.cables, vec![[1, 2]]);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linkagent.toml");
        std::fs::write(&path, "[daemon\nbind = ").unwrap();
        assert!(load_config(&path).is_err());
    }
}
