//! Controller lifecycle states

use serde::{Deserialize, Serialize};

/// Position of the discovery controller in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Initial state, no device session yet
    #[default]
    Disconnected,
    /// Device session established
    Connected,
    /// Pipeline capability description obtained
    PipelineAvailable,
    /// Mastership arbitration won
    Elected,
    /// Device ports enumerated
    PortsDiscovered,
    /// Intercept rules installed, discovering links and hosts
    Configured,
    /// New configuration received while configured
    Reconfigured,
    /// Stop requested; terminal
    Stopped,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::PipelineAvailable => "pipeline_available",
            Self::Elected => "elected",
            Self::PortsDiscovered => "ports_discovered",
            Self::Configured => "configured",
            Self::Reconfigured => "reconfigured",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
