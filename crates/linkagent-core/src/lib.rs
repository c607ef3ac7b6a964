//! linkagent Core - Core types, registries, tunables and export tree
//!
//! This crate provides the foundational types for the link discovery agent:
//! - Port, link and host records observed on the local device
//! - Registries with replace-or-refresh updates and staleness pruning
//! - Controller tunables and their file storage
//! - Export tree mirroring agent state to subscribers

pub mod config;
pub mod model;
pub mod registry;
pub mod state;
pub mod tree;

pub use config::{
    load_or_default, Config, ConfigError, ConfigStore, FileConfigStore, MemoryConfigStore,
};
pub use model::{Host, Link, Port, HOST_MAX_AGE};
pub use registry::{HostUpdate, LinkUpdate, Registry};
pub use state::ControllerState;
pub use tree::{
    apply_config_set, Configurable, ExportTree, Exportable, Notification, TreeError, TypedValue,
    Update,
};
