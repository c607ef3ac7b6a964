//! Mirror registry mutations into the export tree

use linkagent_core::tree::now_nanos;
use linkagent_core::{Config, ExportTree, Host, Link, Notification, TypedValue, Update};

pub const AGENT_ID_PATH: &str = "state/agent-id";

pub fn link_path(ingress_port: u32) -> String {
    format!("state/link[port={}]", ingress_port)
}

pub fn host_path(mac: &str) -> String {
    format!("state/host[mac={}]", mac)
}

pub fn config_path(key: &str) -> String {
    format!("config/{}", key)
}

/// Writes registry state into an [`ExportTree`], one notification per mutation
pub struct TreeExporter<'a> {
    tree: &'a ExportTree,
}

impl<'a> TreeExporter<'a> {
    pub fn new(tree: &'a ExportTree) -> Self {
        Self { tree }
    }

    /// Export a new or replaced link
    pub fn add_link(&self, link: &Link) {
        let base = link_path(link.ingress_port);
        let created = link.created_at.timestamp_nanos_opt().unwrap_or_else(now_nanos);
        self.write(vec![
            Update::new(
                format!("{}/egress-port", base),
                TypedValue::Int(i64::from(link.egress_port)),
            ),
            Update::new(
                format!("{}/egress-device", base),
                TypedValue::String(link.egress_device.clone()),
            ),
            Update::new(
                format!("{}/create-time", base),
                TypedValue::Uint(u64::try_from(created).unwrap_or_default()),
            ),
        ]);
    }

    pub fn remove_link(&self, ingress_port: u32) {
        self.delete(link_path(ingress_port));
    }

    /// Export a new or replaced host
    pub fn add_host(&self, host: &Host) {
        let base = host_path(&host.mac);
        let created = host.created_at.timestamp_nanos_opt().unwrap_or_else(now_nanos);
        self.write(vec![
            Update::new(format!("{}/port", base), TypedValue::Int(i64::from(host.port))),
            Update::new(
                format!("{}/ip-address", base),
                TypedValue::String(host.ip.clone()),
            ),
            Update::new(
                format!("{}/create-time", base),
                TypedValue::Uint(u64::try_from(created).unwrap_or_default()),
            ),
        ]);
    }

    pub fn remove_host(&self, mac: &str) {
        self.delete(host_path(mac));
    }

    /// Export the agent ID and all tunables
    pub fn mirror_config(&self, agent_id: &str, config: &Config) {
        let mut updates = vec![Update::new(
            AGENT_ID_PATH,
            TypedValue::String(agent_id.to_string()),
        )];
        updates.extend(
            config
                .entries()
                .into_iter()
                .map(|(key, value)| Update::new(config_path(key), TypedValue::Int(value))),
        );
        self.write(updates);
    }

    fn write(&self, updates: Vec<Update>) {
        for update in &updates {
            self.tree.add_path(&update.path, update.value.clone());
        }
        self.tree.publish(Notification::updates(updates));
    }

    fn delete(&self, path: String) {
        // Nothing exported under the path means nothing to announce
        if self.tree.delete_path(&path) > 0 {
            self.tree.publish(Notification::delete(path));
        }
    }
}
