//! Node identity.
//!
//! Full node-identity CRUD, the status-monitor loop, and the agent-control
//! proxy calls are out of scope (they belong to the HTTP/agent-control
//! collaborators). This module carries only the identity record itself and
//! a trivial in-memory registry, since the admin API and [`crate::cache`]
//! need something to key liveness views by.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `(box_id, slot_id, cpu_id, host_ip)` identity of a compute node, as
/// announced by an agent on first contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Node id, as used throughout the alarm engine (`rule_id` suffix).
    pub node_id: String,
    /// Chassis/box identifier.
    pub box_id: i32,
    /// Slot within the box.
    pub slot_id: i32,
    /// CPU identifier within the slot.
    pub cpu_id: i32,
    /// Agent's reachable address.
    pub host_ip: IpAddr,
    /// When this identity was first registered.
    pub registered_at: DateTime<Utc>,
}

/// In-memory registry of known node identities.
///
/// This is not the authoritative node-identity store described in the
/// Manager's full scope (that store owns CRUD, status transitions, and
/// agent-control dispatch); it exists only so the admin surface can list
/// `(node_id -> identity)` alongside liveness data from the metric cache.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashMap<String, NodeIdentity>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a node's identity.
    pub fn upsert(&self, identity: NodeIdentity) {
        let mut nodes = self.nodes.lock().expect("node registry mutex poisoned");
        nodes.insert(identity.node_id.clone(), identity);
    }

    /// Looks up a node's identity by id.
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<NodeIdentity> {
        let nodes = self.nodes.lock().expect("node registry mutex poisoned");
        nodes.get(node_id).cloned()
    }

    /// Lists all known identities.
    #[must_use]
    pub fn list(&self) -> Vec<NodeIdentity> {
        let nodes = self.nodes.lock().expect("node registry mutex poisoned");
        nodes.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(node_id: &str) -> NodeIdentity {
        NodeIdentity {
            node_id: node_id.to_string(),
            box_id: 1,
            slot_id: 2,
            cpu_id: 0,
            host_ip: "127.0.0.1".parse().unwrap(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_then_get() {
        let registry = NodeRegistry::new();
        registry.upsert(sample("node-01"));
        assert_eq!(registry.get("node-01").unwrap().box_id, 1);
        assert!(registry.get("node-02").is_none());
    }

    #[test]
    fn upsert_replaces() {
        let registry = NodeRegistry::new();
        registry.upsert(sample("node-01"));
        let mut updated = sample("node-01");
        updated.box_id = 9;
        registry.upsert(updated);
        assert_eq!(registry.get("node-01").unwrap().box_id, 9);
        assert_eq!(registry.list().len(), 1);
    }
}
