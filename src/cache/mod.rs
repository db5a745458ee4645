//! Thread-safe, in-memory store for the most recent metric snapshot pushed
//! by each node, with hierarchical path queries over the stored JSON tree.
//!
//! This is the alarm engine's only window into the outside world: agents
//! push snapshots in, conditions read scalars out. Everything else (the
//! time-series store, the HTTP layer that decodes a wire format into a
//! [`MetricSnapshot`]) lives outside this module.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

/// A node's metric snapshot: an open JSON tree of objects/arrays/scalars.
/// The cache does not validate its shape.
pub use serde_json::Value as MetricSnapshot;

/// Default window used by [`MetricCache::active_node_ids`] when the caller
/// does not specify one.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(5 * 60);

static INDEXED_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\[(\w+)=([^\]]+)\]\.(\w+)$").expect("static regex"));
static SIMPLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\.(\w+)$").expect("static regex"));

struct NodeEntry {
    metrics: MetricSnapshot,
    last_updated: Instant,
}

/// Centralized, mutex-guarded cache of the latest metric snapshot per node.
///
/// Critical sections are deliberately tiny: a map insert on `update`, a map
/// lookup plus path resolution on `get_metric`, a single pass over the map
/// on `active_node_ids`. No lock is ever held across I/O.
pub struct MetricCache {
    nodes: Mutex<HashMap<String, NodeEntry>>,
}

impl Default for MetricCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces `node_id`'s snapshot and refreshes its liveness timestamp.
    pub fn update(&self, node_id: impl Into<String>, snapshot: MetricSnapshot) {
        let mut nodes = self.nodes.lock().expect("metric cache mutex poisoned");
        nodes.insert(
            node_id.into(),
            NodeEntry {
                metrics: snapshot,
                last_updated: Instant::now(),
            },
        );
    }

    /// Resolves `metric_name` against `node_id`'s last snapshot.
    ///
    /// Never fails: an unknown node, an unresolved path, or a non-numeric
    /// leaf all yield `0.0`.
    #[must_use]
    pub fn get_metric(&self, node_id: &str, metric_name: &str) -> f64 {
        let nodes = self.nodes.lock().expect("metric cache mutex poisoned");
        let Some(entry) = nodes.get(node_id) else {
            return 0.0;
        };
        resolve_path(&entry.metrics, metric_name)
    }

    /// Returns the ids of nodes whose last update is within `window` of now.
    #[must_use]
    pub fn active_node_ids(&self, window: Duration) -> Vec<String> {
        let nodes = self.nodes.lock().expect("metric cache mutex poisoned");
        let now = Instant::now();
        nodes
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_updated) < window)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// `active_node_ids` with the default five-minute window.
    #[must_use]
    pub fn active_node_ids_default(&self) -> Vec<String> {
        self.active_node_ids(DEFAULT_LIVENESS_WINDOW)
    }
}

/// Implements the first-match-wins path resolution grammar: indexed
/// `a[k=v].c`, simple `a.b`, JSON pointer, direct key, else `0.0`.
fn resolve_path(snapshot: &MetricSnapshot, path: &str) -> f64 {
    if let Some(caps) = INDEXED_PATH.captures(path) {
        let array_key = &caps[1];
        let match_key = &caps[2];
        let match_value = &caps[3];
        let target_key = &caps[4];
        if let Some(array) = snapshot.get(array_key).and_then(|v| v.as_array()) {
            for element in array {
                let matches = element
                    .get(match_key)
                    .map(|v| json_value_equals_str(v, match_value))
                    .unwrap_or(false);
                if matches {
                    return element
                        .get(target_key)
                        .and_then(as_f64_lenient)
                        .unwrap_or(0.0);
                }
            }
        }
        return 0.0;
    }

    if let Some(caps) = SIMPLE_PATH.captures(path) {
        let a = &caps[1];
        let b = &caps[2];
        return snapshot
            .get(a)
            .and_then(|v| v.get(b))
            .and_then(as_f64_lenient)
            .unwrap_or(0.0);
    }

    if let Some(v) = snapshot.pointer(path) {
        if let Some(n) = as_f64_lenient(v) {
            return n;
        }
    }

    snapshot
        .get(path)
        .and_then(as_f64_lenient)
        .unwrap_or(0.0)
}

/// Numeric cast matching the source's `.get<double>()` behavior: numbers
/// cast directly, everything else (string, bool, object, array, null)
/// yields `None` so the caller falls back to the `0.0` sentinel.
fn as_f64_lenient(value: &MetricSnapshot) -> Option<f64> {
    value.as_f64()
}

/// Indexed-path match keys are compared as strings per spec §9's Open
/// Questions resolution (numeric `index` matching left as an extension).
fn json_value_equals_str(value: &MetricSnapshot, literal: &str) -> bool {
    match value {
        MetricSnapshot::String(s) => s == literal,
        MetricSnapshot::Number(n) => n.to_string() == literal,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_node_is_zero() {
        let cache = MetricCache::new();
        assert_eq!(cache.get_metric("ghost", "cpu.usage_percent"), 0.0);
    }

    #[test]
    fn simple_path_resolves() {
        let cache = MetricCache::new();
        cache.update("node-01", json!({ "cpu": { "usage_percent": 12.8 } }));
        assert_eq!(cache.get_metric("node-01", "cpu.usage_percent"), 12.8);
    }

    #[test]
    fn indexed_path_resolves() {
        let cache = MetricCache::new();
        cache.update(
            "node-01",
            json!({ "disk": [
                { "path": "/dev/sda1", "usage_percent": 93.5 },
                { "path": "/dev/sdb1", "usage_percent": 10.0 },
            ]}),
        );
        assert_eq!(
            cache.get_metric("node-01", "disk[path=/dev/sda1].usage_percent"),
            93.5
        );
        assert_eq!(
            cache.get_metric("node-01", "disk[path=/dev/sdc1].usage_percent"),
            0.0
        );
    }

    #[test]
    fn non_numeric_leaf_is_zero() {
        let cache = MetricCache::new();
        cache.update("node-01", json!({ "cpu": { "state": "ok" } }));
        assert_eq!(cache.get_metric("node-01", "cpu.state"), 0.0);
    }

    #[test]
    fn direct_key_fallback() {
        let cache = MetricCache::new();
        cache.update("node-01", json!({ "uptime_seconds": 42.0 }));
        assert_eq!(cache.get_metric("node-01", "uptime_seconds"), 42.0);
    }

    #[test]
    fn active_window_boundary() {
        let cache = MetricCache::new();
        cache.update("node-01", json!({}));
        assert!(cache
            .active_node_ids(Duration::from_secs(60))
            .contains(&"node-01".to_string()));
        assert!(cache
            .active_node_ids(Duration::from_nanos(0))
            .is_empty());
    }
}
