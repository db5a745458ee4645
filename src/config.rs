//! Loads the Manager's configuration from a TOML file with environment
//! overrides (`MANAGER_*`), mirroring the original's thin `ConfigManager`
//! but using the `config` crate's layered-source builder rather than
//! hand-rolled key lookups.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Top-level Manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Address the admin HTTP surface binds to.
    pub listen_addr: String,
    /// Path to the sqlite database file (`:memory:` for ephemeral runs).
    pub sqlite_path: String,
    /// Evaluator tick interval, in milliseconds.
    pub evaluator_tick_ms: u64,
    /// Provisioner sync interval, in seconds.
    pub provisioner_sync_secs: u64,
    /// Liveness window used to determine active nodes, in seconds.
    pub liveness_window_secs: u64,
    /// UDP multicast group address the announcer sends to.
    pub multicast_addr: String,
    /// UDP multicast port.
    pub multicast_port: u16,
    /// Multicast announce interval, in seconds.
    pub multicast_interval_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            sqlite_path: "alarm_manager.sqlite".to_string(),
            evaluator_tick_ms: 1_000,
            provisioner_sync_secs: 20,
            liveness_window_secs: 300,
            multicast_addr: "239.1.1.1".to_string(),
            multicast_port: 9898,
            multicast_interval_secs: 5,
        }
    }
}

impl ManagerConfig {
    /// Loads configuration from `path` (if it exists) layered under
    /// built-in defaults, then applies `MANAGER_*` environment overrides
    /// (e.g. `MANAGER_LISTEN_ADDR`).
    pub fn load(path: &str) -> Result<Self, ManagerError> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|err| ManagerError::Config(err.to_string()))?;

        let built = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("MANAGER"))
            .build()
            .map_err(|err| ManagerError::Config(err.to_string()))?;

        built
            .try_deserialize()
            .map_err(|err| ManagerError::Config(err.to_string()))
    }

    /// [`Self::evaluator_tick_ms`] as a [`Duration`].
    #[must_use]
    pub fn evaluator_tick(&self) -> Duration {
        Duration::from_millis(self.evaluator_tick_ms)
    }

    /// [`Self::provisioner_sync_secs`] as a [`Duration`].
    #[must_use]
    pub fn provisioner_sync_interval(&self) -> Duration {
        Duration::from_secs(self.provisioner_sync_secs)
    }

    /// [`Self::liveness_window_secs`] as a [`Duration`].
    #[must_use]
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    /// [`Self::multicast_interval_secs`] as a [`Duration`].
    #[must_use]
    pub fn multicast_interval(&self) -> Duration {
        Duration::from_secs(self.multicast_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.evaluator_tick(), Duration::from_secs(1));
        assert_eq!(cfg.provisioner_sync_interval(), Duration::from_secs(20));
        assert_eq!(cfg.liveness_window(), Duration::from_secs(300));
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let cfg = ManagerConfig::load("/nonexistent/path/manager.toml").unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn load_applies_file_overrides_on_top_of_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("manager.toml");
        std::fs::write(&path, "listen_addr = \"0.0.0.0:9000\"\nprovisioner_sync_secs = 5\n")
            .expect("write temp config");

        let cfg = ManagerConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
        assert_eq!(cfg.provisioner_sync_interval(), Duration::from_secs(5));
        // Untouched fields keep their defaults.
        assert_eq!(cfg.liveness_window(), Duration::from_secs(300));
    }
}
