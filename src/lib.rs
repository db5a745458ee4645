//! A cluster fleet-telemetry Manager, built around a dynamic alarm engine.
//!
//! Remote agents push metric snapshots keyed by node id; the engine
//! instantiates per-node rules from user-defined templates, evaluates them
//! continuously against the live metric cache, and records
//! triggered/recovered events with templated message rendering.
//!
//! ## Core modules
//!
//! - [`cache`]: thread-safe last-value store with hierarchical path queries.
//! - [`alarm`]: condition trees, actions, templates/rules, the evaluator
//!   and provisioner.
//! - [`storage`]: relational persistence for templates and events.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kyro_alarm_manager::alarm::AlarmEvaluator;
//! use kyro_alarm_manager::cache::MetricCache;
//! use kyro_alarm_manager::storage::InMemoryEventRepository;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = Arc::new(MetricCache::new());
//! let events = Arc::new(InMemoryEventRepository::new());
//! let evaluator = Arc::new(AlarmEvaluator::new(cache.clone(), events, Duration::from_secs(1)));
//! evaluator.start();
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod alarm;
pub mod cache;
pub mod config;
pub mod error;
pub mod multicast;
pub mod node;
pub mod storage;
pub mod timeseries;
pub mod transport;

pub use alarm::{Action, AlarmEvaluator, AlarmRule, AlarmRuleTemplate, Condition, RuleProvisioner};
pub use cache::{MetricCache, MetricSnapshot};
pub use config::ManagerConfig;
pub use error::{ManagerError, ManagerResult};
pub use node::{NodeIdentity, NodeRegistry};
