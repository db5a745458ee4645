//! Declarative, stateless side effects dispatched on rule transitions.

use serde::{Deserialize, Serialize};
use serde_json::Value as Params;
use tracing::{error, warn};

use crate::alarm::render::render;
use crate::alarm::rule::AlarmRule;
use crate::alarm::EventKind;
use crate::storage::event_repo::AlarmEventRepository;

/// A single declarative action. `params` is accepted and round-tripped
/// through persistence for both variants but is not currently interpreted
/// by either built-in sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Writes a colorized, timestamped line to stdout.
    Log {
        /// Reserved for future sink configuration.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Params>,
    },
    /// Inserts an event row via the event repository.
    Database {
        /// Reserved for future sink configuration.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Params>,
    },
}

impl Action {
    /// Type tag used when persisting this action (`alarm_actions.action_type`).
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Action::Log { .. } => "Log",
            Action::Database { .. } => "Database",
        }
    }

    /// Reserved params payload, if any.
    #[must_use]
    pub fn params(&self) -> Option<&Params> {
        match self {
            Action::Log { params } | Action::Database { params } => params.as_ref(),
        }
    }

    /// Dispatches this action for `rule`, whose `is_triggered` flag at call
    /// time determines whether this fire is a trigger or a recovery.
    ///
    /// Persistence failures are logged and swallowed per the evaluator's
    /// contract: a bad `Database` action must never abort the tick.
    pub fn execute(&self, rule: &AlarmRule, event_repo: &dyn AlarmEventRepository) {
        let kind = if rule.is_triggered {
            EventKind::Triggered
        } else {
            EventKind::Recovered
        };
        match self {
            Action::Log { .. } => {
                let details = render(rule, kind);
                let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                println!(
                    "\x1b[1;31m[ALARM {kind}] {now} | Rule ID: {} | Details: {details}\x1b[0m",
                    rule.rule_id,
                );
            }
            Action::Database { .. } => {
                if let Err(err) = event_repo.insert_event(rule, kind) {
                    error!(rule_id = %rule.rule_id, error = %err, "failed to persist alarm event");
                    warn!("database action no-op for this tick due to persistence error");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags() {
        assert_eq!(Action::Log { params: None }.type_tag(), "Log");
        assert_eq!(Action::Database { params: None }.type_tag(), "Database");
    }

    #[test]
    fn json_shape() {
        let action = Action::Log { params: None };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "Log");
        assert!(json.get("params").is_none());
    }
}
