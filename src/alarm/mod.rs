//! The alarm engine: condition trees, declarative actions, rule templates,
//! the evaluator that ticks rule state machines, and the provisioner that
//! keeps the evaluator's rule set in sync with live nodes.

use std::fmt;

pub mod action;
pub mod condition;
pub mod evaluator;
pub mod provisioner;
pub mod render;
pub mod rule;

pub use action::Action;
pub use condition::Condition;
pub use evaluator::AlarmEvaluator;
pub use provisioner::RuleProvisioner;
pub use rule::{AlarmRule, AlarmRuleTemplate};

/// Which way a rule just transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `is_triggered` flipped false -> true.
    Triggered,
    /// `is_triggered` flipped true -> false.
    Recovered,
}

impl EventKind {
    /// String form persisted in `alarm_events.event_type` and substituted
    /// for the `{state}` content placeholder.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Triggered => "TRIGGERED",
            EventKind::Recovered => "RECOVERED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
