//! Condition tree: a pure, serializable predicate over a scalar reading.
//!
//! Conditions form a tree, never a shared DAG — each node is owned by
//! exactly one parent, matching how the relational schema persists them
//! (every `saveTemplate` call inserts fresh rows, never reuses an id across
//! templates).

use serde::{Deserialize, Serialize};

/// A tagged condition tree. Leaves compare a scalar against a threshold;
/// composites combine child conditions with boolean logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Condition {
    /// Triggers when the evaluated value is strictly greater than `threshold`.
    GreaterThan {
        /// Comparison threshold.
        threshold: f64,
    },
    /// Triggers when the evaluated value is strictly less than `threshold`.
    LessThan {
        /// Comparison threshold.
        threshold: f64,
    },
    /// True iff every child condition is true. Short-circuits on the first
    /// false child.
    And {
        /// Child conditions, evaluated in order.
        conditions: Vec<Condition>,
    },
    /// True iff any child condition is true. Short-circuits on the first
    /// true child.
    Or {
        /// Child conditions, evaluated in order.
        conditions: Vec<Condition>,
    },
    /// Negation of a single child condition.
    Not {
        /// The negated condition.
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Evaluates the tree against `value`. Pure, deterministic, no I/O.
    #[must_use]
    pub fn is_triggered(&self, value: f64) -> bool {
        match self {
            Condition::GreaterThan { threshold } => value > *threshold,
            Condition::LessThan { threshold } => value < *threshold,
            Condition::And { conditions } => conditions.iter().all(|c| c.is_triggered(value)),
            Condition::Or { conditions } => conditions.iter().any(|c| c.is_triggered(value)),
            Condition::Not { condition } => !condition.is_triggered(value),
        }
    }

    /// Human-readable expression, used to fill the `{condition}` content
    /// placeholder.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Condition::GreaterThan { threshold } => format!("is greater than {threshold}"),
            Condition::LessThan { threshold } => format!("is less than {threshold}"),
            Condition::And { conditions } => {
                format!(
                    "({})",
                    conditions
                        .iter()
                        .map(Condition::description)
                        .collect::<Vec<_>>()
                        .join(" AND ")
                )
            }
            Condition::Or { conditions } => {
                format!(
                    "({})",
                    conditions
                        .iter()
                        .map(Condition::description)
                        .collect::<Vec<_>>()
                        .join(" OR ")
                )
            }
            Condition::Not { condition } => format!("NOT ({})", condition.description()),
        }
    }

    /// Type tag used when persisting this node (`alarm_conditions.condition_type`).
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Condition::GreaterThan { .. } => "GreaterThan",
            Condition::LessThan { .. } => "LessThan",
            Condition::And { .. } => "And",
            Condition::Or { .. } => "Or",
            Condition::Not { .. } => "Not",
        }
    }

    /// Threshold, meaningful only for leaf conditions; `0.0` for composites.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        match self {
            Condition::GreaterThan { threshold } | Condition::LessThan { threshold } => *threshold,
            _ => 0.0,
        }
    }

    /// Direct children, in persisted order. Leaves return an empty slice.
    #[must_use]
    pub fn children(&self) -> Vec<&Condition> {
        match self {
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().collect()
            }
            Condition::Not { condition } => vec![condition.as_ref()],
            Condition::GreaterThan { .. } | Condition::LessThan { .. } => Vec::new(),
        }
    }
}
