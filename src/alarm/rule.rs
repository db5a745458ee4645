//! [`AlarmRuleTemplate`] and its node-bound instantiation, [`AlarmRule`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alarm::action::Action;
use crate::alarm::condition::Condition;
use crate::cache::MetricCache;

/// Immutable, user-authored alarm specification. One template instantiates
/// one [`AlarmRule`] per active node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRuleTemplate {
    /// Unique template identifier.
    pub template_id: String,
    /// Metric path resolved against each node's snapshot.
    pub metric_name: String,
    /// Free-form alarm category, e.g. `"cpu"`.
    pub alarm_type: String,
    /// Free-form severity, e.g. `"critical"`.
    pub alarm_level: String,
    /// Message template with `{placeholder}` substitutions (see
    /// [`crate::alarm::render`]).
    pub content_template: String,
    /// Consecutive satisfied evaluations required before firing.
    pub trigger_count_threshold: u32,
    /// Whether this template currently participates in provisioning.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Condition tree evaluated against the resolved metric value.
    pub condition: Condition,
    /// Actions dispatched on every triggered/recovered transition, in order.
    pub actions: Vec<Action>,
}

fn default_enabled() -> bool {
    true
}

/// A template bound to one active node; the unit the evaluator ticks over.
pub struct AlarmRule {
    /// `template_id + ":" + node_id`, unique within the evaluator's rule map.
    pub rule_id: String,
    /// Originating template id.
    pub template_id: String,
    /// Bound node id.
    pub node_id: String,
    /// Copied from the template at instantiation time.
    pub metric_name: String,
    /// Copied from the template at instantiation time.
    pub alarm_type: String,
    /// Copied from the template at instantiation time.
    pub alarm_level: String,
    /// Copied from the template at instantiation time.
    pub content_template: String,
    /// Copied from the template at instantiation time.
    pub trigger_count_threshold: u32,
    /// Copied from the template at instantiation time.
    pub condition: Condition,
    /// Copied from the template at instantiation time.
    pub actions: Vec<Action>,
    /// Bound resource closure: reads the current metric value from the cache.
    pub(crate) resource: Box<dyn Fn() -> f64 + Send + Sync>,
    /// Whether the rule is currently in the triggered state.
    pub is_triggered: bool,
    /// Consecutive evaluations for which the condition held, since the last
    /// reset. Capped at `trigger_count_threshold` once triggered.
    pub consecutive_trigger_count: u32,
    /// Value read on the most recent evaluation.
    pub last_value: f64,
}

impl AlarmRule {
    /// Instantiates a rule from `template` bound to `node_id`, capturing a
    /// resource closure over `cache`.
    #[must_use]
    pub fn new(template: &AlarmRuleTemplate, node_id: impl Into<String>, cache: Arc<MetricCache>) -> Self {
        let node_id = node_id.into();
        let rule_id = format!("{}:{}", template.template_id, node_id);
        let metric_name = template.metric_name.clone();
        let bound_node = node_id.clone();
        let bound_metric = metric_name.clone();
        let resource: Box<dyn Fn() -> f64 + Send + Sync> =
            Box::new(move || cache.get_metric(&bound_node, &bound_metric));

        Self {
            rule_id,
            template_id: template.template_id.clone(),
            node_id,
            metric_name,
            alarm_type: template.alarm_type.clone(),
            alarm_level: template.alarm_level.clone(),
            content_template: template.content_template.clone(),
            trigger_count_threshold: template.trigger_count_threshold.max(1),
            condition: template.condition.clone(),
            actions: template.actions.clone(),
            resource,
            is_triggered: false,
            consecutive_trigger_count: 0,
            last_value: 0.0,
        }
    }

    /// Reads the current value from the bound resource, caching it as
    /// `last_value`.
    pub fn sample(&mut self) -> f64 {
        let value = (self.resource)();
        self.last_value = value;
        value
    }

    /// Human-readable resource name, used for the `{resourceName}` content
    /// placeholder.
    #[must_use]
    pub fn resource_name(&self) -> String {
        format!("Metric '{}' on node '{}'", self.metric_name, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::action::Action;
    use serde_json::json;

    fn template() -> AlarmRuleTemplate {
        AlarmRuleTemplate {
            template_id: "cpu-crit".to_string(),
            metric_name: "cpu.usage_percent".to_string(),
            alarm_type: "cpu".to_string(),
            alarm_level: "critical".to_string(),
            content_template: "{state} on {nodeId}".to_string(),
            trigger_count_threshold: 3,
            enabled: true,
            condition: Condition::GreaterThan { threshold: 90.0 },
            actions: vec![Action::Log { params: None }],
        }
    }

    #[test]
    fn rule_id_is_template_colon_node() {
        let cache = Arc::new(MetricCache::new());
        let rule = AlarmRule::new(&template(), "node-01", cache);
        assert_eq!(rule.rule_id, "cpu-crit:node-01");
    }

    #[test]
    fn sample_reads_bound_metric() {
        let cache = Arc::new(MetricCache::new());
        cache.update("node-01", json!({ "cpu": { "usage_percent": 95.0 } }));
        let mut rule = AlarmRule::new(&template(), "node-01", cache);
        assert_eq!(rule.sample(), 95.0);
        assert_eq!(rule.last_value, 95.0);
    }
}
