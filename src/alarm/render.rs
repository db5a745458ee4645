//! Content-template placeholder substitution, shared by the `Log` action
//! and the event repository's `details` column.

use crate::alarm::rule::AlarmRule;
use crate::alarm::EventKind;

/// Expands `{placeholder}` tokens in `rule.content_template` against `rule`
/// and the firing `kind`. Unknown placeholders are left literal.
#[must_use]
pub fn render(rule: &AlarmRule, kind: EventKind) -> String {
    let mut message = rule.content_template.clone();
    let substitutions: [(&str, String); 9] = [
        ("{ruleId}", rule.rule_id.clone()),
        ("{templateId}", rule.template_id.clone()),
        ("{metricName}", rule.metric_name.clone()),
        ("{alarmType}", rule.alarm_type.clone()),
        ("{alarmLevel}", rule.alarm_level.clone()),
        ("{resourceName}", rule.resource_name()),
        ("{value}", format_value(rule.last_value)),
        ("{condition}", rule.condition.description()),
        ("{state}", kind.as_str().to_string()),
    ];
    for (placeholder, value) in substitutions {
        message = message.replace(placeholder, &value);
    }
    message = message.replace("{nodeId}", &rule.node_id);
    message
}

/// Stringifies a value the way the C++ source's `std::to_string` would,
/// trimmed of trailing zeroes beyond what `f64`'s `Display` already omits.
fn format_value(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::action::Action;
    use crate::alarm::condition::Condition;
    use crate::alarm::rule::AlarmRuleTemplate;
    use crate::cache::MetricCache;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn renders_all_placeholders() {
        let template = AlarmRuleTemplate {
            template_id: "t".to_string(),
            metric_name: "cpu.usage_percent".to_string(),
            alarm_type: "cpu".to_string(),
            alarm_level: "critical".to_string(),
            content_template: "{state} on {nodeId}: {metricName}={value}".to_string(),
            trigger_count_threshold: 1,
            enabled: true,
            condition: Condition::GreaterThan { threshold: 90.0 },
            actions: vec![Action::Log { params: None }],
        };
        let cache = Arc::new(MetricCache::new());
        cache.update("node-7", json!({ "cpu": { "usage_percent": 91.2 } }));
        let mut rule = AlarmRule::new(&template, "node-7", cache);
        rule.sample();

        let details = render(&rule, EventKind::Triggered);
        assert_eq!(details, "TRIGGERED on node-7: cpu.usage_percent=91.2");
    }
}
