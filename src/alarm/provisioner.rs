//! Reconciles `templates × active_nodes` into the evaluator's rule set on a
//! timer, without disturbing manually-added rules.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::alarm::evaluator::AlarmEvaluator;
use crate::alarm::rule::{AlarmRule, AlarmRuleTemplate};
use crate::cache::MetricCache;

/// Default synchronize interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(20);

struct StopSignal {
    lock: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            lock: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock.lock().expect("provisioner stop mutex poisoned");
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .expect("provisioner stop mutex poisoned");
        *guard
    }

    fn signal(&self) {
        let mut guard = self.lock.lock().expect("provisioner stop mutex poisoned");
        *guard = true;
        self.cv.notify_all();
    }
}

/// Owns the current template set and periodically reconciles it against
/// the metric cache's active-node view.
pub struct RuleProvisioner {
    cache: Arc<MetricCache>,
    evaluator: Arc<AlarmEvaluator>,
    templates: Mutex<Vec<AlarmRuleTemplate>>,
    sync_interval: Duration,
    liveness_window: Duration,
    stop: Arc<StopSignal>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl RuleProvisioner {
    /// Creates a provisioner over `cache`/`evaluator`, syncing every
    /// `sync_interval` using `liveness_window` to decide node activity.
    #[must_use]
    pub fn new(
        cache: Arc<MetricCache>,
        evaluator: Arc<AlarmEvaluator>,
        sync_interval: Duration,
        liveness_window: Duration,
    ) -> Self {
        Self {
            cache,
            evaluator,
            templates: Mutex::new(Vec::new()),
            sync_interval,
            liveness_window,
            stop: Arc::new(StopSignal::new()),
            join: Mutex::new(None),
        }
    }

    /// Replaces the full template set used by subsequent `synchronize` calls.
    pub fn set_templates(&self, templates: Vec<AlarmRuleTemplate>) {
        let mut guard = self.templates.lock().expect("template list mutex poisoned");
        *guard = templates;
    }

    /// Runs one reconciliation pass.
    pub fn synchronize(&self) {
        let templates = self.templates.lock().expect("template list mutex poisoned").clone();
        let active = self.cache.active_node_ids(self.liveness_window);
        let active_set: HashSet<&str> = active.iter().map(String::as_str).collect();

        let required: HashSet<String> = templates
            .iter()
            .filter(|t| t.enabled)
            .flat_map(|t| active_set.iter().map(move |n| format!("{}:{n}", t.template_id)))
            .collect();

        let existing: HashSet<String> = self.evaluator.managed_rule_ids().into_iter().collect();

        for rule_id in required.difference(&existing) {
            let Some((template_id, node_id)) = rule_id.split_once(':') else {
                continue;
            };
            let Some(template) = templates.iter().find(|t| t.template_id == template_id) else {
                continue;
            };
            let rule = AlarmRule::new(template, node_id, Arc::clone(&self.cache));
            debug!(rule_id = %rule.rule_id, "provisioning new rule");
            self.evaluator.add_rule(rule);
        }

        for rule_id in existing.difference(&required) {
            if rule_id.contains(':') {
                debug!(rule_id = %rule_id, "deprovisioning stale rule");
                self.evaluator.remove_rule(rule_id);
            }
        }
    }

    /// Starts the background sync loop. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut join = self.join.lock().expect("provisioner join mutex poisoned");
        if join.is_some() {
            return;
        }
        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("rule-provisioner".to_string())
            .spawn(move || this.run())
            .expect("failed to spawn rule provisioner thread");
        *join = Some(handle);
    }

    fn run(&self) {
        info!(interval_s = self.sync_interval.as_secs(), "rule provisioner started");
        loop {
            self.synchronize();
            if self.stop.wait(self.sync_interval) {
                break;
            }
        }
        info!("rule provisioner stopped");
    }

    /// Signals the sync loop to stop and blocks until it has exited.
    /// Idempotent.
    pub fn stop(&self) {
        self.stop.signal();
        let mut join = self.join.lock().expect("provisioner join mutex poisoned");
        if let Some(handle) = join.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::action::Action;
    use crate::alarm::condition::Condition;
    use crate::storage::event_repo::InMemoryEventRepository;
    use serde_json::json;

    fn template(id: &str) -> AlarmRuleTemplate {
        AlarmRuleTemplate {
            template_id: id.to_string(),
            metric_name: "cpu.usage_percent".to_string(),
            alarm_type: "cpu".to_string(),
            alarm_level: "critical".to_string(),
            content_template: "{state}".to_string(),
            trigger_count_threshold: 1,
            enabled: true,
            condition: Condition::GreaterThan { threshold: 90.0 },
            actions: vec![Action::Log { params: None }],
        }
    }

    fn setup() -> (Arc<MetricCache>, Arc<AlarmEvaluator>, Arc<RuleProvisioner>) {
        let cache = Arc::new(MetricCache::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let evaluator = Arc::new(AlarmEvaluator::new(cache.clone(), events, Duration::from_secs(1)));
        let provisioner = Arc::new(RuleProvisioner::new(
            cache.clone(),
            evaluator.clone(),
            Duration::from_secs(20),
            Duration::from_secs(300),
        ));
        (cache, evaluator, provisioner)
    }

    #[test]
    fn reconciles_templates_times_active_nodes() {
        let (cache, evaluator, provisioner) = setup();
        provisioner.set_templates(vec![template("tpl-A"), template("tpl-B")]);
        cache.update("n1", json!({}));
        cache.update("n2", json!({}));

        provisioner.synchronize();

        let mut managed: Vec<String> = evaluator.managed_rule_ids();
        managed.sort();
        assert_eq!(
            managed,
            vec!["tpl-A:n1", "tpl-A:n2", "tpl-B:n1", "tpl-B:n2"]
        );
    }

    #[test]
    fn removes_rules_for_nodes_that_go_silent() {
        let window = Duration::from_millis(50);
        let cache = Arc::new(MetricCache::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let evaluator = Arc::new(AlarmEvaluator::new(cache.clone(), events, Duration::from_secs(1)));
        let provisioner = RuleProvisioner::new(cache.clone(), evaluator.clone(), Duration::from_secs(20), window);

        provisioner.set_templates(vec![template("tpl-A")]);
        cache.update("n1", json!({}));
        cache.update("n2", json!({}));
        provisioner.synchronize();
        assert_eq!(evaluator.managed_rule_ids().len(), 2);

        // n2 goes silent: only n1 gets refreshed before the window elapses.
        std::thread::sleep(Duration::from_millis(60));
        cache.update("n1", json!({}));
        provisioner.synchronize();

        let managed = evaluator.managed_rule_ids();
        assert_eq!(managed, vec!["tpl-A:n1".to_string()]);
    }

    #[test]
    fn preserves_manually_added_rules() {
        let (cache, evaluator, provisioner) = setup();
        let manual = AlarmRule::new(&template("manual-rule"), "orphan", cache.clone());
        evaluator.add_rule(AlarmRule {
            rule_id: "manual-rule".to_string(),
            ..manual
        });
        provisioner.set_templates(vec![]);
        provisioner.synchronize();
        assert!(evaluator.managed_rule_ids().contains(&"manual-rule".to_string()));
    }
}
