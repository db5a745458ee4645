//! Periodic evaluation loop: reads each rule's resource value, advances its
//! debounce state machine, and dispatches actions on transitions.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::alarm::rule::AlarmRule;
use crate::cache::MetricCache;
use crate::storage::event_repo::AlarmEventRepository;

/// Default tick interval, within the 1-5s range the evaluation loop may
/// choose from.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

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

    /// Sleeps up to `timeout`, returning early if a stop is signaled.
    /// Returns `true` if a stop was observed.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock.lock().expect("evaluator stop mutex poisoned");
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .expect("evaluator stop mutex poisoned");
        *guard
    }

    fn signal(&self) {
        let mut guard = self.lock.lock().expect("evaluator stop mutex poisoned");
        *guard = true;
        self.cv.notify_all();
    }
}

/// Owns the live rule set and a background thread that ticks it.
///
/// The rule map's mutex is held for the duration of a tick: per-rule work
/// is a cache read, pure condition evaluation, and (for `Database` actions)
/// a local sqlite write, none of which blocks on an external service, so
/// this is simpler than copying the rule set out from under the lock while
/// still honoring "each rule evaluated at most once per tick, in
/// declaration order of its actions".
pub struct AlarmEvaluator {
    cache: Arc<MetricCache>,
    event_repo: Arc<dyn AlarmEventRepository>,
    rules: Arc<Mutex<IndexMap<String, AlarmRule>>>,
    tick_interval: Duration,
    stop: Arc<StopSignal>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmEvaluator {
    /// Creates an evaluator over `cache`, persisting events through
    /// `event_repo`, ticking every `tick_interval`.
    #[must_use]
    pub fn new(
        cache: Arc<MetricCache>,
        event_repo: Arc<dyn AlarmEventRepository>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            cache,
            event_repo,
            rules: Arc::new(Mutex::new(IndexMap::new())),
            tick_interval,
            stop: Arc::new(StopSignal::new()),
            join: Mutex::new(None),
        }
    }

    /// Adds or replaces a rule, keyed by `rule.rule_id`.
    pub fn add_rule(&self, rule: AlarmRule) {
        let mut rules = self.rules.lock().expect("rule map mutex poisoned");
        rules.insert(rule.rule_id.clone(), rule);
    }

    /// Removes a rule by id, returning it if present.
    pub fn remove_rule(&self, rule_id: &str) -> Option<AlarmRule> {
        let mut rules = self.rules.lock().expect("rule map mutex poisoned");
        rules.shift_remove(rule_id)
    }

    /// The ids of all rules currently managed by this evaluator.
    #[must_use]
    pub fn managed_rule_ids(&self) -> Vec<String> {
        let rules = self.rules.lock().expect("rule map mutex poisoned");
        rules.keys().cloned().collect()
    }

    /// Evaluates every managed rule exactly once, dispatching actions for
    /// any rule that transitions.
    pub fn tick(&self) {
        let mut rules = self.rules.lock().expect("rule map mutex poisoned");
        for rule in rules.values_mut() {
            Self::evaluate_one(rule, &self.cache, self.event_repo.as_ref());
        }
    }

    fn evaluate_one(rule: &mut AlarmRule, _cache: &Arc<MetricCache>, event_repo: &dyn AlarmEventRepository) {
        let value = rule.sample();
        let fired = rule.condition.is_triggered(value);

        if fired {
            rule.consecutive_trigger_count += 1;
            if rule.consecutive_trigger_count >= rule.trigger_count_threshold && !rule.is_triggered {
                rule.is_triggered = true;
                debug!(rule_id = %rule.rule_id, value, "rule triggered");
                for action in &rule.actions {
                    action.execute(rule, event_repo);
                }
            }
        } else {
            if rule.is_triggered {
                rule.is_triggered = false;
                debug!(rule_id = %rule.rule_id, value, "rule recovered");
                for action in &rule.actions {
                    action.execute(rule, event_repo);
                }
            }
            rule.consecutive_trigger_count = 0;
        }
    }

    /// Starts the background tick loop. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut join = self.join.lock().expect("evaluator join mutex poisoned");
        if join.is_some() {
            return;
        }
        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("alarm-evaluator".to_string())
            .spawn(move || this.run())
            .expect("failed to spawn alarm evaluator thread");
        *join = Some(handle);
    }

    fn run(&self) {
        info!(interval_ms = self.tick_interval.as_millis() as u64, "alarm evaluator started");
        loop {
            self.tick();
            if self.stop.wait(self.tick_interval) {
                break;
            }
        }
        info!("alarm evaluator stopped");
    }

    /// Signals the tick loop to stop and blocks until it has exited.
    /// Idempotent.
    pub fn stop(&self) {
        self.stop.signal();
        let mut join = self.join.lock().expect("evaluator join mutex poisoned");
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
    use crate::alarm::rule::AlarmRuleTemplate;
    use crate::storage::event_repo::InMemoryEventRepository;
    use serde_json::json;

    fn template(threshold_count: u32) -> AlarmRuleTemplate {
        AlarmRuleTemplate {
            template_id: "cpu-crit".to_string(),
            metric_name: "cpu.usage_percent".to_string(),
            alarm_type: "cpu".to_string(),
            alarm_level: "critical".to_string(),
            content_template: "{state} rule={ruleId} value={value}".to_string(),
            trigger_count_threshold: threshold_count,
            enabled: true,
            condition: Condition::GreaterThan { threshold: 90.0 },
            actions: vec![Action::Database { params: None }],
        }
    }

    #[test]
    fn debounce_invariant() {
        let cache = Arc::new(MetricCache::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let evaluator = AlarmEvaluator::new(cache.clone(), events.clone(), Duration::from_secs(1));
        evaluator.add_rule(AlarmRule::new(&template(3), "node-01", cache.clone()));

        cache.update("node-01", json!({ "cpu": { "usage_percent": 95.0 } }));
        evaluator.tick();
        evaluator.tick();
        assert!(events.recent(10).is_empty());

        evaluator.tick();
        assert_eq!(events.recent(10).len(), 1);
        assert_eq!(events.recent(10)[0].event_type, "TRIGGERED");

        cache.update("node-01", json!({ "cpu": { "usage_percent": 10.0 } }));
        evaluator.tick();
        assert_eq!(events.recent(10).len(), 2);
        assert_eq!(events.recent(10)[0].event_type, "RECOVERED");
    }

    #[test]
    fn windowed_and_scenario() {
        let cache = Arc::new(MetricCache::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let evaluator = AlarmEvaluator::new(cache.clone(), events.clone(), Duration::from_secs(1));
        let mut tpl = template(1);
        tpl.condition = Condition::And {
            conditions: vec![
                Condition::GreaterThan { threshold: 80.0 },
                Condition::LessThan { threshold: 95.0 },
            ],
        };
        evaluator.add_rule(AlarmRule::new(&tpl, "node-01", cache.clone()));

        for value in [75.0, 85.0, 97.0, 90.0] {
            cache.update("node-01", json!({ "cpu": { "usage_percent": value } }));
            evaluator.tick();
        }

        let recent = events.recent(10);
        let kinds: Vec<&str> = recent.iter().rev().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["TRIGGERED", "RECOVERED", "TRIGGERED"]);
    }

    #[test]
    fn idempotent_ticks_produce_no_extra_events() {
        let cache = Arc::new(MetricCache::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let evaluator = AlarmEvaluator::new(cache.clone(), events.clone(), Duration::from_secs(1));
        evaluator.add_rule(AlarmRule::new(&template(1), "node-01", cache.clone()));

        cache.update("node-01", json!({ "cpu": { "usage_percent": 95.0 } }));
        evaluator.tick();
        evaluator.tick();
        evaluator.tick();
        assert_eq!(events.recent(10).len(), 1);
    }
}
