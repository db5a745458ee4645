//! Persists triggered/recovered events and renders their templated details.

use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::error;

use crate::alarm::render::render;
use crate::alarm::rule::AlarmRule;
use crate::alarm::EventKind;
use crate::error::{ManagerResult, StorageError};

/// A persisted alarm event row.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Auto-increment row id.
    pub id: i64,
    /// Server local time, formatted `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Originating rule id.
    pub rule_id: String,
    /// Originating template id.
    pub template_id: String,
    /// Node the rule was bound to.
    pub node_id: String,
    /// Metric path the rule read.
    pub metric_name: String,
    /// Value observed at fire time.
    pub value: f64,
    /// Alarm category copied from the template.
    pub alarm_type: String,
    /// Alarm severity copied from the template.
    pub alarm_level: String,
    /// `"TRIGGERED"` or `"RECOVERED"`.
    pub event_type: String,
    /// Rendered content-template message.
    pub details: String,
}

/// Persists and queries alarm events.
///
/// Failures are logged and never propagated into the evaluation tick
/// (§7, taxonomy item 3); `insert_event` still returns a `Result` so
/// callers that do want to observe failures (tests, the admin API) can.
pub trait AlarmEventRepository: Send + Sync {
    /// Renders `rule`'s content template for `kind` and appends a new row.
    fn insert_event(&self, rule: &AlarmRule, kind: EventKind) -> ManagerResult<()>;

    /// Returns up to `limit` most recent events, newest first.
    fn recent_events(&self, limit: usize) -> ManagerResult<Vec<EventRecord>>;
}

fn build_record(rule: &AlarmRule, kind: EventKind) -> EventRecord {
    EventRecord {
        id: 0,
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        rule_id: rule.rule_id.clone(),
        template_id: rule.template_id.clone(),
        node_id: rule.node_id.clone(),
        metric_name: rule.metric_name.clone(),
        value: rule.last_value,
        alarm_type: rule.alarm_type.clone(),
        alarm_level: rule.alarm_level.clone(),
        event_type: kind.as_str().to_string(),
        details: render(rule, kind),
    }
}

/// In-memory event repository, used by tests and as a fallback when no
/// sqlite pool is configured.
pub struct InMemoryEventRepository {
    events: Mutex<Vec<EventRecord>>,
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Infallible convenience accessor for tests: up to `limit` most recent
    /// events, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        self.recent_events(limit).unwrap_or_default()
    }
}

impl AlarmEventRepository for InMemoryEventRepository {
    fn insert_event(&self, rule: &AlarmRule, kind: EventKind) -> ManagerResult<()> {
        let mut events = self.events.lock().expect("event repository mutex poisoned");
        let mut record = build_record(rule, kind);
        record.id = events.len() as i64 + 1;
        events.push(record);
        Ok(())
    }

    fn recent_events(&self, limit: usize) -> ManagerResult<Vec<EventRecord>> {
        let events = self.events.lock().expect("event repository mutex poisoned");
        Ok(events.iter().rev().take(limit).cloned().collect())
    }
}

/// `sqlx`-backed event repository.
///
/// Trait methods are synchronous to match the evaluator's thread-based tick
/// loop; each call blocks on a captured [`tokio::runtime::Handle`] rather
/// than requiring the evaluator itself to be async, mirroring how the
/// original in-process design serializes all database access behind one
/// mutex-equivalent (sqlite's own writer lock plus this pool's connection
/// cap).
pub struct SqliteEventRepository {
    pool: SqlitePool,
    runtime: tokio::runtime::Handle,
}

impl SqliteEventRepository {
    /// Wraps `pool`, using `runtime` to drive the async sqlx calls from
    /// the evaluator's synchronous context.
    #[must_use]
    pub fn new(pool: SqlitePool, runtime: tokio::runtime::Handle) -> Self {
        Self { pool, runtime }
    }
}

impl AlarmEventRepository for SqliteEventRepository {
    fn insert_event(&self, rule: &AlarmRule, kind: EventKind) -> ManagerResult<()> {
        let record = build_record(rule, kind);
        let pool = self.pool.clone();
        let result = self.runtime.block_on(async move {
            sqlx::query(
                r"INSERT INTO alarm_events
                    (timestamp, rule_id, template_id, node_id, metric_name, value, alarm_type, alarm_level, event_type, details)
                  VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.timestamp)
            .bind(&record.rule_id)
            .bind(&record.template_id)
            .bind(&record.node_id)
            .bind(&record.metric_name)
            .bind(record.value)
            .bind(&record.alarm_type)
            .bind(&record.alarm_level)
            .bind(&record.event_type)
            .bind(&record.details)
            .execute(&pool)
            .await
        });

        if let Err(err) = result {
            error!(rule_id = %rule.rule_id, error = %err, "failed to insert alarm event");
            return Err(StorageError::Backend(err).into());
        }
        Ok(())
    }

    fn recent_events(&self, limit: usize) -> ManagerResult<Vec<EventRecord>> {
        let pool = self.pool.clone();
        let limit = limit as i64;
        let rows = self.runtime.block_on(async move {
            sqlx::query_as::<_, EventRow>(
                r"SELECT id, timestamp, rule_id, template_id, node_id, metric_name, value,
                         alarm_type, alarm_level, event_type, details
                  FROM alarm_events ORDER BY timestamp DESC, id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&pool)
            .await
        })
        .map_err(StorageError::Backend)?;
        Ok(rows.into_iter().map(EventRow::into_record).collect())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    timestamp: String,
    rule_id: String,
    template_id: String,
    node_id: String,
    metric_name: String,
    value: f64,
    alarm_type: String,
    alarm_level: String,
    event_type: String,
    details: String,
}

impl EventRow {
    fn into_record(self) -> EventRecord {
        EventRecord {
            id: self.id,
            timestamp: self.timestamp,
            rule_id: self.rule_id,
            template_id: self.template_id,
            node_id: self.node_id,
            metric_name: self.metric_name,
            value: self.value,
            alarm_type: self.alarm_type,
            alarm_level: self.alarm_level,
            event_type: self.event_type,
            details: self.details,
        }
    }
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

    fn sample_rule() -> AlarmRule {
        let template = AlarmRuleTemplate {
            template_id: "cpu-crit".to_string(),
            metric_name: "cpu.usage_percent".to_string(),
            alarm_type: "cpu".to_string(),
            alarm_level: "critical".to_string(),
            content_template: "{state} {ruleId}".to_string(),
            trigger_count_threshold: 1,
            enabled: true,
            condition: Condition::GreaterThan { threshold: 90.0 },
            actions: vec![Action::Database { params: None }],
        };
        let cache = Arc::new(MetricCache::new());
        cache.update("node-01", json!({ "cpu": { "usage_percent": 95.0 } }));
        let mut rule = AlarmRule::new(&template, "node-01", cache);
        rule.sample();
        rule.is_triggered = true;
        rule
    }

    #[test]
    fn in_memory_orders_newest_first() {
        let repo = InMemoryEventRepository::new();
        let mut rule = sample_rule();
        repo.insert_event(&rule, EventKind::Triggered).unwrap();
        rule.is_triggered = false;
        repo.insert_event(&rule, EventKind::Recovered).unwrap();

        let recent = repo.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, "RECOVERED");
        assert_eq!(recent[1].event_type, "TRIGGERED");
    }

    #[test]
    fn limit_is_respected() {
        let repo = InMemoryEventRepository::new();
        let rule = sample_rule();
        for _ in 0..5 {
            repo.insert_event(&rule, EventKind::Triggered).unwrap();
        }
        assert_eq!(repo.recent(2).len(), 2);
    }
}
