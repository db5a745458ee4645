//! Persists templates and loads the alarm engine's template set at startup.
//!
//! Saving is recursive and transactional: the condition tree is written
//! depth-first (children first, parent last, wired through its own
//! auto-increment id), the action list is inserted fresh, and the
//! many-to-many template/action link is rewritten with a delete-then-insert
//! so a re-save never leaves stale links behind.

use std::sync::Mutex;

use serde_json::Value as Json;
use sqlx::{Row, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::alarm::action::Action;
use crate::alarm::condition::Condition;
use crate::alarm::rule::AlarmRuleTemplate;
use crate::error::{ManagerResult, StorageError, ValidationError};
use crate::storage::schema::CREATE_TABLES;

/// Persists/loads [`AlarmRuleTemplate`]s in the normalized schema described
/// by `alarm_templates`/`alarm_conditions`/`alarm_condition_composition`/
/// `alarm_actions`/`alarm_template_actions`.
pub trait TemplateRepository: Send + Sync {
    /// Creates the backing tables if they do not already exist.
    fn create_tables(&self) -> ManagerResult<()>;

    /// Upserts a template by `template_id`, replacing its condition tree,
    /// actions, and links inside one transaction.
    fn save_template(&self, template: &AlarmRuleTemplate) -> ManagerResult<()>;

    /// Loads every stored template, skipping (and logging) any row whose
    /// condition or action tree references an unknown type so the rest of
    /// the set still loads.
    fn load_all_templates(&self) -> ManagerResult<Vec<AlarmRuleTemplate>>;
}

/// `sqlx`-backed implementation over a single-writer sqlite pool.
pub struct SqliteTemplateRepository {
    pool: SqlitePool,
    runtime: tokio::runtime::Handle,
    write_lock: Mutex<()>,
}

impl SqliteTemplateRepository {
    /// Wraps `pool`, using `runtime` to drive async sqlx calls from a
    /// synchronous caller (the admin API or composition root).
    #[must_use]
    pub fn new(pool: SqlitePool, runtime: tokio::runtime::Handle) -> Self {
        Self {
            pool,
            runtime,
            write_lock: Mutex::new(()),
        }
    }
}

impl TemplateRepository for SqliteTemplateRepository {
    fn create_tables(&self) -> ManagerResult<()> {
        let _guard = self.write_lock.lock().expect("template repo write lock poisoned");
        let pool = self.pool.clone();
        self.runtime
            .block_on(async move {
                let mut tx = pool.begin().await?;
                for statement in CREATE_TABLES {
                    sqlx::query(statement).execute(&mut *tx).await?;
                }
                tx.commit().await
            })
            .map_err(StorageError::Backend)?;
        info!("alarm template tables created or verified");
        Ok(())
    }

    fn save_template(&self, template: &AlarmRuleTemplate) -> ManagerResult<()> {
        let _guard = self.write_lock.lock().expect("template repo write lock poisoned");
        let pool = self.pool.clone();
        let template = template.clone();
        self.runtime
            .block_on(async move { save_template_tx(&pool, &template).await })
            .map_err(StorageError::Backend)?;
        info!(template_id = %template.template_id, "saved alarm template");
        Ok(())
    }

    fn load_all_templates(&self) -> ManagerResult<Vec<AlarmRuleTemplate>> {
        let pool = self.pool.clone();
        let rows = self
            .runtime
            .block_on(async move {
                sqlx::query(
                    "SELECT template_id, metric_name, alarm_type, alarm_level, content_template, \
                     trigger_count_threshold, enabled, root_condition_id FROM alarm_templates",
                )
                .fetch_all(&pool)
                .await
            })
            .map_err(StorageError::Backend)?;

        let mut templates = Vec::with_capacity(rows.len());
        for row in rows {
            let template_id: String = row.get("template_id");
            let root_condition_id: i64 = row.get("root_condition_id");

            let pool = self.pool.clone();
            let condition = self
                .runtime
                .block_on(async move { load_condition_recursive(&pool, root_condition_id).await });
            let condition = match condition {
                Ok(c) => c,
                Err(err) => {
                    warn!(template_id = %template_id, error = %err, "skipping template: failed to load condition tree");
                    continue;
                }
            };

            let pool = self.pool.clone();
            let tid = template_id.clone();
            let actions = self
                .runtime
                .block_on(async move { load_actions_for_template(&pool, &tid).await });
            let actions = match actions {
                Ok(a) => a,
                Err(err) => {
                    warn!(template_id = %template_id, error = %err, "skipping template: failed to load actions");
                    continue;
                }
            };

            templates.push(AlarmRuleTemplate {
                template_id,
                metric_name: row.get("metric_name"),
                alarm_type: row.get("alarm_type"),
                alarm_level: row.get("alarm_level"),
                content_template: row.get("content_template"),
                trigger_count_threshold: row.get::<i64, _>("trigger_count_threshold") as u32,
                enabled: row.get::<i64, _>("enabled") != 0,
                condition,
                actions,
            });
        }
        info!(count = templates.len(), "loaded alarm templates from database");
        Ok(templates)
    }
}

async fn save_template_tx(pool: &SqlitePool, template: &AlarmRuleTemplate) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let root_condition_id = save_condition_recursive(&mut tx, &template.condition).await?;

    let mut action_ids = Vec::with_capacity(template.actions.len());
    for action in &template.actions {
        let params_json = action.params().map(Json::to_string);
        let id = sqlx::query(
            "INSERT INTO alarm_actions (action_type, params_json) VALUES (?, ?)",
        )
        .bind(action.type_tag())
        .bind(params_json)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        action_ids.push(id);
    }

    sqlx::query(
        r"INSERT INTO alarm_templates
            (template_id, metric_name, alarm_type, alarm_level, content_template,
             trigger_count_threshold, enabled, root_condition_id)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?)
          ON CONFLICT(template_id) DO UPDATE SET
            metric_name = excluded.metric_name,
            alarm_type = excluded.alarm_type,
            alarm_level = excluded.alarm_level,
            content_template = excluded.content_template,
            trigger_count_threshold = excluded.trigger_count_threshold,
            enabled = excluded.enabled,
            root_condition_id = excluded.root_condition_id",
    )
    .bind(&template.template_id)
    .bind(&template.metric_name)
    .bind(&template.alarm_type)
    .bind(&template.alarm_level)
    .bind(&template.content_template)
    .bind(template.trigger_count_threshold as i64)
    .bind(template.enabled as i64)
    .bind(root_condition_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM alarm_template_actions WHERE template_id = ?")
        .bind(&template.template_id)
        .execute(&mut *tx)
        .await?;

    for (order, action_id) in action_ids.into_iter().enumerate() {
        sqlx::query(
            "INSERT INTO alarm_template_actions (template_id, action_id, action_order) VALUES (?, ?, ?)",
        )
        .bind(&template.template_id)
        .bind(action_id)
        .bind(order as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Depth-first insert: children commit before their parent so the parent
/// row can reference already-assigned child ids via the composition table.
fn save_condition_recursive<'a>(
    tx: &'a mut Transaction<'_, sqlx::Sqlite>,
    condition: &'a Condition,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<i64, sqlx::Error>> + Send + 'a>> {
    Box::pin(async move {
        let parent_id = sqlx::query(
            "INSERT INTO alarm_conditions (condition_type, threshold) VALUES (?, ?)",
        )
        .bind(condition.type_tag())
        .bind(condition.threshold())
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for (order, child) in condition.children().into_iter().enumerate() {
            let child_id = save_condition_recursive(tx, child).await?;
            sqlx::query(
                "INSERT INTO alarm_condition_composition (parent_id, child_id, child_order) VALUES (?, ?, ?)",
            )
            .bind(parent_id)
            .bind(child_id)
            .bind(order as i64)
            .execute(&mut **tx)
            .await?;
        }

        Ok(parent_id)
    })
}

fn load_condition_recursive(
    pool: &SqlitePool,
    condition_id: i64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ManagerResult<Condition>> + Send + '_>> {
    Box::pin(async move {
        let row = sqlx::query("SELECT condition_type, threshold FROM alarm_conditions WHERE id = ?")
            .bind(condition_id)
            .fetch_optional(pool)
            .await
            .map_err(StorageError::Backend)?
            .ok_or_else(|| StorageError::NotFound {
                kind: "condition",
                id: condition_id.to_string(),
            })?;

        let condition_type: String = row.get("condition_type");
        let threshold: f64 = row.get("threshold");

        match condition_type.as_str() {
            "GreaterThan" => Ok(Condition::GreaterThan { threshold }),
            "LessThan" => Ok(Condition::LessThan { threshold }),
            "Not" => {
                let child_id = fetch_child_ids(pool, condition_id).await?;
                let child_id = child_id
                    .first()
                    .copied()
                    .ok_or_else(|| StorageError::Corrupt {
                        table: "alarm_condition_composition",
                        reason: format!("Not condition {condition_id} has no child"),
                    })?;
                let child = load_condition_recursive(pool, child_id).await?;
                Ok(Condition::Not {
                    condition: Box::new(child),
                })
            }
            "And" | "Or" => {
                let mut children = Vec::new();
                for child_id in fetch_child_ids(pool, condition_id).await? {
                    children.push(load_condition_recursive(pool, child_id).await?);
                }
                if condition_type == "And" {
                    Ok(Condition::And { conditions: children })
                } else {
                    Ok(Condition::Or { conditions: children })
                }
            }
            other => Err(ValidationError::UnknownConditionType {
                type_tag: other.to_string(),
            }
            .into()),
        }
    })
}

async fn fetch_child_ids(pool: &SqlitePool, parent_id: i64) -> ManagerResult<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT child_id FROM alarm_condition_composition WHERE parent_id = ? ORDER BY child_order",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await
    .map_err(StorageError::Backend)?;
    Ok(rows.into_iter().map(|row| row.get("child_id")).collect())
}

async fn load_actions_for_template(pool: &SqlitePool, template_id: &str) -> ManagerResult<Vec<Action>> {
    let rows = sqlx::query(
        r"SELECT a.action_type, a.params_json FROM alarm_actions a
           JOIN alarm_template_actions ta ON a.id = ta.action_id
           WHERE ta.template_id = ? ORDER BY ta.action_order",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await
    .map_err(StorageError::Backend)?;

    let mut actions = Vec::with_capacity(rows.len());
    for row in rows {
        let action_type: String = row.get("action_type");
        let params_json: Option<String> = row.get("params_json");
        let params = params_json.and_then(|s| serde_json::from_str(&s).ok());
        let action = match action_type.as_str() {
            "Log" => Action::Log { params },
            "Database" => Action::Database { params },
            other => {
                return Err(ValidationError::UnknownActionType {
                    type_tag: other.to_string(),
                }
                .into())
            }
        };
        actions.push(action);
    }
    Ok(actions)
}

/// Parses the JSON shape accepted by `POST /alarm/rules` (§4.6) into an
/// [`AlarmRuleTemplate`].
pub fn template_from_json(json: &Json) -> ManagerResult<AlarmRuleTemplate> {
    let template_id = json
        .get("templateId")
        .and_then(Json::as_str)
        .ok_or_else(|| ValidationError::MissingField {
            field: "templateId".to_string(),
        })?
        .to_string();
    let metric_name = json
        .get("metricName")
        .and_then(Json::as_str)
        .ok_or_else(|| ValidationError::MissingField {
            field: "metricName".to_string(),
        })?
        .to_string();
    let alarm_type = json.get("alarmType").and_then(Json::as_str).unwrap_or("").to_string();
    let alarm_level = json.get("alarmLevel").and_then(Json::as_str).unwrap_or("").to_string();
    let content_template = json
        .get("contentTemplate")
        .and_then(Json::as_str)
        .unwrap_or("{state} on {nodeId}: {metricName}={value}")
        .to_string();
    let trigger_count_threshold = json
        .get("triggerCountThreshold")
        .and_then(Json::as_u64)
        .unwrap_or(1) as u32;
    let enabled = json.get("enabled").and_then(Json::as_bool).unwrap_or(true);

    let condition_json = json.get("condition").ok_or_else(|| ValidationError::MissingField {
        field: "condition".to_string(),
    })?;
    let condition: Condition = serde_json::from_value(condition_json.clone())
        .map_err(|_| ValidationError::UnknownConditionType {
            type_tag: condition_json.to_string(),
        })?;

    let actions_json = json.get("actions").and_then(Json::as_array).ok_or_else(|| {
        ValidationError::MissingField {
            field: "actions".to_string(),
        }
    })?;
    let actions: Vec<Action> = actions_json
        .iter()
        .map(|a| serde_json::from_value(a.clone()))
        .collect::<Result<_, _>>()
        .map_err(|_| ValidationError::MissingField {
            field: "actions".to_string(),
        })?;

    Ok(AlarmRuleTemplate {
        template_id,
        metric_name,
        alarm_type,
        alarm_level,
        content_template,
        trigger_count_threshold,
        enabled,
        condition,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Builds an in-memory pool plus a dedicated runtime to drive it.
    ///
    /// `SqliteTemplateRepository`'s trait methods are synchronous and block
    /// on a captured runtime handle; calling them from a `#[tokio::test]`
    /// body would nest `block_on` inside the test's own runtime and panic.
    /// A plain `#[test]` thread has not entered any runtime, so driving the
    /// repository's blocking calls from here mirrors how the evaluator's
    /// and provisioner's background threads use it in production.
    fn memory_repo() -> SqliteTemplateRepository {
        let runtime = tokio::runtime::Runtime::new().expect("test runtime");
        let pool = runtime.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .expect("in-memory sqlite pool")
        });
        let handle = runtime.handle().clone();
        // Leak the runtime for the test's lifetime: its worker thread must
        // stay alive for `handle.block_on` to keep working.
        std::mem::forget(runtime);
        SqliteTemplateRepository::new(pool, handle)
    }

    fn round_trip_template() -> AlarmRuleTemplate {
        AlarmRuleTemplate {
            template_id: "t".to_string(),
            metric_name: "cpu.usage_percent".to_string(),
            alarm_type: "cpu".to_string(),
            alarm_level: "critical".to_string(),
            content_template: "{state}".to_string(),
            trigger_count_threshold: 1,
            enabled: true,
            condition: Condition::Or {
                conditions: vec![
                    Condition::Not {
                        condition: Box::new(Condition::LessThan { threshold: 5.0 }),
                    },
                    Condition::GreaterThan { threshold: 100.0 },
                ],
            },
            actions: vec![Action::Log { params: None }],
        }
    }

    #[test]
    fn save_then_load_round_trips_condition_tree() {
        let repo = memory_repo();
        repo.create_tables().unwrap();

        let template = round_trip_template();
        repo.save_template(&template).unwrap();

        let loaded = repo.load_all_templates().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].condition, template.condition);
        assert_eq!(loaded[0].actions, template.actions);
    }

    #[test]
    fn save_is_idempotent_upsert() {
        let repo = memory_repo();
        repo.create_tables().unwrap();

        let mut template = round_trip_template();
        repo.save_template(&template).unwrap();
        template.alarm_level = "warning".to_string();
        repo.save_template(&template).unwrap();

        let loaded = repo.load_all_templates().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].alarm_level, "warning");
    }

    #[test]
    fn template_from_json_parses_minimal_shape() {
        let json = json!({
            "templateId": "cpu-crit",
            "metricName": "cpu.usage_percent",
            "triggerCountThreshold": 3,
            "condition": { "type": "GreaterThan", "threshold": 90.0 },
            "actions": [{ "type": "Log" }, { "type": "Database" }]
        });
        let template = template_from_json(&json).unwrap();
        assert_eq!(template.template_id, "cpu-crit");
        assert_eq!(template.trigger_count_threshold, 3);
        assert_eq!(template.actions.len(), 2);
    }

    #[test]
    fn template_from_json_rejects_missing_field() {
        let json = json!({ "metricName": "cpu.usage_percent" });
        assert!(template_from_json(&json).is_err());
    }
}
