//! DDL for the relational template/event schema (spec §4.6, §4.7).

/// `CREATE TABLE IF NOT EXISTS` statements, applied in order. Idempotent.
pub const CREATE_TABLES: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS alarm_conditions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        condition_type TEXT NOT NULL,
        threshold REAL NOT NULL DEFAULT 0
    )",
    r"CREATE TABLE IF NOT EXISTS alarm_condition_composition (
        parent_id INTEGER NOT NULL,
        child_id INTEGER NOT NULL,
        child_order INTEGER NOT NULL,
        PRIMARY KEY (parent_id, child_id),
        FOREIGN KEY (parent_id) REFERENCES alarm_conditions(id),
        FOREIGN KEY (child_id) REFERENCES alarm_conditions(id)
    )",
    r"CREATE TABLE IF NOT EXISTS alarm_actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action_type TEXT NOT NULL,
        params_json TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS alarm_templates (
        template_id TEXT PRIMARY KEY,
        metric_name TEXT NOT NULL,
        alarm_type TEXT NOT NULL,
        alarm_level TEXT NOT NULL,
        content_template TEXT NOT NULL,
        trigger_count_threshold INTEGER NOT NULL DEFAULT 1,
        enabled INTEGER NOT NULL DEFAULT 1,
        root_condition_id INTEGER NOT NULL,
        FOREIGN KEY (root_condition_id) REFERENCES alarm_conditions(id)
    )",
    r"CREATE TABLE IF NOT EXISTS alarm_template_actions (
        template_id TEXT NOT NULL,
        action_id INTEGER NOT NULL,
        action_order INTEGER NOT NULL,
        PRIMARY KEY (template_id, action_id),
        FOREIGN KEY (template_id) REFERENCES alarm_templates(template_id),
        FOREIGN KEY (action_id) REFERENCES alarm_actions(id)
    )",
    r"CREATE TABLE IF NOT EXISTS alarm_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        rule_id TEXT NOT NULL,
        template_id TEXT NOT NULL,
        node_id TEXT NOT NULL,
        metric_name TEXT NOT NULL,
        value REAL NOT NULL,
        alarm_type TEXT NOT NULL,
        alarm_level TEXT NOT NULL,
        event_type TEXT NOT NULL,
        details TEXT NOT NULL
    )",
];
