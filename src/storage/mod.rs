//! Relational persistence for alarm templates and events.

pub mod event_repo;
pub mod schema;
pub mod template_repo;

pub use event_repo::{AlarmEventRepository, EventRecord, InMemoryEventRepository, SqliteEventRepository};
pub use template_repo::{template_from_json, SqliteTemplateRepository, TemplateRepository};
