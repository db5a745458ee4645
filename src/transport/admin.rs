//! Thin JSON admin surface over the alarm engine.
//!
//! HTTP request routing and response envelope shaping are external
//! collaborators described only at their interface: this module wires the
//! three routes named for the template/event admin API plus a metric
//! ingest endpoint, and wraps every response in the fixed envelope. It does
//! not do auth, pagination beyond `limit`, or content negotiation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::alarm::evaluator::AlarmEvaluator;
use crate::alarm::provisioner::RuleProvisioner;
use crate::cache::MetricCache;
use crate::storage::{template_from_json, AlarmEventRepository, TemplateRepository};

/// Shared state handed to every admin-API handler.
#[derive(Clone)]
pub struct AdminState {
    /// Metric ingress target.
    pub cache: Arc<MetricCache>,
    /// Backs `GET /alarm/rules` freshness and `POST /alarm/rules` upserts.
    pub templates: Arc<dyn TemplateRepository>,
    /// Backs `GET /alarm/events`.
    pub events: Arc<dyn AlarmEventRepository>,
    /// Re-synced immediately after a template upsert so new rules don't
    /// wait a full provisioner cycle to appear.
    pub provisioner: Arc<RuleProvisioner>,
    /// Exposed only so `load_all_templates` results can be pushed into a
    /// running evaluator without restarting the process (not currently
    /// wired to a route; reserved for a future `DELETE /alarm/rules/:id`).
    pub evaluator: Arc<AlarmEvaluator>,
}

/// Builds the admin router: `POST/GET /alarm/rules`, `GET /alarm/events`,
/// `POST /metrics/:node_id`.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/alarm/rules", post(post_alarm_rule).get(get_alarm_rules))
        .route("/alarm/events", get(get_alarm_events))
        .route("/metrics/:node_id", post(post_metrics))
        .with_state(state)
}

/// `{"api_version":1,"status":"success"|"error","data":{...}}`.
fn envelope(status: &'static str, data: Value) -> Json<Value> {
    Json(json!({ "api_version": 1, "status": status, "data": data }))
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, envelope("error", json!({ "message": self.1 }))).into_response()
    }
}

async fn post_alarm_rule(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let template = template_from_json(&body)
        .map_err(|err| ApiError(StatusCode::BAD_REQUEST, err.to_string()))?;

    // `TemplateRepository` is a synchronous trait that blocks on its own
    // captured runtime handle internally; run it via `spawn_blocking` so
    // that block-on doesn't happen on this async handler's own worker
    // thread (nested `block_on` panics).
    let templates = state.templates.clone();
    let saved_template = template.clone();
    tokio::task::spawn_blocking(move || templates.save_template(&saved_template))
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    // Reflect the new/edited template immediately rather than waiting up to
    // one full provisioner interval.
    let templates = state.templates.clone();
    let provisioner = state.provisioner.clone();
    let _ = tokio::task::spawn_blocking(move || {
        if let Ok(all) = templates.load_all_templates() {
            provisioner.set_templates(all);
        }
        provisioner.synchronize();
    })
    .await;

    Ok(envelope(
        "success",
        json!({ "message": "Alarm rule added successfully" }),
    ))
}

async fn get_alarm_rules(State(state): State<AdminState>) -> Result<Json<Value>, ApiError> {
    let templates = state.templates.clone();
    let templates = tokio::task::spawn_blocking(move || templates.load_all_templates())
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let rules: Vec<Value> = templates
        .iter()
        .map(|t| serde_json::to_value(t).unwrap_or(Value::Null))
        .collect();
    Ok(envelope("success", json!({ "alarm_rules": rules })))
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<String>,
}

async fn get_alarm_events(
    State(state): State<AdminState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    // An invalid `limit` value is silently ignored in favor of the default,
    // matching the original collaborator's behavior.
    let limit = query
        .limit
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(100);
    let events = state.events.clone();
    let events = tokio::task::spawn_blocking(move || events.recent_events(limit))
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(envelope(
        "success",
        json!({ "alarm_events": serde_json::to_value(events).unwrap_or(Value::Null) }),
    ))
}

async fn post_metrics(
    State(state): State<AdminState>,
    Path(node_id): Path<String>,
    Json(snapshot): Json<Value>,
) -> Json<Value> {
    state.cache.update(node_id, snapshot);
    envelope("success", json!({ "message": "metrics recorded" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let body = envelope("success", json!({ "x": 1 }));
        assert_eq!(body.0["api_version"], 1);
        assert_eq!(body.0["status"], "success");
    }
}
