//! REST API handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use linkagent_core::{apply_config_set, Config, Exportable, TypedValue, Update};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn bad_request(msg: impl Into<String>) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ApiError::new(msg))).into_response()
}

/// Controller status
pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let controller = &state.controller;
    Json(serde_json::json!({
        "agent_id": controller.agent_id(),
        "state": controller.state(),
        "pipeline": controller.pipeline(),
        "links": controller.link_count(),
        "hosts": controller.host_count(),
    }))
}

/// List discovered links, sorted by ingress port
pub async fn list_links(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.links())
}

/// List discovered hosts
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.hosts())
}

/// List device ports from the last enumeration
pub async fn list_ports(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.ports())
}

/// Current tunables
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.config())
}

/// Partial tunables update; omitted fields keep their value
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigPatch {
    emit_frequency: Option<i64>,
    max_link_age: Option<i64>,
    pipeline_validation_frequency: Option<i64>,
    port_rediscovery_frequency: Option<i64>,
    link_prune_frequency: Option<i64>,
}

impl ConfigPatch {
    fn entries(&self) -> Vec<(&'static str, i64)> {
        let fields = [
            self.emit_frequency,
            self.max_link_age,
            self.pipeline_validation_frequency,
            self.port_rediscovery_frequency,
            self.link_prune_frequency,
        ];
        Config::KEYS
            .iter()
            .zip(fields)
            .filter_map(|(key, value)| value.map(|v| (*key, v)))
            .collect()
    }
}

/// Update tunables through the export tree
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ConfigPatch>,
) -> impl IntoResponse {
    let entries = patch.entries();
    if entries.is_empty() {
        return bad_request("No tunables given");
    }
    if let Some((key, value)) = entries.iter().find(|(_, v)| *v <= 0) {
        return bad_request(format!("{} must be positive, got {}", key, value));
    }

    let updates = entries
        .into_iter()
        .map(|(key, value)| Update::new(format!("config/{}", key), TypedValue::Int(value)))
        .collect();
    if let Err(e) = apply_config_set(&state.controller, updates) {
        return bad_request(e.to_string());
    }

    let config = state.controller.config();
    info!(config = ?config, "Tunables updated via API");
    Json(config).into_response()
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    #[serde(default)]
    prefix: Option<String>,
}

/// Export tree leaves under an optional path prefix
pub async fn get_tree(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TreeQuery>,
) -> impl IntoResponse {
    let prefix = query.prefix.unwrap_or_default();
    Json(state.controller.tree().snapshot(&prefix))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::server::router;
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> (Router, Arc<AppState>) {
        let mut config = Config::default();
        config.daemon.agent_id = "deviceA".to_string();
        config.daemon.tunables_path = dir.path().join("tunables.toml").display().to_string();
        let state = AppState::new(config);
        (router(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_get_state() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let (status, body) = get_json(app, "/api/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent_id"], "deviceA");
        assert_eq!(body["state"], "disconnected");
        assert_eq!(body["links"], 0);
        assert_eq!(body["hosts"], 0);
    }

    #[tokio::test]
    async fn test_state_counts_follow_registry() {
        let dir = TempDir::new().unwrap();
        let (app, state) = app(&dir);
        state.controller.update_link(1, 2, "deviceB");
        state.controller.update_link(4, 2, "deviceC");
        state.controller.update_link(1, 2, "deviceB");
        state.controller.update_host("aa:bb:cc:dd:ee:01", "10.0.0.1", 4);

        let (_, body) = get_json(app, "/api/state").await;
        assert_eq!(body["links"], 2);
        assert_eq!(body["hosts"], 1);
    }

    #[tokio::test]
    async fn test_list_links_sorted() {
        let dir = TempDir::new().unwrap();
        let (app, state) = app(&dir);
        state.controller.update_link(3, 1, "deviceB");
        state.controller.update_link(1, 2, "deviceC");

        let (status, body) = get_json(app, "/api/links").await;
        assert_eq!(status, StatusCode::OK);
        let links = body.as_array().unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["ingress_port"], 1);
        assert_eq!(links[0]["egress_device"], "deviceC");
        assert_eq!(links[1]["ingress_port"], 3);
    }

    #[tokio::test]
    async fn test_update_config_persists() {
        let dir = TempDir::new().unwrap();
        let (app, state) = app(&dir);

        let (status, body) =
            post_json(app.clone(), "/api/config", r#"{"maxLinkAge": 90}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["maxLinkAge"], 90);
        assert_eq!(body["emitFrequency"], 5);
        assert_eq!(state.controller.config().max_link_age, 90);

        let saved = std::fs::read_to_string(dir.path().join("tunables.toml")).unwrap();
        assert!(saved.contains("maxLinkAge = 90"));

        let (_, body) = get_json(app, "/api/tree?prefix=config/maxLinkAge").await;
        assert_eq!(body[0]["value"]["value"], 90);
    }

    #[tokio::test]
    async fn test_update_config_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let (app, state) = app(&dir);

        let (status, _) = post_json(app.clone(), "/api/config", r#"{}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(app.clone(), "/api/config", r#"{"emitFrequency": 0}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("emitFrequency"));

        let (status, _) = post_json(app, "/api/config", r#"{"bogus": 1}"#).await;
        assert!(status.is_client_error());
        assert_eq!(state.controller.config().emit_frequency, 5);
    }

    #[tokio::test]
    async fn test_tree_snapshot() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = get_json(app.clone(), "/api/tree").await;
        assert_eq!(status, StatusCode::OK);
        // Five tunables plus the agent ID
        assert_eq!(body.as_array().unwrap().len(), 6);

        let (_, body) = get_json(app, "/api/tree?prefix=state/").await;
        assert_eq!(body[0]["path"], "state/agent-id");
        assert_eq!(body[0]["value"]["value"], "deviceA");
    }
}
