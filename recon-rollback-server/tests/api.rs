//! HTTP contract tests for the rollback server, driven through the router
//! without binding a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use recon_rollback_core::{
    EngineConfig, EnginePorts, JsonlAuditStore, MemoryStore, RollbackService,
    RollbackServiceImpl, SeedBundle,
};
use recon_rollback_server::bootstrap::build_service;
use recon_rollback_server::config::ServerConfig;
use recon_rollback_server::router::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;

// ── Test app builder ───────────────────────────────────────────

fn build_test_app() -> axum::Router {
    let store = Arc::new(MemoryStore::from_seed(SeedBundle::demo().unwrap()));
    let service: Arc<dyn RollbackService> = Arc::new(RollbackServiceImpl::new(
        EnginePorts::in_memory(store),
        EngineConfig::default(),
    ));
    build_router(service)
}

/// App wired the way the server binary wires it, over `data_dir`.
async fn build_server_app(data_dir: &std::path::Path) -> axum::Router {
    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    build_router(build_service(&config).await.unwrap())
}

fn run_status<'a>(runs: &'a Value, run_id: &str) -> &'a Value {
    &runs
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["run_id"] == run_id)
        .unwrap()["status"]
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }))
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

// ── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let app = build_test_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_runs_and_cycles() {
    let app = build_test_app();
    let (status, body) = get(&app, "/runs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);

    let (status, body) = get(&app, "/runs/RUN_002/cycles").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cycles"], json!(["1C", "2C", "3C"]));

    let (status, body) = get(&app, "/runs/RUN_404/cycles").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn test_rollback_commits_and_appears_in_history() {
    let app = build_test_app();
    let (status, record) = post(
        &app,
        "/rollbacks",
        json!({ "run_id": "RUN_002", "level": "file", "cycle_id": "2C", "reason": "corrupt NPCI file" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "completed");
    assert_eq!(record["cycle_id"], "2C");
    assert_eq!(record["details"]["outcome"], "committed");

    let (_, history) = get(&app, "/rollbacks?run_id=RUN_002").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["rollback_id"], record["rollback_id"]);

    let (_, cycles) = get(&app, "/runs/RUN_002/cycles").await;
    assert_eq!(cycles["cycles"], json!(["1C", "3C"]));
}

#[tokio::test]
async fn test_guardrail_violation_is_422_with_rollback_id() {
    let app = build_test_app();
    let (status, state) = post(&app, "/runs/RUN_001/ttum-downloaded", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["ttum_downloaded"], true);

    let (status, body) = post(&app, "/rollbacks", json!({ "run_id": "RUN_001", "level": "complete" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "guardrail_violation");
    assert!(body["error"]["message"].as_str().unwrap().contains("downloaded"));
    let rollback_id = body["error"]["rollback_id"].as_str().unwrap().to_string();

    let (status, trail) = get(&app, "/runs/RUN_001/audit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trail[0]["rollback_id"], rollback_id);
    assert_eq!(trail[0]["status"], "failed");
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let app = build_test_app();
    let (status, body) = post(&app, "/rollbacks", json!({ "run_id": "RUN_001", "level": "file" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");

    let (status, _) = post(&app, "/rollbacks", json!({ "run_id": "RUN_001", "level": "partial" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rollbacks")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["kind"], "validation_error");
}

#[tokio::test]
async fn test_in_progress_run_is_409() {
    let app = build_test_app();
    let (status, body) = post(&app, "/rollbacks", json!({ "run_id": "RUN_005", "level": "recon" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "conflict");
}

#[tokio::test]
async fn test_plan_does_not_write_audit() {
    let app = build_test_app();
    let (status, preview) = post(&app, "/rollbacks/plan", json!({ "run_id": "RUN_003", "level": "complete" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["steps"].as_array().unwrap().len(), 4);
    assert_eq!(preview["steps"][0]["class"], "ttum_package");
    assert_eq!(preview["subsumed_levels"], json!(["file", "recon", "reports", "ttum"]));

    let (_, history) = get(&app, "/rollbacks").await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_history_and_guardrails() {
    let app = build_test_app();
    post(&app, "/rollbacks", json!({ "run_id": "RUN_003", "level": "reports" })).await;

    let (status, history) = get(&app, "/runs/history").await;
    assert_eq!(status, StatusCode::OK);
    let run_003 = history
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["run_id"] == "RUN_003")
        .unwrap();
    assert_eq!(run_003["rollback_attempts"], 1);
    assert_eq!(run_003["last_rollback"]["level"], "reports");

    let (status, guardrails) = get(&app, "/runs/RUN_004/guardrails").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(guardrails["ttum_downloaded"], true);
}

#[tokio::test]
async fn test_audit_ledger_on_disk_serves_history() {
    let dir = tempfile::TempDir::new().unwrap();
    let ledger = Arc::new(
        JsonlAuditStore::open(dir.path().join("audit.jsonl"))
            .await
            .unwrap(),
    );
    let store = Arc::new(MemoryStore::from_seed(SeedBundle::demo().unwrap()));
    let service: Arc<dyn RollbackService> = Arc::new(RollbackServiceImpl::new(
        EnginePorts::in_memory(store).with_audit(ledger),
        EngineConfig::default(),
    ));
    let app = build_router(service);

    let (status, _) = post(&app, "/rollbacks", json!({ "run_id": "RUN_001", "level": "ttum" })).await;
    assert_eq!(status, StatusCode::OK);

    let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    assert_eq!(contents.lines().count(), 1);
    let (_, history) = get(&app, "/rollbacks").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_server_wiring_keeps_seeded_guardrails() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = build_server_app(dir.path()).await;

    let (status, guardrails) = get(&app, "/runs/RUN_004/guardrails").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(guardrails["ttum_downloaded"], true);
    assert_eq!(guardrails["ttum_downloaded_at"], "2026-10-17T14:42:00Z");

    let (status, body) = post(&app, "/rollbacks", json!({ "run_id": "RUN_004", "level": "ttum" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "guardrail_violation");

    let (status, _) = post(&app, "/rollbacks", json!({ "run_id": "RUN_004", "level": "reports" })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, guardrails) = get(&app, "/runs/RUN_001/guardrails").await;
    assert_eq!(guardrails["ttum_downloaded"], false);
}

#[tokio::test]
async fn test_restart_replays_ledger_onto_seeded_runs() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let app = build_server_app(dir.path()).await;
        let (status, _) = post(&app, "/rollbacks", json!({ "run_id": "RUN_003", "level": "complete" })).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post(&app, "/rollbacks", json!({ "run_id": "RUN_002", "level": "file", "cycle_id": "2C" })).await;
        assert_eq!(status, StatusCode::OK);
        post(&app, "/runs/RUN_001/ttum-downloaded", json!({})).await;
    }

    let app = build_server_app(dir.path()).await;
    let (_, runs) = get(&app, "/runs").await;
    assert_eq!(run_status(&runs, "RUN_003"), "rolled_back");
    assert_eq!(run_status(&runs, "RUN_002"), "completed");

    let (status, body) = post(&app, "/rollbacks", json!({ "run_id": "RUN_003", "level": "complete" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");

    let (_, cycles) = get(&app, "/runs/RUN_002/cycles").await;
    assert_eq!(cycles["cycles"], json!(["1C", "3C"]));

    let (_, guardrails) = get(&app, "/runs/RUN_001/guardrails").await;
    assert_eq!(guardrails["ttum_downloaded"], true);

    let (_, history) = get(&app, "/rollbacks").await;
    assert_eq!(history.as_array().unwrap().len(), 2);
}
