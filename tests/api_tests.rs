//! HTTP API integration tests
//!
//! Drive the full router with `axum-test` against an in-memory store and a
//! scripted provider.

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::mocks::{Fault, MockLLMFactory, ScriptedLLMClient};
use common::{fast_pipeline_config, test_config, test_state};
use deepbench::analytics::{ModelDetail, ScoredHistoryEntry};
use deepbench::db::{ComparisonSummary, ModelPerformance};
use deepbench::events::{EventType, emitter};
use deepbench::types::{ModelKind, ResearchResult, SessionWithResults};
use deepbench::utils::toml_config::{AuthConfig, DeepbenchConfig};
use serde_json::{Value, json};
use std::sync::Arc;

async fn create_test_server(client: ScriptedLLMClient) -> (TestServer, Arc<MockLLMFactory>) {
    create_server_with_config(client, test_config(fast_pipeline_config())).await
}

async fn create_server_with_config(
    client: ScriptedLLMClient,
    config: DeepbenchConfig,
) -> (TestServer, Arc<MockLLMFactory>) {
    let (state, factory) = test_state(Arc::new(client), config).await;
    let server = TestServer::new(deepbench::app(state)).expect("Failed to create test server");
    (server, factory)
}

// ============= Health =============

#[tokio::test]
async fn test_health_lists_models() {
    let (server, _) = create_test_server(ScriptedLLMClient::new("report")).await;

    for path in ["/", "/health"] {
        let response = server.get(path).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models"], json!(["openai", "anthropic", "kimi"]));
    }
}

#[tokio::test]
async fn test_models_endpoint_reports_effective_settings() {
    let (server, _) = create_test_server(ScriptedLLMClient::new("report")).await;

    let response = server.get("/models").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let kimi = body
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["model"] == "kimi")
        .unwrap();
    assert_eq!(kimi["provider"], "Moonshot AI");
    assert_eq!(kimi["api_base"], "https://api.moonshot.ai/anthropic/v1");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let (server, _) = create_test_server(ScriptedLLMClient::new("report")).await;
    let response = server.get("/openapi.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["paths"]["/research/stream"].is_object());
}

// ============= Streaming runs =============

#[tokio::test]
async fn test_stream_run_end_to_end() {
    let (server, factory) =
        create_test_server(ScriptedLLMClient::with_report_shape(4, 600)).await;

    let response = server
        .post("/research/stream")
        .json(&json!({
            "query": "Compare Raft and Paxos",
            "model": "anthropic",
            "api_key": "sk-ant-test"
        }))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "text/event-stream"
    );

    let events = emitter::decode(&response.text());
    assert_eq!(events.first().unwrap().event_type, EventType::SessionStart);
    assert_eq!(events.last().unwrap().event_type, EventType::ResearchComplete);
    assert!(events.iter().all(|e| e.model == ModelKind::Anthropic));

    let configs = factory.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].api_key, "sk-ant-test");
    assert_eq!(configs[0].model, ModelKind::Anthropic);

    let response = server.get("/research/history").await;
    response.assert_status_ok();
    let history: Vec<ScoredHistoryEntry> = response.json();
    let newest = history.first().expect("history entry");
    assert_eq!(newest.entry.query, "Compare Raft and Paxos");
    assert_eq!(newest.entry.model, ModelKind::Anthropic);
    assert!(newest.entry.success);
    assert_eq!(newest.entry.sources_found, 4);
    assert_eq!(newest.entry.word_count, 600);
    assert_eq!(newest.quality_score, 100);
    assert_eq!(newest.entry.research_id, events[0].research_id);
}

#[tokio::test]
async fn test_failed_run_is_persisted() {
    let client = ScriptedLLMClient::with_report_shape(2, 100).fault(
        deepbench::research::prompts::BRIEF_SYSTEM,
        &[Fault::Permanent],
    );
    let (server, _) = create_test_server(client).await;

    let response = server
        .post("/research/stream")
        .json(&json!({"query": "q", "model": "openai", "api_key": "bad-key"}))
        .await;
    response.assert_status_ok();
    let events = emitter::decode(&response.text());
    assert_eq!(events.last().unwrap().event_type, EventType::Error);

    let history: Vec<ScoredHistoryEntry> = server.get("/research/history").await.json();
    assert_eq!(history.len(), 1);
    assert!(!history[0].entry.success);
    assert!(history[0].entry.error.is_some());
    assert_eq!(history[0].quality_score, 0);
}

#[rstest::rstest]
#[case(json!({"query": "  ", "model": "openai", "api_key": "k"}))]
#[case(json!({"query": "q", "model": "gemini", "api_key": "k"}))]
#[case(json!({"query": "q", "model": "kimi", "api_key": ""}))]
#[tokio::test]
async fn test_invalid_requests_rejected_before_any_write(#[case] body: Value) {
    let (server, factory) = create_test_server(ScriptedLLMClient::new("report")).await;

    let response = server.post("/research/stream").json(&body).await;
    response.assert_status_bad_request();
    let error: Value = response.json();
    assert!(error["error"].as_str().unwrap().contains("Invalid input"));

    let sessions: Vec<SessionWithResults> = server.get("/research/sessions").await.json();
    assert!(sessions.is_empty());
    assert!(factory.configs().is_empty());
}

// ============= Synchronous runs =============

#[tokio::test]
async fn test_sync_run_returns_result() {
    let (server, _) = create_test_server(ScriptedLLMClient::with_report_shape(7, 250)).await;

    let response = server
        .post("/research")
        .json(&json!({
            "query": "State of WebAssembly GC",
            "model": "kimi",
            "api_key": "sk-kimi",
            "session_id": "wasm-1"
        }))
        .await;
    response.assert_status_ok();
    let result: ResearchResult = response.json();
    assert!(result.success);
    assert_eq!(result.session_id, "wasm-1");
    assert_eq!(result.model, ModelKind::Kimi);
    assert_eq!(result.sources_found, 7);

    let session: SessionWithResults = server.get("/research/sessions/wasm-1").await.json();
    assert_eq!(session.results.len(), 1);
    assert_eq!(session.results[0].research_id, result.research_id);
}

#[tokio::test]
async fn test_session_reuse_with_other_query_conflicts() {
    let (server, _) = create_test_server(ScriptedLLMClient::with_report_shape(1, 10)).await;

    server
        .post("/research")
        .json(&json!({"query": "first", "model": "openai", "api_key": "k", "session_id": "s-1"}))
        .await
        .assert_status_ok();

    let response = server
        .post("/research")
        .json(&json!({"query": "second", "model": "openai", "api_key": "k", "session_id": "s-1"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // Same query, but the individual session already holds its result
    let response = server
        .post("/research/stream")
        .json(&json!({"query": "first", "model": "anthropic", "api_key": "k", "session_id": "s-1"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

// ============= Comparisons =============

#[tokio::test]
async fn test_comparison_stream_runs_each_model() {
    let (server, factory) = create_test_server(ScriptedLLMClient::with_report_shape(2, 300)).await;

    let response = server
        .post("/research/compare/stream")
        .json(&json!({
            "query": "Best embedded database for edge devices",
            "session_id": "cmp-1",
            "runs": [
                {"model": "openai", "api_key": "sk-openai"},
                {"model": "anthropic", "api_key": "sk-ant"}
            ]
        }))
        .await;
    response.assert_status_ok();

    let events = emitter::decode(&response.text());
    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 2);
    assert_eq!(terminals[0].model, ModelKind::OpenAI);
    assert_eq!(terminals[1].model, ModelKind::Anthropic);
    assert_ne!(terminals[0].research_id, terminals[1].research_id);
    // The second run starts only after the first one ended
    let second_start = events
        .iter()
        .position(|e| e.model == ModelKind::Anthropic)
        .unwrap();
    assert_eq!(events[second_start - 1].event_type, EventType::ResearchComplete);

    let keys: Vec<String> = factory.configs().into_iter().map(|c| c.api_key).collect();
    assert_eq!(keys, vec!["sk-openai", "sk-ant"]);

    let comparisons: Vec<ComparisonSummary> = server.get("/research/comparisons").await.json();
    assert_eq!(comparisons.len(), 1);
    assert_eq!(comparisons[0].session_id, "cmp-1");
    assert_eq!(comparisons[0].models_compared, 2);
    assert_eq!(comparisons[0].successful_runs, 2);

    let individual: Vec<ScoredHistoryEntry> =
        server.get("/research/history/individual").await.json();
    assert!(individual.is_empty());
}

#[tokio::test]
async fn test_comparison_rejects_duplicate_models() {
    let (server, _) = create_test_server(ScriptedLLMClient::new("report")).await;

    let response = server
        .post("/research/compare/stream")
        .json(&json!({
            "query": "q",
            "runs": [
                {"model": "kimi", "api_key": "a"},
                {"model": "kimi", "api_key": "b"}
            ]
        }))
        .await;
    response.assert_status_bad_request();

    let response = server
        .post("/research/compare/stream")
        .json(&json!({"query": "q", "runs": []}))
        .await;
    response.assert_status_bad_request();
}

// ============= Analytics =============

#[tokio::test]
async fn test_model_performance_and_detail() {
    let (server, _) = create_test_server(ScriptedLLMClient::with_report_shape(3, 90)).await;

    for i in 0..2 {
        server
            .post("/research")
            .json(&json!({"query": format!("query {}", i), "model": "openai", "api_key": "k"}))
            .await
            .assert_status_ok();
    }

    let performance: Vec<ModelPerformance> =
        server.get("/research/models/performance").await.json();
    assert_eq!(performance.len(), 1);
    assert_eq!(performance[0].model, ModelKind::OpenAI);
    assert_eq!(performance[0].total_runs, 2);
    assert_eq!(performance[0].success_rate, 100.0);
    assert_eq!(performance[0].avg_sources, 3.0);

    let response = server.get("/research/models/openai").await;
    response.assert_status_ok();
    let detail: ModelDetail = response.json();
    assert_eq!(detail.recent_runs.len(), 2);
    assert!(detail.summary.is_some());
    assert!(
        detail
            .stage_averages
            .iter()
            .any(|s| s.stage == "research_execution")
    );
    assert_eq!(detail.recent_runs[0].quality_score, 39);

    let unused: ModelDetail = server.get("/research/models/kimi").await.json();
    assert!(unused.summary.is_none());
    assert!(unused.recent_runs.is_empty());

    server
        .get("/research/models/gemini")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_history_query_filters() {
    let (server, _) = create_test_server(ScriptedLLMClient::with_report_shape(1, 10)).await;

    for (query, model) in [("Rust borrow checker", "openai"), ("Zig comptime", "kimi")] {
        server
            .post("/research")
            .json(&json!({"query": query, "model": model, "api_key": "k"}))
            .await
            .assert_status_ok();
    }

    let rust: Vec<ScoredHistoryEntry> = server
        .get("/research/history")
        .add_query_param("search", "borrow")
        .await
        .json();
    assert_eq!(rust.len(), 1);
    assert_eq!(rust[0].entry.model, ModelKind::OpenAI);

    let kimi: Vec<ScoredHistoryEntry> = server
        .get("/research/history")
        .add_query_param("model", "kimi")
        .add_query_param("success", "true")
        .await
        .json();
    assert_eq!(kimi.len(), 1);

    let limited: Vec<ScoredHistoryEntry> = server
        .get("/research/history")
        .add_query_param("limit", "1")
        .await
        .json();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].entry.query, "Zig comptime");
}

// ============= Sessions =============

#[tokio::test]
async fn test_feedback_and_delete() {
    let (server, _) = create_test_server(ScriptedLLMClient::with_report_shape(1, 10)).await;

    server
        .post("/research")
        .json(&json!({"query": "q", "model": "anthropic", "api_key": "k", "session_id": "s-1"}))
        .await
        .assert_status_ok();

    let response = server
        .put("/research/sessions/s-1/feedback")
        .json(&json!({"feedback": {"rating": 5}}))
        .await;
    response.assert_status_ok();
    let session: Value = response.json();
    assert_eq!(session["user_feedback"]["rating"], 5);

    server
        .put("/research/sessions/missing/feedback")
        .json(&json!({"feedback": {}}))
        .await
        .assert_status_not_found();

    let deleted: Value = server.delete("/research/sessions/s-1").await.json();
    assert_eq!(deleted["deleted"], true);
    let deleted: Value = server.delete("/research/sessions/s-1").await.json();
    assert_eq!(deleted["deleted"], false);

    server
        .get("/research/sessions/s-1")
        .await
        .assert_status_not_found();
    let history: Vec<ScoredHistoryEntry> = server.get("/research/history").await.json();
    assert!(history.is_empty());
}

// ============= Auth =============

#[tokio::test]
async fn test_api_key_required_when_configured() {
    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var("DEEPBENCH_TEST_API_KEY_REQUIRED", "letmein") };
    let config = DeepbenchConfig {
        auth: AuthConfig {
            api_key_env: Some("DEEPBENCH_TEST_API_KEY_REQUIRED".to_string()),
        },
        ..test_config(fast_pipeline_config())
    };
    let (server, _) = create_server_with_config(ScriptedLLMClient::new("report"), config).await;

    server.get("/health").await.assert_status_ok();
    server
        .get("/research/history")
        .await
        .assert_status_unauthorized();
    server
        .get("/research/history")
        .add_header("Authorization", "Bearer wrong")
        .await
        .assert_status_unauthorized();
    server
        .get("/research/history")
        .add_header("Authorization", "Bearer letmein")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_unset_api_key_variable_leaves_routes_open() {
    let config = DeepbenchConfig {
        auth: AuthConfig {
            api_key_env: Some("DEEPBENCH_TEST_API_KEY_NEVER_SET".to_string()),
        },
        ..test_config(fast_pipeline_config())
    };
    let (server, _) = create_server_with_config(ScriptedLLMClient::new("report"), config).await;
    server.get("/research/sessions").await.assert_status_ok();
}
