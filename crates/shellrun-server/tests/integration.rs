use axum::http::StatusCode;
use http_body_util::BodyExt;
use shellrun_core::config::{Config, Shell};
use shellrun_core::types::ExecutionId;
use shellrun_server::{build_router, AppState};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_state() -> AppState {
    let mut config = Config::default();
    config.shell = Shell::new("sh", "-c");
    AppState::in_memory(&config)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    state: &AppState,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn register(state: &AppState, alias: &str, script: &str) {
    let (status, _) = post_json(
        state,
        "/api/commands",
        serde_json::json!({ "alias": alias, "script": script }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

/// Block until the execution's output has been fully captured.
async fn settle(state: &AppState, id: i64) {
    if let Some(completion) = state.executor.completion(ExecutionId(id)) {
        completion.wait().await;
    }
}

fn messages(body: &serde_json::Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|l| l["message"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let state = test_state();
    let (status, body) = get(&state, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_command_returns_201_with_id() {
    let state = test_state();
    let (status, body) = post_json(
        &state,
        "/api/commands",
        serde_json::json!({ "alias": "hello", "script": "echo hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].is_i64());
    assert_eq!(body["alias"], "hello");
}

#[tokio::test]
async fn duplicate_alias_returns_409() {
    let state = test_state();
    register(&state, "hello", "echo hi").await;
    let (status, body) = post_json(
        &state,
        "/api/commands",
        serde_json::json!({ "alias": "hello", "script": "echo again" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("hello"));
}

#[tokio::test]
async fn empty_script_returns_400() {
    let state = test_state();
    let (status, _) = post_json(
        &state,
        "/api/commands",
        serde_json::json!({ "alias": "blank", "script": "" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_and_get_commands() {
    let state = test_state();
    register(&state, "a", "echo a").await;
    register(&state, "b", "echo b").await;

    let (status, body) = get(&state, "/api/commands").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get(&state, "/api/commands/b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["script"], "echo b");
}

#[tokio::test]
async fn unknown_command_returns_404() {
    let state = test_state();
    let (status, body) = get(&state, "/api/commands/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_unknown_alias_returns_404() {
    let state = test_state();
    let (status, _) = post_json(
        &state,
        "/api/executions",
        serde_json::json!({ "alias": "nope" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, active) = get(&state, "/api/executions/active").await;
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_execution_id_returns_400() {
    let state = test_state();
    let (status, _) = get(&state, "/api/executions/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post_json(&state, "/api/executions/abc/stop", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_execution_returns_404() {
    let state = test_state();
    let (status, _) = get(&state, "/api/executions/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&state, "/api/executions/42/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post_json(&state, "/api/executions/42/stop", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn execute_captures_output_and_finalizes() {
    let state = test_state();
    register(&state, "greet", "echo one; echo two >&2; echo three").await;

    let (status, body) = post_json(
        &state,
        "/api/executions",
        serde_json::json!({ "alias": "greet" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();
    settle(&state, id).await;

    let (status, execution) = get(&state, &format!("/api/executions/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(execution["active"], false);
    assert!(execution["process_id"].as_u64().unwrap() > 0);

    let (status, logs) = get(&state, &format!("/api/executions/{id}/logs")).await;
    assert_eq!(status, StatusCode::OK);
    let lines = messages(&logs);
    assert_eq!(lines.len(), 3);
    let stdout: Vec<_> = lines.iter().filter(|m| m.starts_with("[stdout] ")).collect();
    assert_eq!(stdout, ["[stdout] one", "[stdout] three"]);
    assert!(lines.contains(&"[stderr] two".to_string()));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_script_records_exit_code() {
    let state = test_state();
    register(&state, "fail", "echo oops; exit 3").await;

    let (_, body) = post_json(&state, "/api/executions", serde_json::json!({ "alias": "fail" })).await;
    let id = body["id"].as_i64().unwrap();
    settle(&state, id).await;

    let (_, logs) = get(&state, &format!("/api/executions/{id}/logs")).await;
    let lines = messages(&logs);
    assert_eq!(lines.first().map(String::as_str), Some("[stdout] oops"));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("[system] process exited with code 3")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn stop_running_execution_then_stop_again_conflicts() {
    let state = test_state();
    register(&state, "nap", "exec sleep 30").await;

    let (_, body) = post_json(&state, "/api/executions", serde_json::json!({ "alias": "nap" })).await;
    let id = body["id"].as_i64().unwrap();

    let (_, active) = get(&state, "/api/executions/active").await;
    let ids: Vec<i64> = active
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, [id]);

    let uri = format!("/api/executions/{id}/stop");
    let (status, body) = post_json(&state, &uri, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, body) = post_json(&state, &uri, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    settle(&state, id).await;
    let (_, active) = get(&state, "/api/executions/active").await;
    assert!(active.as_array().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_executions_keep_logs_separate() {
    let state = test_state();
    register(&state, "slow", "sleep 1; echo slow").await;
    register(&state, "fast", "echo fast").await;

    let (_, slow) = post_json(&state, "/api/executions", serde_json::json!({ "alias": "slow" })).await;
    let (_, fast) = post_json(&state, "/api/executions", serde_json::json!({ "alias": "fast" })).await;
    let slow = slow["id"].as_i64().unwrap();
    let fast = fast["id"].as_i64().unwrap();
    assert_ne!(slow, fast);

    settle(&state, fast).await;
    let (_, execution) = get(&state, &format!("/api/executions/{slow}")).await;
    assert_eq!(execution["active"], true);

    settle(&state, slow).await;
    let (_, fast_logs) = get(&state, &format!("/api/executions/{fast}/logs")).await;
    let (_, slow_logs) = get(&state, &format!("/api/executions/{slow}/logs")).await;
    assert_eq!(messages(&fast_logs), ["[stdout] fast"]);
    assert_eq!(messages(&slow_logs), ["[stdout] slow"]);
}
