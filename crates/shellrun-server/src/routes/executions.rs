use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use shellrun_core::types::ExecutionId;

use crate::error::AppError;
use crate::state::AppState;

fn parse_id(raw: &str) -> Result<ExecutionId, AppError> {
    raw.parse::<i64>()
        .map(ExecutionId)
        .map_err(|_| AppError::bad_request(format!("invalid execution id '{raw}'")))
}

#[derive(serde::Deserialize)]
pub struct ExecuteBody {
    pub alias: String,
}

/// POST /api/executions: launch the command registered under `alias`.
///
/// Responds as soon as the execution is recorded; output is captured in the
/// background and read through the logs endpoint.
pub async fn execute(
    State(app): State<AppState>,
    Json(body): Json<ExecuteBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let id = app.executor.execute(&body.alias).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// GET /api/executions/active: executions whose process is still running.
pub async fn list_active(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let active = app.executor.active().await?;
    Ok(Json(serde_json::json!(active)))
}

/// GET /api/executions/{id}
pub async fn get_execution(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let execution = app.executor.get(parse_id(&id)?).await?;
    Ok(Json(serde_json::json!(execution)))
}

/// POST /api/executions/{id}/stop: kill the process and finalize the record.
pub async fn stop_execution(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_id(&id)?;
    app.executor.stop(id).await?;
    Ok(Json(serde_json::json!({ "id": id, "active": false })))
}

/// GET /api/executions/{id}/logs: captured output in insertion order.
pub async fn get_logs(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let lines = app.executor.logs(parse_id(&id)?).await?;
    Ok(Json(serde_json::json!(lines)))
}
