use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/commands: list all registered commands.
pub async fn list_commands(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let commands = app.executor.commands().await?;
    Ok(Json(serde_json::json!(commands)))
}

/// GET /api/commands/{alias}: a single command.
pub async fn get_command(
    State(app): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let command = app.executor.command(&alias).await?;
    Ok(Json(serde_json::json!(command)))
}

#[derive(serde::Deserialize)]
pub struct CreateCommandBody {
    pub alias: String,
    pub script: String,
}

/// POST /api/commands: register a new command under a unique alias.
pub async fn create_command(
    State(app): State<AppState>,
    Json(body): Json<CreateCommandBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let id = app.executor.register(&body.alias, &body.script).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "alias": body.alias })),
    ))
}
