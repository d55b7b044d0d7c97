pub mod error;
pub mod pg;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use shellrun_core::config::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Commands
        .route("/api/commands", get(routes::commands::list_commands))
        .route("/api/commands", post(routes::commands::create_command))
        .route("/api/commands/{alias}", get(routes::commands::get_command))
        // Executions
        .route("/api/executions", post(routes::executions::execute))
        .route(
            "/api/executions/active",
            get(routes::executions::list_active),
        )
        .route("/api/executions/{id}", get(routes::executions::get_execution))
        .route(
            "/api/executions/{id}/stop",
            post(routes::executions::stop_execution),
        )
        .route(
            "/api/executions/{id}/logs",
            get(routes::executions::get_logs),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

fn with_timeout(router: Router, secs: u64) -> Router {
    if secs == 0 {
        return router;
    }
    router.layer(TimeoutLayer::new(Duration::from_secs(secs)))
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: &Config, app_state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.http.addr()).await?;
    serve_on(config, app_state, listener).await
}

/// Serve on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free one).
pub async fn serve_on(
    config: &Config,
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let app = with_timeout(build_router(app_state), config.http.request_timeout_secs);
    let addr = listener.local_addr()?;

    tracing::info!("shellrun server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
