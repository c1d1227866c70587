//! Thin HTTP facade that triggers runs of the Nexous run engine.
//!
//! The facade owns no orchestration logic of its own: every request is
//! translated into a `RunOptions` and handed straight to
//! `nexous_core::Runner::run`. Routes, request/response shapes and error
//! mapping follow the ag-ui server's `AppState`/axum-router pattern.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use nexous_core::runner::{generate_run_id, use_llm_from_env, RunOptions, Runner};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Nexous server - HTTP facade over the run engine")]
struct Cli {
    #[clap(long, default_value = "127.0.0.1:3030")]
    bind_addr: String,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(long, default_value = "presets")]
    preset_dir: String,

    #[clap(long, default_value = "traces")]
    trace_root: String,

    #[clap(long, default_value = "workspace")]
    tool_base_dir: String,
}

#[derive(Clone)]
struct AppState {
    preset_dir: PathBuf,
    trace_root: PathBuf,
    tool_base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    project_path: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    use_llm: Option<bool>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", timestamp: chrono::Utc::now(), version: env!("CARGO_PKG_VERSION") })
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::Json(request): axum::extract::Json<RunRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    log::info!("received run request for project '{}'", request.project_path);

    let options = RunOptions {
        run_id: request.run_id.clone().or_else(|| Some(generate_run_id())),
        use_llm: request.use_llm.unwrap_or_else(use_llm_from_env),
        dry_run: request.dry_run,
        trace_root: state.trace_root.clone(),
        preset_dir: state.preset_dir.clone(),
        tool_base_dir: state.tool_base_dir.clone(),
    };

    match Runner::run(&PathBuf::from(&request.project_path), options).await {
        Ok(outcome) => Ok(Json(json!({
            "status": "success",
            "run_id": outcome.run_id,
            "run_status": format!("{:?}", outcome.status),
            "trace_path": outcome.trace_path,
        }))),
        Err(e) => {
            log::error!("run failed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "run failed", "details": e.to_string() })),
            ))
        }
    }
}

async fn run_status_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::Path((project_id, run_id)): axum::extract::Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let trace_path = state.trace_root.join(&project_id).join(&run_id).join("trace.json");
    match nexous_core::trace::load_trace(&trace_path) {
        Ok(trace) => Ok(Json(serde_json::to_value(&trace).unwrap_or_else(|_| json!({})))),
        Err(_) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "run not found", "project_id": project_id, "run_id": run_id })),
        )),
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/runs", post(run_handler))
        .route("/projects/{project_id}/runs/{run_id}", get(run_status_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("received Ctrl+C, shutting down..."),
        _ = terminate => log::info!("received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(log_level_filter).init();

    let bind_addr: SocketAddr =
        cli.bind_addr.parse().map_err(|e| anyhow::anyhow!("invalid bind address '{}': {}", cli.bind_addr, e))?;

    let state = Arc::new(AppState {
        preset_dir: PathBuf::from(cli.preset_dir),
        trace_root: PathBuf::from(cli.trace_root),
        tool_base_dir: PathBuf::from(cli.tool_base_dir),
    });

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    log::info!("nexous-server listening on {bind_addr}");
    log::info!("health check: http://{bind_addr}/health");
    log::info!("run endpoint: http://{bind_addr}/runs");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    log::info!("nexous-server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let state = Arc::new(AppState {
            preset_dir: PathBuf::from("presets"),
            trace_root: PathBuf::from("traces"),
            tool_base_dir: PathBuf::from("workspace"),
        });
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "healthy");
    }
}
