use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;

use crate::engine::Monitor;
use crate::models::{OverallStatus, ServiceStatus};

async fn get_status(State(monitor): State<Arc<Monitor>>) -> Json<Vec<ServiceStatus>> {
    Json(monitor.current_status())
}

#[derive(Serialize)]
struct Overall {
    #[serde(flatten)]
    status: OverallStatus,
    summary: String,
}

async fn get_overall(State(monitor): State<Arc<Monitor>>) -> Json<Overall> {
    let status = monitor.overall_status();
    Json(Overall {
        status,
        summary: status.to_string(),
    })
}

async fn get_service(
    State(monitor): State<Arc<Monitor>>,
    Path(name): Path<String>,
) -> Response {
    match monitor.status_of(&name) {
        Some(status) => Json(status).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "service not found" })),
        )
            .into_response(),
    }
}

async fn retry_service(
    State(monitor): State<Arc<Monitor>>,
    Path(name): Path<String>,
) -> Json<ServiceStatus> {
    Json(monitor.retry(&name).await)
}

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/overall", get(get_overall))
        .route("/api/services/:name", get(get_service))
        .route("/api/services/:name/retry", post(retry_service))
        .fallback_service(ServeDir::new("public"))
        .with_state(monitor)
}

pub async fn start_server(port: u16, monitor: Arc<Monitor>) {
    let app = create_router(monitor);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Status API: http://localhost:{}/api/status", addr.port());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind API port");
    axum::serve(listener, app).await.unwrap();
}
