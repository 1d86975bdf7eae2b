//! HTTP API surface.

pub mod error;
pub mod models;
pub mod routes;

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use sea_orm::DatabaseConnection;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

use crate::monitoring::global::GlobalHealthMonitor;
use crate::monitoring::monitor::ServiceHealthMonitor;
use crate::server::status_broadcaster::StatusBroadcaster;

use routes::{monitoring_routes, service_routes};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub monitor: Arc<ServiceHealthMonitor>,
    pub global_monitor: Arc<GlobalHealthMonitor>,
    pub broadcaster: Arc<StatusBroadcaster>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/events", get(events_handler))
        .route(
            "/api/monitoring/start",
            post(monitoring_routes::start_monitoring_handler),
        )
        .route(
            "/api/monitoring/stop",
            post(monitoring_routes::stop_monitoring_handler),
        )
        .route(
            "/api/monitoring/trigger",
            post(monitoring_routes::trigger_check_handler),
        )
        .route(
            "/api/monitoring/status",
            get(monitoring_routes::monitoring_status_handler),
        )
        .route(
            "/api/monitoring/results",
            get(monitoring_routes::monitoring_results_handler),
        )
        .route(
            "/api/monitoring/{service_id}/start",
            post(monitoring_routes::start_service_monitoring_handler),
        )
        .route(
            "/api/monitoring/{service_id}/stop",
            post(monitoring_routes::stop_service_monitoring_handler),
        )
        .route(
            "/api/monitoring/{service_id}/check",
            post(monitoring_routes::check_service_now_handler),
        )
        .route(
            "/api/services",
            get(service_routes::list_services_handler)
                .post(service_routes::create_service_handler),
        )
        .route(
            "/api/services/detect",
            post(service_routes::detect_check_handler),
        )
        .route(
            "/api/services/{service_id}",
            get(service_routes::get_service_handler)
                .delete(service_routes::delete_service_handler),
        )
        .route(
            "/api/services/{service_id}/check",
            get(service_routes::get_check_config_handler)
                .put(service_routes::upsert_check_config_handler),
        )
        .route(
            "/api/services/{service_id}/result",
            get(service_routes::latest_result_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Server-sent event stream of service status changes.
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.broadcaster.subscribe()).filter_map(|message| async {
        // Lagged receivers skip the missed messages.
        message.ok().map(|data| Ok(Event::default().data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
