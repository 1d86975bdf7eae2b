//! Handlers controlling the monitoring lifecycle.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::db::services::health_check_service;
use crate::monitoring::{CheckConfig, CheckOutcome, MonitorError};
use crate::web::error::AppError;
use crate::web::models::MonitoringStatus;
use crate::web::AppState;

pub async fn start_monitoring_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    state.global_monitor.start_global_monitoring().await;
    Ok(Json(json!({ "running": true })))
}

pub async fn stop_monitoring_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    state.global_monitor.stop_global_monitoring().await;
    Ok(Json(json!({ "running": false })))
}

pub async fn trigger_check_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    state.global_monitor.trigger_health_check().await;
    Ok(Json(json!({ "triggered": true })))
}

pub async fn monitoring_status_handler(
    State(state): State<AppState>,
) -> Result<Json<MonitoringStatus>, AppError> {
    Ok(Json(MonitoringStatus {
        running: state.global_monitor.is_monitoring().await,
        monitored_service_ids: state.monitor.monitored_service_ids().await,
    }))
}

/// Returns the cached latest outcome of every monitored service.
pub async fn monitoring_results_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<CheckOutcome>>, AppError> {
    Ok(Json(state.monitor.all_results()))
}

async fn load_config(state: &AppState, service_id: i32) -> Result<CheckConfig, AppError> {
    let model = health_check_service::get_check_config(&state.db, service_id)
        .await?
        .ok_or(MonitorError::NoCheckConfig(service_id))?;
    Ok(CheckConfig::try_from(&model)?)
}

pub async fn start_service_monitoring_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let config = load_config(&state, service_id).await?;
    if !config.enabled {
        return Err(AppError::InvalidInput(format!(
            "health check for service {service_id} is disabled"
        )));
    }
    state.monitor.start_monitoring(config).await;
    Ok(Json(json!({ "service_id": service_id, "monitoring": true })))
}

pub async fn stop_service_monitoring_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    state.monitor.stop_monitoring(service_id).await;
    Ok(Json(json!({ "service_id": service_id, "monitoring": false })))
}

/// Runs one immediate check outside the loop schedule and returns its
/// outcome.
pub async fn check_service_now_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<CheckOutcome>, AppError> {
    let config = load_config(&state, service_id).await?;
    Ok(Json(state.monitor.perform_health_check(&config).await))
}
