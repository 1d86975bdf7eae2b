//! Handlers for the service registry and check configurations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::db::entities::prelude::*;
use crate::db::services::health_check_service::{self, CheckConfigUpdate};
use crate::db::services::service_service;
use crate::monitoring::detect::{auto_detect_health_check, ServiceKind};
use crate::monitoring::{CheckConfig, CheckOutcome, HealthStatus, OutcomeDetail};
use crate::web::error::AppError;
use crate::web::models::{CreateServiceRequest, DetectRequest, ServiceDetails};
use crate::web::AppState;

pub async fn create_service_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<ServiceModel>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::InvalidInput("service name must not be empty".to_string()));
    }

    let service = service_service::create_service(
        &state.db,
        request.name.trim(),
        &request.service_type,
        request.url,
    )
    .await?;
    state.broadcaster.publish_services_updated();

    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn list_services_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceDetails>>, AppError> {
    let services = service_service::list_services(&state.db).await?;

    let mut details = Vec::with_capacity(services.len());
    for service in services {
        let check_config = health_check_service::get_check_config(&state.db, service.id).await?;
        let last_result = latest_outcome(&state, service.id).await?;
        details.push(ServiceDetails {
            service,
            check_config,
            last_result,
        });
    }
    Ok(Json(details))
}

pub async fn get_service_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<ServiceDetails>, AppError> {
    let service = service_service::get_service(&state.db, service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("service {service_id} not found")))?;

    Ok(Json(ServiceDetails {
        check_config: health_check_service::get_check_config(&state.db, service_id).await?,
        last_result: latest_outcome(&state, service_id).await?,
        service,
    }))
}

pub async fn delete_service_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    state.monitor.stop_monitoring(service_id).await;

    if !service_service::delete_service(&state.db, service_id).await? {
        return Err(AppError::NotFound(format!("service {service_id} not found")));
    }
    state.broadcaster.publish_services_updated();

    Ok(StatusCode::NO_CONTENT)
}

/// Proposes a check config for a service. When the request names an existing
/// service the proposal is persisted and, if enabled, its loop started.
pub async fn detect_check_handler(
    State(state): State<AppState>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<CheckConfig>, AppError> {
    let kind = ServiceKind::parse(&request.service_type);
    let service_id = request.service_id.unwrap_or(0);

    let mut config =
        auto_detect_health_check(service_id, &request.name, kind, request.url.as_deref()).await;

    if let Some(service_id) = request.service_id {
        service_service::get_service(&state.db, service_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("service {service_id} not found")))?;

        config.service_id = service_id;
        health_check_service::upsert_check_config(&state.db, service_id, (&config).into())
            .await?;
        state.monitor.start_monitoring(config.clone()).await;
    }

    Ok(Json(config))
}

pub async fn get_check_config_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<HealthCheckConfigModel>, AppError> {
    let config = health_check_service::get_check_config(&state.db, service_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("no health check configured for service {service_id}"))
        })?;
    Ok(Json(config))
}

/// Creates or replaces a service's check config and reconciles its loop
/// immediately instead of waiting for the next re-sync.
pub async fn upsert_check_config_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
    Json(update): Json<CheckConfigUpdate>,
) -> Result<Json<HealthCheckConfigModel>, AppError> {
    service_service::get_service(&state.db, service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("service {service_id} not found")))?;

    let model = health_check_service::upsert_check_config(&state.db, service_id, update).await?;
    let config = CheckConfig::try_from(&model)?;
    state.monitor.start_monitoring(config).await;

    Ok(Json(model))
}

pub async fn latest_result_handler(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<CheckOutcome>, AppError> {
    latest_outcome(&state, service_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no results for service {service_id}")))
}

/// Prefers the in-memory cache; falls back to the latest persisted row.
async fn latest_outcome(
    state: &AppState,
    service_id: i32,
) -> Result<Option<CheckOutcome>, AppError> {
    if let Some(outcome) = state.monitor.latest_result(service_id) {
        return Ok(Some(outcome));
    }

    let Some(row) = health_check_service::latest_result_for_service(&state.db, service_id).await?
    else {
        return Ok(None);
    };

    let detail = row
        .details
        .and_then(|value| serde_json::from_value::<OutcomeDetail>(value).ok());
    Ok(Some(CheckOutcome {
        service_id: row.service_id,
        status: if row.status == "HEALTHY" {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        response_time_ms: row.response_time_ms.max(0) as u64,
        checked_at: row.checked_at,
        error: row.error_message,
        detail,
    }))
}
