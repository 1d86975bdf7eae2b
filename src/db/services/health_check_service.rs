use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;

use crate::db::entities::prelude::*;
use crate::monitoring::{CheckConfig, CheckOutcome, Probe};

/// Column values for creating or updating a service's check configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfigUpdate {
    pub check_type: String,
    pub target: String,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub expected_status: Option<i32>,
    #[serde(default)]
    pub expected_response: Option<String>,
    pub timeout_ms: i64,
    pub interval_ms: i64,
    #[serde(default = "default_retries")]
    pub max_retries: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_retries() -> i32 {
    3
}

fn default_enabled() -> bool {
    true
}

impl From<&CheckConfig> for CheckConfigUpdate {
    fn from(config: &CheckConfig) -> Self {
        let (http_method, expected_status, expected_response) = match &config.probe {
            Probe::Http {
                method,
                expected_status,
                expected_body,
                ..
            } => (
                Some(method.clone()),
                expected_status.map(i32::from),
                expected_body.clone(),
            ),
            Probe::Tcp { .. } => (None, None, None),
            Probe::Command { expected_output, .. } | Probe::Script { expected_output, .. } => {
                (None, None, expected_output.clone())
            }
        };

        Self {
            check_type: config.probe.kind().to_string(),
            target: config.probe.target().to_string(),
            http_method,
            expected_status,
            expected_response,
            timeout_ms: config.timeout_ms as i64,
            interval_ms: config.interval_ms as i64,
            max_retries: config.max_retries as i32,
            enabled: config.enabled,
        }
    }
}

pub async fn list_enabled_check_configs(
    db: &DatabaseConnection,
) -> Result<Vec<HealthCheckConfigModel>, DbErr> {
    HealthCheckConfig::find()
        .filter(HealthCheckConfigColumn::Enabled.eq(true))
        .order_by_asc(HealthCheckConfigColumn::ServiceId)
        .all(db)
        .await
}

pub async fn get_check_config(
    db: &DatabaseConnection,
    service_id: i32,
) -> Result<Option<HealthCheckConfigModel>, DbErr> {
    HealthCheckConfig::find()
        .filter(HealthCheckConfigColumn::ServiceId.eq(service_id))
        .one(db)
        .await
}

/// Creates or replaces the single check configuration of a service.
pub async fn upsert_check_config(
    db: &DatabaseConnection,
    service_id: i32,
    update: CheckConfigUpdate,
) -> Result<HealthCheckConfigModel, DbErr> {
    let now = Utc::now();

    match get_check_config(db, service_id).await? {
        Some(existing) => {
            let mut active: HealthCheckConfigActiveModel = existing.into();
            active.check_type = Set(update.check_type.to_uppercase());
            active.target = Set(update.target);
            active.http_method = Set(update.http_method);
            active.expected_status = Set(update.expected_status);
            active.expected_response = Set(update.expected_response);
            active.timeout_ms = Set(update.timeout_ms);
            active.interval_ms = Set(update.interval_ms);
            active.max_retries = Set(update.max_retries);
            active.enabled = Set(update.enabled);
            active.updated_at = Set(now);
            active.update(db).await
        }
        None => {
            HealthCheckConfigActiveModel {
                service_id: Set(service_id),
                check_type: Set(update.check_type.to_uppercase()),
                target: Set(update.target),
                http_method: Set(update.http_method),
                expected_status: Set(update.expected_status),
                expected_response: Set(update.expected_response),
                timeout_ms: Set(update.timeout_ms),
                interval_ms: Set(update.interval_ms),
                max_retries: Set(update.max_retries),
                enabled: Set(update.enabled),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await
        }
    }
}

pub async fn insert_result(
    db: &DatabaseConnection,
    outcome: &CheckOutcome,
) -> Result<HealthCheckResultModel, DbErr> {
    let details = outcome
        .detail
        .as_ref()
        .and_then(|detail| serde_json::to_value(detail).ok());

    HealthCheckResultActiveModel {
        service_id: Set(outcome.service_id),
        status: Set(outcome.status.as_str().to_string()),
        response_time_ms: Set(outcome.response_time_ms as i64),
        checked_at: Set(outcome.checked_at),
        error_message: Set(outcome.error.clone()),
        details: Set(details),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn latest_result_for_service(
    db: &DatabaseConnection,
    service_id: i32,
) -> Result<Option<HealthCheckResultModel>, DbErr> {
    HealthCheckResult::find()
        .filter(HealthCheckResultColumn::ServiceId.eq(service_id))
        .order_by_desc(HealthCheckResultColumn::CheckedAt)
        .one(db)
        .await
}

/// Deletes result rows checked before `cutoff`. Returns how many were
/// removed.
pub async fn delete_results_older_than(
    db: &DatabaseConnection,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let deleted = HealthCheckResult::delete_many()
        .filter(HealthCheckResultColumn::CheckedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(deleted.rows_affected)
}
