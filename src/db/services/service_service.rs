use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use crate::db::entities::prelude::*;
use crate::monitoring::ServiceStatus;

pub async fn create_service(
    db: &DatabaseConnection,
    name: &str,
    service_type: &str,
    url: Option<String>,
) -> Result<ServiceModel, DbErr> {
    let now = Utc::now();
    ServiceActiveModel {
        name: Set(name.to_string()),
        service_type: Set(service_type.to_uppercase()),
        url: Set(url),
        status: Set(ServiceStatus::Unknown.as_str().to_string()),
        last_checked: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn list_services(db: &DatabaseConnection) -> Result<Vec<ServiceModel>, DbErr> {
    Service::find().order_by_asc(ServiceColumn::Id).all(db).await
}

pub async fn get_service(
    db: &DatabaseConnection,
    service_id: i32,
) -> Result<Option<ServiceModel>, DbErr> {
    Service::find_by_id(service_id).one(db).await
}

/// Removes a service together with its check config and result rows.
pub async fn delete_service(db: &DatabaseConnection, service_id: i32) -> Result<bool, DbErr> {
    let txn = db.begin().await?;

    HealthCheckConfig::delete_many()
        .filter(HealthCheckConfigColumn::ServiceId.eq(service_id))
        .exec(&txn)
        .await?;
    HealthCheckResult::delete_many()
        .filter(HealthCheckResultColumn::ServiceId.eq(service_id))
        .exec(&txn)
        .await?;
    let deleted = Service::delete_by_id(service_id).exec(&txn).await?;

    txn.commit().await?;
    Ok(deleted.rows_affected > 0)
}

/// Writes a service's status and last-checked timestamp. Returns whether the
/// status actually changed; a missing service is not an error.
pub async fn update_service_status(
    db: &DatabaseConnection,
    service_id: i32,
    status: ServiceStatus,
    checked_at: DateTime<Utc>,
) -> Result<bool, DbErr> {
    let Some(service) = Service::find_by_id(service_id).one(db).await? else {
        debug!(service_id, "skipping status update for unknown service");
        return Ok(false);
    };

    let changed = service.status != status.as_str();
    let mut active: ServiceActiveModel = service.into();
    active.status = Set(status.as_str().to_string());
    active.last_checked = Set(Some(checked_at));
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(changed)
}
