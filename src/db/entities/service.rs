use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub service_type: String,
    pub url: Option<String>,
    pub status: String,
    pub last_checked: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::health_check_config::Entity")]
    HealthCheckConfig,

    #[sea_orm(has_many = "super::health_check_result::Entity")]
    HealthCheckResult,
}

impl Related<super::health_check_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HealthCheckConfig.def()
    }
}

impl Related<super::health_check_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HealthCheckResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
