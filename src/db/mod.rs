pub mod entities;
pub mod services;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};

/// Creates the tables for all entities if they do not exist yet.
///
/// The sqlite backend has no external migration tooling, so the schema is
/// bootstrapped from the entity definitions at startup (and in tests).
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut services = schema.create_table_from_entity(entities::service::Entity);
    db.execute(backend.build(services.if_not_exists())).await?;

    let mut configs = schema.create_table_from_entity(entities::health_check_config::Entity);
    db.execute(backend.build(configs.if_not_exists())).await?;

    let mut results = schema.create_table_from_entity(entities::health_check_result::Entity);
    db.execute(backend.build(results.if_not_exists())).await?;

    Ok(())
}
