//! SeaORM entities mapping to the database tables.
//!
//! Each entity lives in its own module; the `prelude` re-exports the
//! commonly used aliases.

pub mod health_check_config;
pub mod health_check_result;
pub mod service;

pub mod prelude {
    pub use super::service::Entity as Service;
    pub use super::service::Model as ServiceModel;
    pub use super::service::ActiveModel as ServiceActiveModel;
    pub use super::service::Column as ServiceColumn;

    pub use super::health_check_config::Entity as HealthCheckConfig;
    pub use super::health_check_config::Model as HealthCheckConfigModel;
    pub use super::health_check_config::ActiveModel as HealthCheckConfigActiveModel;
    pub use super::health_check_config::Column as HealthCheckConfigColumn;

    pub use super::health_check_result::Entity as HealthCheckResult;
    pub use super::health_check_result::Model as HealthCheckResultModel;
    pub use super::health_check_result::ActiveModel as HealthCheckResultActiveModel;
    pub use super::health_check_result::Column as HealthCheckResultColumn;
}
