//! Database access functions, grouped by the table they operate on.

pub mod health_check_service;
pub mod service_service;
