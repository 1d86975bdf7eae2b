pub mod monitoring_routes;
pub mod service_routes;
