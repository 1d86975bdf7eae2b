//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::db::entities::prelude::*;
use crate::monitoring::CheckOutcome;

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub service_type: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A service together with its check config and the freshest known outcome.
#[derive(Debug, Serialize)]
pub struct ServiceDetails {
    #[serde(flatten)]
    pub service: ServiceModel,
    pub check_config: Option<HealthCheckConfigModel>,
    pub last_result: Option<CheckOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub service_id: Option<i32>,
    pub name: String,
    pub service_type: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MonitoringStatus {
    pub running: bool,
    pub monitored_service_ids: Vec<i32>,
}
