//! Health-check execution and monitoring lifecycle.
//!
//! The `executor` runs single probes, `monitor` owns the per-service check
//! loops and the in-memory result cache, `global` drives the registry-wide
//! re-sync and flush timers, and `detect` proposes check configurations for
//! newly registered services.

pub mod detect;
pub mod executor;
pub mod global;
pub mod monitor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::entities::health_check_config;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("unsupported check type: {0}")]
    UnsupportedCheckType(String),
    #[error("no health check configured for service {0}")]
    NoCheckConfig(i32),
}

/// Result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Unhealthy => "UNHEALTHY",
        }
    }
}

/// Status stored on the owning service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Error,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Stopped => "STOPPED",
            ServiceStatus::Error => "ERROR",
            ServiceStatus::Unknown => "UNKNOWN",
        }
    }
}

/// The type-specific part of a check configuration. Each variant carries
/// only the fields that apply to its probe type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Probe {
    Http {
        url: String,
        method: String,
        expected_status: Option<u16>,
        expected_body: Option<String>,
    },
    Tcp {
        target: String,
    },
    Command {
        command: String,
        expected_output: Option<String>,
    },
    Script {
        script: String,
        expected_output: Option<String>,
    },
}

impl Probe {
    pub fn kind(&self) -> &'static str {
        match self {
            Probe::Http { .. } => "HTTP",
            Probe::Tcp { .. } => "TCP",
            Probe::Command { .. } => "COMMAND",
            Probe::Script { .. } => "SCRIPT",
        }
    }

    /// The URL, address, command or script text this probe runs against.
    pub fn target(&self) -> &str {
        match self {
            Probe::Http { url, .. } => url,
            Probe::Tcp { target } => target,
            Probe::Command { command, .. } => command,
            Probe::Script { script, .. } => script,
        }
    }
}

/// One service's health probe configuration, as consumed by the executor
/// and the monitor loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub service_id: i32,
    pub probe: Probe,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    /// Stored for the UI; each tick is a single attempt.
    pub max_retries: u32,
    pub enabled: bool,
}

impl TryFrom<&health_check_config::Model> for CheckConfig {
    type Error = MonitorError;

    fn try_from(model: &health_check_config::Model) -> Result<Self, Self::Error> {
        let probe = match model.check_type.to_uppercase().as_str() {
            "HTTP" => Probe::Http {
                url: model.target.clone(),
                method: model
                    .http_method
                    .clone()
                    .unwrap_or_else(|| "GET".to_string()),
                expected_status: model.expected_status.map(|s| s as u16),
                expected_body: model.expected_response.clone(),
            },
            "TCP" => Probe::Tcp {
                target: model.target.clone(),
            },
            "COMMAND" => Probe::Command {
                command: model.target.clone(),
                expected_output: model.expected_response.clone(),
            },
            "SCRIPT" => Probe::Script {
                script: model.target.clone(),
                expected_output: model.expected_response.clone(),
            },
            other => return Err(MonitorError::UnsupportedCheckType(other.to_string())),
        };

        Ok(CheckConfig {
            service_id: model.service_id,
            probe,
            timeout_ms: model.timeout_ms.max(1) as u64,
            interval_ms: model.interval_ms.max(1) as u64,
            max_retries: model.max_retries.max(0) as u32,
            enabled: model.enabled,
        })
    }
}

/// Extra information captured alongside a probe outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_output: Option<String>,
}

/// Result of one probe execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub service_id: i32,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
    pub detail: Option<OutcomeDetail>,
}

impl CheckOutcome {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// The status the owning service record should carry after this outcome.
    pub fn service_status(&self) -> ServiceStatus {
        match self.status {
            HealthStatus::Healthy => ServiceStatus::Running,
            HealthStatus::Unhealthy => ServiceStatus::Error,
        }
    }

    /// Identifier used to avoid re-persisting an already-synced outcome.
    pub(crate) fn sync_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.service_id,
            self.checked_at.timestamp_millis(),
            self.status.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config_model(check_type: &str) -> health_check_config::Model {
        let now = Utc::now();
        health_check_config::Model {
            id: 1,
            service_id: 7,
            check_type: check_type.to_string(),
            target: "http://localhost:8080/health".to_string(),
            http_method: None,
            expected_status: Some(200),
            expected_response: None,
            timeout_ms: 5000,
            interval_ms: 60_000,
            max_retries: 3,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn http_model_converts_with_default_method() {
        let config = CheckConfig::try_from(&config_model("HTTP")).unwrap();
        assert_eq!(config.service_id, 7);
        match config.probe {
            Probe::Http {
                method,
                expected_status,
                ..
            } => {
                assert_eq!(method, "GET");
                assert_eq!(expected_status, Some(200));
            }
            other => panic!("expected HTTP probe, got {other:?}"),
        }
    }

    #[test]
    fn check_type_is_case_insensitive() {
        let config = CheckConfig::try_from(&config_model("tcp")).unwrap();
        assert_eq!(config.probe.kind(), "TCP");
    }

    #[test]
    fn unknown_check_type_is_rejected() {
        let err = CheckConfig::try_from(&config_model("PING")).unwrap_err();
        assert!(matches!(err, MonitorError::UnsupportedCheckType(_)));
    }

    #[test]
    fn sync_key_is_stable_per_outcome() {
        let outcome = CheckOutcome {
            service_id: 3,
            status: HealthStatus::Unhealthy,
            response_time_ms: 12,
            checked_at: Utc::now(),
            error: Some("connection refused".to_string()),
            detail: None,
        };
        assert_eq!(outcome.sync_key(), outcome.sync_key());
        assert!(outcome.sync_key().starts_with("3-"));
        assert!(outcome.sync_key().ends_with("-UNHEALTHY"));
    }
}
