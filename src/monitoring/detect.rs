//! Proposes a health check configuration for a newly registered service
//! based on its type and name.

use std::time::Duration;

use tracing::{debug, info};

use super::{CheckConfig, Probe};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const COMMAND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_RETRIES: u32 = 3;

/// How long the HTTP probe used to validate a detected URL may take.
const DETECT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Broad category of a registered service, parsed from its stored type
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Http,
    Grpc,
    Systemd,
    Supervisord,
    Docker,
    Database,
    Cache,
    Custom,
}

impl ServiceKind {
    pub fn parse(service_type: &str) -> Self {
        match service_type.to_uppercase().as_str() {
            "HTTP" | "HTTPS" | "WEB" | "API" => ServiceKind::Http,
            "GRPC" => ServiceKind::Grpc,
            "SYSTEMD" => ServiceKind::Systemd,
            "SUPERVISORD" | "SUPERVISOR" => ServiceKind::Supervisord,
            "DOCKER" | "CONTAINER" => ServiceKind::Docker,
            "DATABASE" | "DB" => ServiceKind::Database,
            "CACHE" => ServiceKind::Cache,
            _ => ServiceKind::Custom,
        }
    }
}

/// Builds a check config proposal for a service. Command-style proposals
/// are matched against a lexicon of well-known daemons by name; HTTP
/// proposals are validated with a single probe and come back disabled when
/// the target is missing or unreachable.
pub async fn auto_detect_health_check(
    service_id: i32,
    name: &str,
    kind: ServiceKind,
    url: Option<&str>,
) -> CheckConfig {
    let probe = match kind {
        ServiceKind::Http => return detect_http(service_id, url).await,
        ServiceKind::Grpc => grpc_probe(url),
        ServiceKind::Systemd => command(format!("systemctl is-active {name}"), "active"),
        ServiceKind::Supervisord => command(format!("supervisorctl status {name}"), "RUNNING"),
        ServiceKind::Docker => command(
            format!("docker ps --filter name={name} --format '{{{{.Status}}}}'"),
            "Up",
        ),
        ServiceKind::Database => database_probe(name),
        ServiceKind::Cache => cache_probe(name),
        ServiceKind::Custom => custom_probe(name).await,
    };

    debug!(service_id, ?kind, command = probe.target(), "detected command health check");
    CheckConfig {
        service_id,
        probe,
        timeout_ms: COMMAND_TIMEOUT_MS,
        interval_ms: DEFAULT_INTERVAL_MS,
        max_retries: DEFAULT_RETRIES,
        enabled: true,
    }
}

/// Probes the service URL once. A reachable endpoint yields an enabled
/// config whose expected status is pinned to what the endpoint actually
/// returned (200 for any 2xx); an unreachable or missing URL yields a
/// disabled config the operator can fix up.
async fn detect_http(service_id: i32, url: Option<&str>) -> CheckConfig {
    let http = |url: String, expected_status: Option<u16>| Probe::Http {
        url,
        method: "GET".to_string(),
        expected_status,
        expected_body: None,
    };

    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        debug!(service_id, "HTTP service has no URL, proposing disabled check");
        return CheckConfig {
            service_id,
            probe: http(String::new(), Some(200)),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
            max_retries: DEFAULT_RETRIES,
            enabled: false,
        };
    };

    let client = reqwest::Client::new();
    let (expected_status, enabled) = match client
        .get(url)
        .timeout(DETECT_PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => {
            let code = response.status().as_u16();
            let expected = if response.status().is_success() { 200 } else { code };
            info!(service_id, url, status = code, "validated HTTP health check target");
            (expected, true)
        }
        Err(e) => {
            info!(
                service_id,
                url,
                error = %e,
                "HTTP health check target unreachable, proposing disabled check"
            );
            (200, false)
        }
    };

    CheckConfig {
        service_id,
        probe: http(url.to_string(), Some(expected_status)),
        timeout_ms: DEFAULT_TIMEOUT_MS,
        interval_ms: DEFAULT_INTERVAL_MS,
        max_retries: DEFAULT_RETRIES,
        enabled,
    }
}

fn command(command: String, expected_output: &str) -> Probe {
    Probe::Command {
        command,
        expected_output: Some(expected_output.to_string()),
    }
}

fn grpc_probe(url: Option<&str>) -> Probe {
    let target = url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or("localhost:50051");
    command(
        format!("grpcurl -plaintext {target} grpc.health.v1.Health/Check"),
        "SERVING",
    )
}

fn database_probe(name: &str) -> Probe {
    let name = name.to_lowercase();
    if name.contains("mysql") || name.contains("mariadb") {
        command("mysqladmin ping -h localhost".to_string(), "alive")
    } else if name.contains("postgres") {
        command("pg_isready -h localhost".to_string(), "accepting connections")
    } else if name.contains("redis") {
        command("redis-cli ping".to_string(), "PONG")
    } else if name.contains("mongo") {
        command(
            "mongosh --quiet --eval 'db.runCommand({ping: 1}).ok'".to_string(),
            "1",
        )
    } else if name.contains("elastic") {
        command(
            "curl -s http://localhost:9200/_cluster/health".to_string(),
            "status",
        )
    } else {
        process_liveness(&name)
    }
}

fn cache_probe(name: &str) -> Probe {
    let name = name.to_lowercase();
    if name.contains("redis") {
        command("redis-cli ping".to_string(), "PONG")
    } else if name.contains("memcache") {
        command("echo stats | nc -w 2 localhost 11211".to_string(), "STAT")
    } else if name.contains("hazelcast") {
        command(
            "curl -s http://localhost:5701/hazelcast/health".to_string(),
            "\"clusterState\"",
        )
    } else {
        process_liveness(&name)
    }
}

/// Falls back to checking that a process with the service's name exists.
fn process_liveness(name: &str) -> Probe {
    Probe::Command {
        command: format!("pgrep -f {name}"),
        expected_output: None,
    }
}

/// For unclassified services, prefer process liveness when a matching
/// process is visible right now, otherwise assume a systemd unit.
async fn custom_probe(name: &str) -> Probe {
    let probe = process_liveness(name);
    let check = CheckConfig {
        service_id: 0,
        probe: probe.clone(),
        timeout_ms: COMMAND_TIMEOUT_MS,
        interval_ms: DEFAULT_INTERVAL_MS,
        max_retries: 0,
        enabled: true,
    };
    let outcome = super::executor::ProbeExecutor::new().execute(&check).await;
    if outcome.is_healthy() {
        probe
    } else {
        command(format!("systemctl is-active {name}"), "active")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    #[test]
    fn service_kind_parsing_is_case_insensitive() {
        assert_eq!(ServiceKind::parse("http"), ServiceKind::Http);
        assert_eq!(ServiceKind::parse("Systemd"), ServiceKind::Systemd);
        assert_eq!(ServiceKind::parse("SUPERVISOR"), ServiceKind::Supervisord);
        assert_eq!(ServiceKind::parse("whatever"), ServiceKind::Custom);
    }

    #[tokio::test]
    async fn mysql_database_gets_mysqladmin_ping() {
        let config =
            auto_detect_health_check(1, "mysql-primary", ServiceKind::Database, None).await;
        assert!(config.enabled);
        match config.probe {
            Probe::Command { command, expected_output } => {
                assert!(command.starts_with("mysqladmin ping"));
                assert_eq!(expected_output.as_deref(), Some("alive"));
            }
            other => panic!("expected command probe, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_database_falls_back_to_process_liveness() {
        let config = auto_detect_health_check(1, "unknownthing", ServiceKind::Database, None).await;
        assert_eq!(config.probe.target(), "pgrep -f unknownthing");
        assert_eq!(config.probe.kind(), "COMMAND");
    }

    #[tokio::test]
    async fn systemd_service_checks_unit_state() {
        let config = auto_detect_health_check(4, "nginx", ServiceKind::Systemd, None).await;
        match config.probe {
            Probe::Command { command, expected_output } => {
                assert_eq!(command, "systemctl is-active nginx");
                assert_eq!(expected_output.as_deref(), Some("active"));
            }
            other => panic!("expected command probe, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_service_without_url_is_proposed_disabled() {
        let config = auto_detect_health_check(2, "frontend", ServiceKind::Http, None).await;
        assert!(!config.enabled);
        match config.probe {
            Probe::Http { url, expected_status, .. } => {
                assert!(url.is_empty());
                assert_eq!(expected_status, Some(200));
            }
            other => panic!("expected HTTP probe, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reachable_http_url_is_validated_and_enabled() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let router = Router::new().route("/", get(|| async { "ok" }));
            axum::serve(listener, router).await.unwrap();
        });

        let url = format!("http://{addr}/");
        let config = auto_detect_health_check(3, "api", ServiceKind::Http, Some(&url)).await;
        assert!(config.enabled);
        match config.probe {
            Probe::Http { expected_status, .. } => assert_eq!(expected_status, Some(200)),
            other => panic!("expected HTTP probe, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_http_url_is_proposed_disabled() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/");
        let config = auto_detect_health_check(3, "api", ServiceKind::Http, Some(&url)).await;
        assert!(!config.enabled);
    }

    #[tokio::test]
    async fn grpc_service_uses_health_protocol() {
        let config =
            auto_detect_health_check(5, "billing", ServiceKind::Grpc, Some("localhost:7001")).await;
        match config.probe {
            Probe::Command { command, expected_output } => {
                assert!(command.contains("grpcurl"));
                assert!(command.contains("localhost:7001"));
                assert_eq!(expected_output.as_deref(), Some("SERVING"));
            }
            other => panic!("expected command probe, got {other:?}"),
        }
    }
}
