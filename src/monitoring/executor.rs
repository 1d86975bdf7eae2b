//! Runs a single health probe against its target.
//!
//! Every failure path is folded into an `UNHEALTHY` outcome; callers never
//! need error handling around a probe.

use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use super::{CheckConfig, CheckOutcome, HealthStatus, OutcomeDetail, Probe};

/// Response bodies and command output are truncated to this many characters
/// before being stored.
const DETAIL_MAX_CHARS: usize = 500;

#[derive(Clone)]
pub struct ProbeExecutor {
    client: Client,
}

impl Default for ProbeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeExecutor {
    pub fn new() -> Self {
        // Deadlines come from each config, so the shared client carries no
        // default timeout.
        Self {
            client: Client::new(),
        }
    }

    /// Executes one probe, bounded by the config's timeout. Never fails;
    /// timeouts, I/O errors and configuration errors all become an
    /// `UNHEALTHY` outcome with an error message.
    pub async fn execute(&self, config: &CheckConfig) -> CheckOutcome {
        let started = Instant::now();
        let deadline = Duration::from_millis(config.timeout_ms);

        let (status, error, detail) = match &config.probe {
            Probe::Http {
                url,
                method,
                expected_status,
                expected_body,
            } => {
                self.http_probe(url, method, *expected_status, expected_body.as_deref(), deadline)
                    .await
            }
            Probe::Tcp { target } => tcp_probe(target, deadline).await,
            Probe::Command {
                command,
                expected_output,
            } => shell_probe(command, expected_output.as_deref(), deadline, false).await,
            Probe::Script {
                script,
                expected_output,
            } => shell_probe(script, expected_output.as_deref(), deadline, true).await,
        };

        CheckOutcome {
            service_id: config.service_id,
            status,
            response_time_ms: started.elapsed().as_millis() as u64,
            checked_at: Utc::now(),
            error,
            detail,
        }
    }

    async fn http_probe(
        &self,
        url: &str,
        method: &str,
        expected_status: Option<u16>,
        expected_body: Option<&str>,
        deadline: Duration,
    ) -> (HealthStatus, Option<String>, Option<OutcomeDetail>) {
        if url.trim().is_empty() {
            return (
                HealthStatus::Unhealthy,
                Some("HTTP check has no target URL configured".to_string()),
                None,
            );
        }

        let method =
            reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::GET);

        match self
            .client
            .request(method, url)
            .timeout(deadline)
            .send()
            .await
        {
            Ok(response) => {
                let code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let detail = OutcomeDetail {
                    status_code: Some(code),
                    response_body: Some(truncate(&body)),
                    command_output: None,
                };

                let status_ok = expected_status.map_or(true, |want| want == code);
                let body_ok = expected_body.map_or(true, |want| body.contains(want));

                if status_ok && body_ok {
                    (HealthStatus::Healthy, None, Some(detail))
                } else if !status_ok {
                    (
                        HealthStatus::Unhealthy,
                        Some(format!(
                            "unexpected status code {code} (expected {})",
                            expected_status.unwrap_or_default()
                        )),
                        Some(detail),
                    )
                } else {
                    (
                        HealthStatus::Unhealthy,
                        Some("response body did not contain the expected text".to_string()),
                        Some(detail),
                    )
                }
            }
            Err(e) if e.is_timeout() => (
                HealthStatus::Unhealthy,
                Some(format!(
                    "HTTP request timed out after {}ms",
                    deadline.as_millis()
                )),
                None,
            ),
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("HTTP request failed: {e}")),
                None,
            ),
        }
    }
}

async fn tcp_probe(
    target: &str,
    deadline: Duration,
) -> (HealthStatus, Option<String>, Option<OutcomeDetail>) {
    let addr = match tcp_target_addr(target) {
        Ok(addr) => addr,
        Err(message) => return (HealthStatus::Unhealthy, Some(message), None),
    };

    match timeout(deadline, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => (HealthStatus::Healthy, None, None),
        Ok(Err(e)) => (
            HealthStatus::Unhealthy,
            Some(format!("TCP connect to {addr} failed: {e}")),
            None,
        ),
        Err(_) => (
            HealthStatus::Unhealthy,
            Some(format!(
                "TCP connect to {addr} timed out after {}ms",
                deadline.as_millis()
            )),
            None,
        ),
    }
}

/// Resolves a TCP target into a `host:port` address. Accepts either a bare
/// `host:port` or a URL, deriving the port from the scheme when omitted.
fn tcp_target_addr(target: &str) -> Result<String, String> {
    let target = target.trim();
    if target.is_empty() {
        return Err("TCP check has no target configured".to_string());
    }

    if target.contains("://") {
        let url = reqwest::Url::parse(target)
            .map_err(|e| format!("invalid TCP target {target}: {e}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| format!("TCP target {target} has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| format!("TCP target {target} has no port"))?;
        Ok(format!("{host}:{port}"))
    } else {
        Ok(target.to_string())
    }
}

async fn shell_probe(
    payload: &str,
    expected_output: Option<&str>,
    deadline: Duration,
    fail_fast: bool,
) -> (HealthStatus, Option<String>, Option<OutcomeDetail>) {
    if payload.trim().is_empty() {
        return (
            HealthStatus::Unhealthy,
            Some("command check has no command configured".to_string()),
            None,
        );
    }

    let mut command = Command::new("sh");
    if fail_fast {
        // Scripts abort on the first failing line instead of silently
        // continuing.
        command.arg("-e");
    }
    command
        .arg("-c")
        .arg(payload)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout(deadline, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return (
                HealthStatus::Unhealthy,
                Some(format!("failed to run command: {e}")),
                None,
            );
        }
        Err(_) => {
            // The dropped future kills the child via kill_on_drop.
            return (
                HealthStatus::Unhealthy,
                Some(format!("command timed out after {}ms", deadline.as_millis())),
                None,
            );
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let mut combined = stdout.clone();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    let detail = OutcomeDetail {
        command_output: Some(truncate(&combined)),
        ..Default::default()
    };

    if !output.status.success() {
        return (
            HealthStatus::Unhealthy,
            Some(format!("command exited with {}", output.status)),
            Some(detail),
        );
    }

    let healthy = match expected_output {
        Some(want) => stdout.contains(want),
        None => !stdout.is_empty() && stderr.is_empty(),
    };

    if healthy {
        (HealthStatus::Healthy, None, Some(detail))
    } else {
        let message = match expected_output {
            Some(want) => format!("command output did not contain \"{want}\""),
            None => "command produced no stdout or wrote to stderr".to_string(),
        };
        (HealthStatus::Unhealthy, Some(message), Some(detail))
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(DETAIL_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    async fn spawn_http_server(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn http_config(url: String, expected_status: Option<u16>) -> CheckConfig {
        CheckConfig {
            service_id: 1,
            probe: Probe::Http {
                url,
                method: "GET".to_string(),
                expected_status,
                expected_body: None,
            },
            timeout_ms: 2000,
            interval_ms: 60_000,
            max_retries: 3,
            enabled: true,
        }
    }

    fn command_config(command: &str, expected_output: Option<&str>) -> CheckConfig {
        CheckConfig {
            service_id: 1,
            probe: Probe::Command {
                command: command.to_string(),
                expected_output: expected_output.map(str::to_string),
            },
            timeout_ms: 2000,
            interval_ms: 60_000,
            max_retries: 3,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn http_probe_succeeds_on_matching_status() {
        let addr = spawn_http_server(Router::new().route("/", get(|| async { "ok" }))).await;
        let executor = ProbeExecutor::new();

        let outcome = executor
            .execute(&http_config(format!("http://{addr}/"), Some(200)))
            .await;

        assert_eq!(outcome.status, HealthStatus::Healthy);
        let detail = outcome.detail.unwrap();
        assert_eq!(detail.status_code, Some(200));
        assert_eq!(detail.response_body.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn http_probe_without_expectations_accepts_any_completed_response() {
        let addr = spawn_http_server(Router::new().route(
            "/",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let executor = ProbeExecutor::new();

        // No expected status configured: a completed 5xx still counts as up.
        let outcome = executor
            .execute(&http_config(format!("http://{addr}/"), None))
            .await;
        assert_eq!(outcome.status, HealthStatus::Healthy);

        // With an expectation the same response is a failure.
        let outcome = executor
            .execute(&http_config(format!("http://{addr}/"), Some(200)))
            .await;
        assert_eq!(outcome.status, HealthStatus::Unhealthy);
        assert!(outcome.error.unwrap().contains("unexpected status code 500"));
    }

    #[tokio::test]
    async fn http_probe_checks_expected_body() {
        let addr =
            spawn_http_server(Router::new().route("/", get(|| async { "all systems go" }))).await;
        let executor = ProbeExecutor::new();

        let mut config = http_config(format!("http://{addr}/"), None);
        if let Probe::Http { expected_body, .. } = &mut config.probe {
            *expected_body = Some("systems".to_string());
        }
        assert!(executor.execute(&config).await.is_healthy());

        if let Probe::Http { expected_body, .. } = &mut config.probe {
            *expected_body = Some("on fire".to_string());
        }
        let outcome = executor.execute(&config).await;
        assert_eq!(outcome.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn http_probe_missing_url_is_a_config_error_outcome() {
        let executor = ProbeExecutor::new();
        let outcome = executor.execute(&http_config(String::new(), None)).await;

        assert_eq!(outcome.status, HealthStatus::Unhealthy);
        assert!(outcome.error.unwrap().contains("no target URL"));
    }

    #[tokio::test]
    async fn tcp_probe_reports_open_and_closed_ports() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let open = CheckConfig {
            service_id: 1,
            probe: Probe::Tcp {
                target: addr.to_string(),
            },
            timeout_ms: 1000,
            interval_ms: 60_000,
            max_retries: 0,
            enabled: true,
        };
        let executor = ProbeExecutor::new();
        assert!(executor.execute(&open).await.is_healthy());

        drop(listener);
        let outcome = executor.execute(&open).await;
        assert_eq!(outcome.status, HealthStatus::Unhealthy);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn tcp_probe_derives_port_from_url_target() {
        assert_eq!(
            tcp_target_addr("http://example.com/health").unwrap(),
            "example.com:80"
        );
        assert_eq!(
            tcp_target_addr("https://example.com:8443/").unwrap(),
            "example.com:8443"
        );
        assert_eq!(tcp_target_addr("127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert!(tcp_target_addr("").is_err());
    }

    #[tokio::test]
    async fn command_probe_succeeds_on_stdout() {
        let executor = ProbeExecutor::new();
        let outcome = executor.execute(&command_config("echo hello", None)).await;

        assert!(outcome.is_healthy());
        let detail = outcome.detail.unwrap();
        assert_eq!(detail.command_output.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn command_probe_matches_expected_output() {
        let executor = ProbeExecutor::new();
        assert!(executor
            .execute(&command_config("echo active", Some("active")))
            .await
            .is_healthy());

        let outcome = executor
            .execute(&command_config("echo inactive", Some("running")))
            .await;
        assert_eq!(outcome.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn command_probe_fails_on_nonzero_exit() {
        let executor = ProbeExecutor::new();
        let outcome = executor.execute(&command_config("exit 3", None)).await;

        assert_eq!(outcome.status, HealthStatus::Unhealthy);
        assert!(outcome.error.unwrap().contains("exited"));
    }

    #[tokio::test]
    async fn command_probe_times_out_and_kills_the_child() {
        let executor = ProbeExecutor::new();
        let mut config = command_config("sleep 30", None);
        config.timeout_ms = 200;

        let started = std::time::Instant::now();
        let outcome = executor.execute(&config).await;

        assert_eq!(outcome.status, HealthStatus::Unhealthy);
        assert!(outcome.error.unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn script_probe_aborts_on_first_failing_line() {
        let executor = ProbeExecutor::new();
        let config = CheckConfig {
            service_id: 1,
            probe: Probe::Script {
                script: "false\necho should-not-run".to_string(),
                expected_output: None,
            },
            timeout_ms: 2000,
            interval_ms: 60_000,
            max_retries: 0,
            enabled: true,
        };

        let outcome = executor.execute(&config).await;
        assert_eq!(outcome.status, HealthStatus::Unhealthy);
        let detail = outcome.detail.unwrap();
        assert!(!detail
            .command_output
            .unwrap()
            .contains("should-not-run"));
    }

    #[test]
    fn truncate_bounds_detail_length() {
        let long = "x".repeat(2000);
        assert_eq!(truncate(&long).len(), DETAIL_MAX_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}
