//! Registry-wide monitoring lifecycle: the re-sync and flush timers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::services::{health_check_service, service_service};
use crate::server::status_broadcaster::StatusBroadcaster;

use super::monitor::ServiceHealthMonitor;
use super::CheckConfig;

const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Persisted results older than this are deleted during re-sync.
const RESULT_RETENTION_HOURS: i64 = 24;

struct GlobalTasks {
    resync: JoinHandle<()>,
    flush: JoinHandle<()>,
}

/// Running flag and timer handles, mutated together under one lock so a
/// stop arriving mid-start cannot observe the flag without the tasks.
#[derive(Default)]
struct GlobalState {
    running: bool,
    tasks: Option<GlobalTasks>,
}

/// Drives monitoring for the whole service registry.
///
/// While running, a re-sync task periodically reconciles the per-service
/// loops against the enabled configs in the database, and a flush task
/// periodically writes cached outcomes out.
pub struct GlobalHealthMonitor {
    db: DatabaseConnection,
    monitor: Arc<ServiceHealthMonitor>,
    broadcaster: Arc<StatusBroadcaster>,
    resync_interval: Duration,
    flush_interval: Duration,
    state: tokio::sync::Mutex<GlobalState>,
}

impl GlobalHealthMonitor {
    pub fn new(
        db: DatabaseConnection,
        monitor: Arc<ServiceHealthMonitor>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Arc<Self> {
        Self::with_intervals(
            db,
            monitor,
            broadcaster,
            DEFAULT_RESYNC_INTERVAL,
            DEFAULT_FLUSH_INTERVAL,
        )
    }

    pub fn with_intervals(
        db: DatabaseConnection,
        monitor: Arc<ServiceHealthMonitor>,
        broadcaster: Arc<StatusBroadcaster>,
        resync_interval: Duration,
        flush_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            monitor,
            broadcaster,
            resync_interval,
            flush_interval,
            state: tokio::sync::Mutex::new(GlobalState::default()),
        })
    }

    /// Starts the re-sync and flush timers. A second call while running is
    /// a no-op. The first re-sync runs immediately so loops exist before
    /// the first timer fires.
    ///
    /// The state lock is held for the whole call, initial re-sync included:
    /// a concurrent stop waits here and then cancels the freshly installed
    /// timers instead of returning while they come up.
    pub async fn start_global_monitoring(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.running {
            info!("global health monitoring already running");
            return;
        }

        info!(
            resync_secs = self.resync_interval.as_secs(),
            flush_secs = self.flush_interval.as_secs(),
            "starting global health monitoring"
        );

        self.run_resync().await;

        let resync_owner = Arc::downgrade(self);
        let resync_interval = self.resync_interval;
        let resync = tokio::spawn(async move {
            loop {
                tokio::time::sleep(resync_interval).await;
                let Some(global) = resync_owner.upgrade() else {
                    break;
                };
                global.run_resync().await;
            }
        });

        let flush_owner = Arc::downgrade(self);
        let flush_interval = self.flush_interval;
        let flush = tokio::spawn(async move {
            loop {
                tokio::time::sleep(flush_interval).await;
                let Some(global) = flush_owner.upgrade() else {
                    break;
                };
                global.run_flush().await;
            }
        });

        state.running = true;
        state.tasks = Some(GlobalTasks { resync, flush });
    }

    /// Stops both timers and every per-service loop. Safe to call when not
    /// running.
    pub async fn stop_global_monitoring(&self) {
        let tasks = {
            let mut state = self.state.lock().await;
            if !state.running {
                return;
            }
            state.running = false;
            state.tasks.take()
        };

        if let Some(tasks) = tasks {
            tasks.resync.abort();
            tasks.flush.abort();
            let _ = tasks.resync.await;
            let _ = tasks.flush.await;
        }

        self.monitor.stop_all_monitoring().await;
        info!("stopped global health monitoring");
    }

    pub async fn is_monitoring(&self) -> bool {
        self.state.lock().await.running
    }

    /// Runs one full re-sync pass on demand, outside the timer schedule.
    pub async fn trigger_health_check(&self) {
        info!("manually triggered health check cycle");
        self.run_resync().await;
    }

    /// One re-sync pass: prune old result rows, load enabled configs,
    /// reconcile the running loops against them, and probe each config
    /// once.
    async fn run_resync(&self) {
        let cutoff = Utc::now() - ChronoDuration::hours(RESULT_RETENTION_HOURS);
        match health_check_service::delete_results_older_than(&self.db, cutoff).await {
            Ok(0) => {}
            Ok(deleted) => debug!(deleted, "pruned expired health check results"),
            Err(e) => warn!(error = %e, "failed to prune expired health check results"),
        }

        let models = match health_check_service::list_enabled_check_configs(&self.db).await {
            Ok(models) => models,
            Err(e) => {
                error!(error = %e, "failed to load health check configs, skipping re-sync");
                return;
            }
        };

        let mut configs: Vec<CheckConfig> = Vec::with_capacity(models.len());
        for model in &models {
            match CheckConfig::try_from(model) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(
                    service_id = model.service_id,
                    error = %e,
                    "skipping malformed health check config"
                ),
            }
        }

        // Loops for services that no longer have an enabled config are
        // stopped before new checks run.
        let desired: std::collections::HashSet<i32> =
            configs.iter().map(|c| c.service_id).collect();
        for service_id in self.monitor.monitored_service_ids().await {
            if !desired.contains(&service_id) {
                self.monitor.stop_monitoring(service_id).await;
            }
        }

        debug!(services = configs.len(), "re-syncing health monitors");
        let checks = configs
            .into_iter()
            .map(|config| self.check_config(config))
            .collect::<Vec<_>>();
        futures::future::join_all(checks).await;
    }

    /// Ensures the service's loop matches `config`, then runs one check and
    /// persists its consequences.
    async fn check_config(&self, config: CheckConfig) {
        let service_id = config.service_id;

        if self.monitor.active_config(service_id).await.as_ref() != Some(&config) {
            self.monitor.start_monitoring(config.clone()).await;
        }

        let outcome = self.monitor.perform_health_check(&config).await;

        if !outcome.is_healthy() {
            if let Err(e) = health_check_service::insert_result(&self.db, &outcome).await {
                error!(service_id, error = %e, "failed to persist health check result");
            }
        }

        match service_service::update_service_status(
            &self.db,
            service_id,
            outcome.service_status(),
            outcome.checked_at,
        )
        .await
        {
            Ok(true) => {
                self.broadcaster
                    .publish_status_change(service_id, outcome.service_status());
            }
            Ok(false) => {}
            Err(e) => {
                warn!(service_id, error = %e, "failed to update service status");
            }
        }
    }

    async fn run_flush(&self) {
        self.monitor.sync_results_to_db(&self.db).await;
        self.monitor.compact_results();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::prelude::*;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, PaginatorTrait, Set};

    async fn memory_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        crate::db::init_schema(&db).await.unwrap();
        db
    }

    async fn seed_service(db: &DatabaseConnection, id: i32, name: &str) {
        let now = Utc::now();
        ServiceActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            service_type: Set("CUSTOM".to_string()),
            url: Set(None),
            status: Set("UNKNOWN".to_string()),
            last_checked: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
    }

    async fn seed_tcp_config(db: &DatabaseConnection, service_id: i32, target: &str, enabled: bool) {
        let now = Utc::now();
        HealthCheckConfigActiveModel {
            service_id: Set(service_id),
            check_type: Set("TCP".to_string()),
            target: Set(target.to_string()),
            http_method: Set(None),
            expected_status: Set(None),
            expected_response: Set(None),
            timeout_ms: Set(500),
            interval_ms: Set(60_000),
            max_retries: Set(3),
            enabled: Set(enabled),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    async fn seed_command_config(db: &DatabaseConnection, service_id: i32, command: &str) {
        let now = Utc::now();
        HealthCheckConfigActiveModel {
            service_id: Set(service_id),
            check_type: Set("COMMAND".to_string()),
            target: Set(command.to_string()),
            http_method: Set(None),
            expected_status: Set(None),
            expected_response: Set(None),
            timeout_ms: Set(5000),
            interval_ms: Set(60_000),
            max_retries: Set(3),
            enabled: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn build(db: DatabaseConnection) -> Arc<GlobalHealthMonitor> {
        GlobalHealthMonitor::with_intervals(
            db,
            ServiceHealthMonitor::new(),
            StatusBroadcaster::new(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        )
    }

    /// Binds then drops a listener so the port is very likely closed.
    async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn resync_probes_configs_and_records_failures() {
        let db = memory_db().await;
        seed_service(&db, 1, "dead-tcp").await;
        seed_tcp_config(&db, 1, &closed_port().await, true).await;

        let global = build(db.clone());
        global.start_global_monitoring().await;

        let service = Service::find_by_id(1).one(&db).await.unwrap().unwrap();
        assert_eq!(service.status, "ERROR");
        assert!(service.last_checked.is_some());
        assert_eq!(HealthCheckResult::find().count(&db).await.unwrap(), 1);
        assert_eq!(global.monitor.monitored_service_ids().await, vec![1]);

        global.stop_global_monitoring().await;
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let db = memory_db().await;
        let global = build(db);

        global.start_global_monitoring().await;
        global.start_global_monitoring().await;
        assert!(global.is_monitoring().await);

        global.stop_global_monitoring().await;
        global.stop_global_monitoring().await;
        assert!(!global.is_monitoring().await);
    }

    #[tokio::test]
    async fn stop_also_stops_per_service_loops() {
        let db = memory_db().await;
        seed_service(&db, 1, "dead-tcp").await;
        seed_tcp_config(&db, 1, &closed_port().await, true).await;

        let global = build(db);
        global.start_global_monitoring().await;
        assert_eq!(global.monitor.monitored_service_ids().await, vec![1]);

        global.stop_global_monitoring().await;
        assert!(global.monitor.monitored_service_ids().await.is_empty());
    }

    #[tokio::test]
    async fn resync_stops_loops_for_disabled_configs() {
        use sea_orm::{ColumnTrait, QueryFilter};

        let db = memory_db().await;
        seed_service(&db, 1, "flaky").await;
        seed_tcp_config(&db, 1, &closed_port().await, true).await;

        let global = build(db.clone());
        global.start_global_monitoring().await;
        assert_eq!(global.monitor.monitored_service_ids().await, vec![1]);

        let model = HealthCheckConfig::find()
            .filter(HealthCheckConfigColumn::ServiceId.eq(1))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let mut active: HealthCheckConfigActiveModel = model.into();
        active.enabled = Set(false);
        active.update(&db).await.unwrap();

        global.trigger_health_check().await;
        assert!(global.monitor.monitored_service_ids().await.is_empty());

        global.stop_global_monitoring().await;
    }

    #[tokio::test]
    async fn stop_during_initial_resync_cancels_the_timers() {
        let db = memory_db().await;
        seed_service(&db, 1, "slow-daemon").await;
        seed_command_config(&db, 1, "sleep 1 && echo up").await;

        let global = GlobalHealthMonitor::with_intervals(
            db.clone(),
            ServiceHealthMonitor::new(),
            StatusBroadcaster::new(),
            Duration::from_millis(200),
            Duration::from_secs(3600),
        );

        let starter = {
            let global = global.clone();
            tokio::spawn(async move { global.start_global_monitoring().await })
        };
        // Stop while the initial re-sync is still probing the slow command.
        tokio::time::sleep(Duration::from_millis(300)).await;
        global.stop_global_monitoring().await;
        starter.await.unwrap();

        assert!(!global.is_monitoring().await);
        assert!(global.monitor.monitored_service_ids().await.is_empty());

        // Only re-sync passes touch last_checked; if a timer survived the
        // stop it would advance within a few intervals.
        let service = Service::find_by_id(1).one(&db).await.unwrap().unwrap();
        let before = service.last_checked;
        tokio::time::sleep(Duration::from_millis(700)).await;
        let service = Service::find_by_id(1).one(&db).await.unwrap().unwrap();
        assert_eq!(service.last_checked, before);
    }

    #[tokio::test]
    async fn resync_prunes_results_past_retention() {
        let db = memory_db().await;
        seed_service(&db, 1, "old").await;

        let stale = HealthCheckResultActiveModel {
            service_id: Set(1),
            status: Set("UNHEALTHY".to_string()),
            response_time_ms: Set(12),
            checked_at: Set(Utc::now() - ChronoDuration::hours(RESULT_RETENTION_HOURS + 1)),
            error_message: Set(Some("timeout".to_string())),
            details: Set(None),
            ..Default::default()
        };
        sea_orm::ActiveModelTrait::insert(stale, &db).await.unwrap();
        assert_eq!(HealthCheckResult::find().count(&db).await.unwrap(), 1);

        let global = build(db.clone());
        global.trigger_health_check().await;

        assert_eq!(HealthCheckResult::find().count(&db).await.unwrap(), 0);
    }
}
