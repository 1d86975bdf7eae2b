//! Per-service monitoring loops and the in-memory result cache.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::services::{health_check_service, service_service};

use super::executor::ProbeExecutor;
use super::{CheckConfig, CheckOutcome};

/// Upper bound on remembered sync keys. When reached, the oldest half is
/// evicted.
const SYNCED_KEYS_CAP: usize = 1000;

struct MonitorHandle {
    config: CheckConfig,
    task: JoinHandle<()>,
}

/// Insertion-ordered set of sync keys for outcomes already written to the
/// database.
struct SyncedKeys {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl SyncedKeys {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    fn insert(&mut self, key: String) {
        if !self.seen.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        if self.order.len() >= SYNCED_KEYS_CAP {
            for _ in 0..SYNCED_KEYS_CAP / 2 {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Owns one background check loop per monitored service plus the cache of
/// each service's latest outcome.
pub struct ServiceHealthMonitor {
    executor: ProbeExecutor,
    results: Mutex<HashMap<i32, CheckOutcome>>,
    monitors: tokio::sync::Mutex<HashMap<i32, MonitorHandle>>,
    synced: Mutex<SyncedKeys>,
}

impl ServiceHealthMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            executor: ProbeExecutor::new(),
            results: Mutex::new(HashMap::new()),
            monitors: tokio::sync::Mutex::new(HashMap::new()),
            synced: Mutex::new(SyncedKeys::new()),
        })
    }

    /// Runs one probe immediately and caches the outcome.
    pub async fn perform_health_check(&self, config: &CheckConfig) -> CheckOutcome {
        let outcome = self.executor.execute(config).await;
        self.store_result(outcome.clone());
        outcome
    }

    /// Starts (or restarts) the periodic check loop for a service. An
    /// existing loop for the same service is stopped first, so at most one
    /// loop per service ever runs. Disabled configs only stop any running
    /// loop.
    pub async fn start_monitoring(self: &Arc<Self>, config: CheckConfig) {
        if !config.enabled {
            self.stop_monitoring(config.service_id).await;
            return;
        }

        let service_id = config.service_id;
        let mut monitors = self.monitors.lock().await;

        if let Some(existing) = monitors.remove(&service_id) {
            existing.task.abort();
            let _ = existing.task.await;
            debug!(service_id, "replaced existing monitor loop");
        }

        info!(
            service_id,
            check_type = config.probe.kind(),
            interval_ms = config.interval_ms,
            "starting health monitor"
        );

        let weak = Arc::downgrade(self);
        let loop_config = config.clone();
        let task = tokio::spawn(async move {
            loop {
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                let outcome = monitor.executor.execute(&loop_config).await;
                debug!(
                    service_id = loop_config.service_id,
                    status = outcome.status.as_str(),
                    response_time_ms = outcome.response_time_ms,
                    "health check completed"
                );
                monitor.store_result(outcome);
                drop(monitor);
                tokio::time::sleep(Duration::from_millis(loop_config.interval_ms)).await;
            }
        });

        monitors.insert(service_id, MonitorHandle { config, task });
    }

    /// Stops the check loop for a service, waiting for the task to finish
    /// so no further tick runs after this returns.
    pub async fn stop_monitoring(&self, service_id: i32) {
        let handle = self.monitors.lock().await.remove(&service_id);
        if let Some(handle) = handle {
            handle.task.abort();
            let _ = handle.task.await;
            info!(service_id, "stopped health monitor");
        }
    }

    pub async fn stop_all_monitoring(&self) {
        let handles: Vec<MonitorHandle> = {
            let mut monitors = self.monitors.lock().await;
            monitors.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        for handle in handles {
            handle.task.abort();
            let _ = handle.task.await;
        }
        if count > 0 {
            info!(count, "stopped all health monitors");
        }
    }

    /// Ids of services with an active check loop.
    pub async fn monitored_service_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.monitors.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The config currently driving a service's loop, if one is running.
    pub async fn active_config(&self, service_id: i32) -> Option<CheckConfig> {
        self.monitors
            .lock()
            .await
            .get(&service_id)
            .map(|handle| handle.config.clone())
    }

    pub fn latest_result(&self, service_id: i32) -> Option<CheckOutcome> {
        self.results.lock().unwrap().get(&service_id).cloned()
    }

    pub fn all_results(&self) -> Vec<CheckOutcome> {
        let mut results: Vec<CheckOutcome> =
            self.results.lock().unwrap().values().cloned().collect();
        results.sort_unstable_by_key(|outcome| outcome.service_id);
        results
    }

    fn store_result(&self, outcome: CheckOutcome) {
        self.results
            .lock()
            .unwrap()
            .insert(outcome.service_id, outcome);
    }

    /// Writes cached outcomes to the database. Only unhealthy outcomes get a
    /// result row; every outcome updates the owning service's status. Each
    /// persisted outcome is remembered so a later flush does not write it
    /// again. Returns the number of newly persisted result rows.
    pub async fn sync_results_to_db(&self, db: &DatabaseConnection) -> usize {
        let outcomes = self.all_results();
        let mut persisted = 0;

        for outcome in outcomes {
            let key = outcome.sync_key();
            if self.synced.lock().unwrap().contains(&key) {
                continue;
            }

            if !outcome.is_healthy() {
                if let Err(e) = health_check_service::insert_result(db, &outcome).await {
                    // Left out of the synced set so the next flush retries it.
                    error!(
                        service_id = outcome.service_id,
                        error = %e,
                        "failed to persist health check result"
                    );
                    continue;
                }
                persisted += 1;
            }

            if let Err(e) = service_service::update_service_status(
                db,
                outcome.service_id,
                outcome.service_status(),
                outcome.checked_at,
            )
            .await
            {
                warn!(
                    service_id = outcome.service_id,
                    error = %e,
                    "failed to update service status during flush"
                );
            }

            self.synced.lock().unwrap().insert(key);
        }

        if persisted > 0 {
            info!(persisted, "flushed health check results to database");
        }
        persisted
    }

    /// The cache keeps only the latest outcome per service, so compaction
    /// just reports its size.
    pub fn compact_results(&self) {
        let cached = self.results.lock().unwrap().len();
        let synced = self.synced.lock().unwrap().len();
        debug!(cached, synced, "compacted in-memory health results");
    }
}
