//! Periodic poll-and-diff reconciliation
//!
//! Each pass re-queries every directory entry and writes the result when
//! it differs from the stored snapshot. Devices are queried concurrently;
//! one device failing never stops the others.

use avr_core::DeviceId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::query::query_status;
use crate::status::{StatusStore, WriteOutcome};

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Delay after a successful pass
    pub interval: Duration,
    /// Delay after a failed pass
    pub backoff: Duration,
    /// Bound on each single field query
    pub query_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff: Duration::from_secs(60),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-pass tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Devices whose query was attempted
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Writes skipped because a pushed change landed during the query
    pub conflicts: usize,
    /// Devices that left the directory before their query started
    pub skipped: usize,
    pub failed: usize,
}

impl PassReport {
    /// A pass fails when devices were queried and none of them answered
    pub fn is_failure(&self) -> bool {
        self.checked > 0 && self.failed == self.checked
    }
}

enum DeviceOutcome {
    Written(WriteOutcome),
    Skipped,
    Failed,
}

pub struct Reconciler {
    directory: Arc<Directory>,
    status: Arc<StatusStore>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(directory: Arc<Directory>, status: Arc<StatusStore>, config: ReconcileConfig) -> Self {
        Self {
            directory,
            status,
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Run one pass over every directory entry
    pub async fn run_pass(&self) -> PassReport {
        let mut tasks = JoinSet::new();

        for id in self.directory.keys().await {
            let directory = self.directory.clone();
            let status = self.status.clone();
            let limit = self.config.query_timeout;
            tasks.spawn(async move { reconcile_device(&directory, &status, id, limit).await });
        }

        let mut report = PassReport::default();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(DeviceOutcome::Written(outcome)) => {
                    report.checked += 1;
                    match outcome {
                        WriteOutcome::Changed => report.updated += 1,
                        WriteOutcome::Unchanged => report.unchanged += 1,
                        WriteOutcome::Conflict => report.conflicts += 1,
                    }
                }
                Ok(DeviceOutcome::Skipped) => report.skipped += 1,
                Ok(DeviceOutcome::Failed) => {
                    report.checked += 1;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation task panicked");
                    report.checked += 1;
                    report.failed += 1;
                }
            }
        }

        debug!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed,
            "Reconciliation pass complete"
        );
        report
    }

    /// Delay before the next pass
    pub fn next_delay(&self, report: &PassReport) -> Duration {
        if report.is_failure() {
            self.config.backoff
        } else {
            self.config.interval
        }
    }

    /// Run passes forever, rescheduling after each one
    pub async fn run(&self) {
        info!(
            interval = ?self.config.interval,
            backoff = ?self.config.backoff,
            "Starting reconciliation loop"
        );
        loop {
            let report = self.run_pass().await;
            let delay = self.next_delay(&report);
            if report.is_failure() {
                warn!(failed = report.failed, delay = ?delay, "Every device failed, backing off");
            }
            tokio::time::sleep(delay).await;
        }
    }
}

async fn reconcile_device(
    directory: &Directory,
    status: &StatusStore,
    id: DeviceId,
    limit: Duration,
) -> DeviceOutcome {
    let Some(device) = directory.get(&id).await else {
        return DeviceOutcome::Skipped;
    };

    let version = status.version(&id).await;
    match query_status(&*device.driver, limit).await {
        Ok(fresh) => DeviceOutcome::Written(status.set_if_unchanged(&id, version, fresh).await),
        Err(e) => {
            warn!(device = %id, error = %e, "Status query failed");
            DeviceOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{descriptor, snapshot, MockDriver};
    use crate::notify::{ChangeEvent, Notifier};
    use avr_core::{Device, DriverError, Status};
    use tokio::sync::broadcast;

    struct Harness {
        reconciler: Reconciler,
        directory: Arc<Directory>,
        status: Arc<StatusStore>,
        rx: broadcast::Receiver<ChangeEvent>,
    }

    fn harness() -> Harness {
        let notifier = Notifier::new(64);
        let rx = notifier.subscribe();
        let directory = Arc::new(Directory::new(notifier.clone()));
        let status = Arc::new(StatusStore::new(notifier));
        let config = ReconcileConfig {
            query_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        Harness {
            reconciler: Reconciler::new(directory.clone(), status.clone(), config),
            directory,
            status,
            rx,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_identical_result_is_silent() {
        let mut h = harness();
        let driver = MockDriver::arc();
        h.directory.insert(Device::new(descriptor("d1", "D1"), driver)).await;
        h.status.set(&DeviceId::from("d1"), snapshot()).await;
        drain(&mut h.rx);

        let report = h.reconciler.run_pass().await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.unchanged, 1);
        assert!(drain(&mut h.rx).is_empty());
    }

    #[tokio::test]
    async fn test_divergence_publishes_full_snapshot_once() {
        let mut h = harness();
        let driver = MockDriver::arc();
        h.directory
            .insert(Device::new(descriptor("d1", "D1"), driver.clone()))
            .await;
        h.status.set(&DeviceId::from("d1"), snapshot()).await;
        drain(&mut h.rx);

        let changed = Status { source: "CD".to_string(), ..snapshot() };
        driver.set_status(changed.clone());

        let report = h.reconciler.run_pass().await;
        assert_eq!(report.updated, 1);
        assert_eq!(
            drain(&mut h.rx),
            vec![ChangeEvent::StatusUpdated {
                id: DeviceId::from("d1"),
                status: changed,
            }]
        );
    }

    #[tokio::test]
    async fn test_first_snapshot_for_unready_device() {
        let h = harness();
        h.directory
            .insert(Device::new(descriptor("d1", "D1"), MockDriver::arc()))
            .await;

        let report = h.reconciler.run_pass().await;
        assert_eq!(report.updated, 1);
        assert_eq!(h.status.get(&DeviceId::from("d1")).await, Some(snapshot()));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_others() {
        let h = harness();
        let broken = MockDriver::arc();
        broken.fail_with(DriverError::Disconnected);
        let slow = MockDriver::arc();
        slow.stall(Duration::from_secs(30));

        h.directory.insert(Device::new(descriptor("a", "A"), broken)).await;
        h.directory.insert(Device::new(descriptor("b", "B"), slow)).await;
        h.directory
            .insert(Device::new(descriptor("c", "C"), MockDriver::arc()))
            .await;

        let report = h.reconciler.run_pass().await;
        assert_eq!(report.checked, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.updated, 1);
        assert!(!report.is_failure());
        assert_eq!(h.reconciler.next_delay(&report), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_all_failed_backs_off() {
        let h = harness();
        let broken = MockDriver::arc();
        broken.fail_with(DriverError::Disconnected);
        h.directory.insert(Device::new(descriptor("a", "A"), broken)).await;

        let report = h.reconciler.run_pass().await;
        assert!(report.is_failure());
        assert_eq!(h.reconciler.next_delay(&report), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_empty_directory_is_not_a_failure() {
        let h = harness();
        let report = h.reconciler.run_pass().await;
        assert_eq!(report, PassReport::default());
        assert!(!report.is_failure());
    }

    fn spawn_run(reconciler: Reconciler) -> tokio::task::JoinHandle<()> {
        let reconciler = Arc::new(reconciler);
        tokio::spawn(async move { reconciler.run().await })
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_repeats_after_interval() {
        let h = harness();
        let driver = MockDriver::arc();
        h.directory
            .insert(Device::new(descriptor("d1", "D1"), driver.clone()))
            .await;
        let task = spawn_run(h.reconciler);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(driver.power_queries(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(driver.power_queries(), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_after_failed_pass() {
        let h = harness();
        let driver = MockDriver::arc();
        driver.fail_with(DriverError::Disconnected);
        h.directory
            .insert(Device::new(descriptor("d1", "D1"), driver.clone()))
            .await;
        let task = spawn_run(h.reconciler);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(driver.power_queries(), 1);

        // Device recovers; passes then run at 60 s and 61 s
        driver.set_failure(None);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(driver.power_queries(), 3);

        task.abort();
    }
}
